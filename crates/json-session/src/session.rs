use crate::JsonParseError;

use super::tokenizer::{JsonParseResult, JsonToken, JsonTokenizer, Location, StringMode};

/// A structural event emitted by [`JsonSession`].
///
/// All start locations point at the first byte of the fragment (never at white space before it),
/// and all end locations point just past the last byte of the fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonSessionEvent {
    BeginObject {
        location_at_obj_start: Location,
    },
    ObjectProperty {
        property_key: String,
        location_at_prop_key_start: Location,
    },
    EndObject {
        location_after_obj_end: Location,
    },
    BeginArray {
        location_at_array_start: Location,
    },
    EndArray {
        location_after_array_end: Location,
    },
    PrimitiveValue {
        kind: JsonPrimitiveKind,
        location_at_value_start: Location,
        location_after_value_end: Location,
    },
}

/// The type of a primitive value. The value itself is not decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsonPrimitiveKind {
    Number,
    Boolean,
    String,
    Null,
}

pub struct JsonSession<I: Iterator<Item = u8>> {
    tokenizer: JsonTokenizer<I>,
    state_stack: Vec<StateStackEntry>,
}

#[derive(Debug, Clone)]
enum StateStackEntry {
    BeforeAnyValue,
    BeforeAnyValueWithToken {
        location: Location,
        token: JsonToken,
    },
    AfterObjectOpen,
    BeforeObjectPropertyKeyWithToken {
        location: Location,
        token: JsonToken,
    },
    AfterObjectPropertyValue,
    ArrayAfterOpen,
    ArrayAfterItem,
}

impl<I: Iterator<Item = u8>> JsonSession<I> {
    pub fn new(it: I) -> Self {
        JsonSession {
            tokenizer: JsonTokenizer::new(it),
            state_stack: vec![StateStackEntry::BeforeAnyValue],
        }
    }

    /// Reads the next token, returning it along with the location of its first byte.
    fn next_token_with_location(
        &mut self,
        mode: StringMode,
    ) -> JsonParseResult<(Location, JsonToken)> {
        self.tokenizer.skip_whitespace();
        let location = self.tokenizer.location();
        let token = self.tokenizer.next_token(mode)?;
        Ok((location, token))
    }

    fn replace_top(&mut self, entry: StateStackEntry) {
        if let Some(top) = self.state_stack.last_mut() {
            *top = entry;
        }
    }

    pub fn next(&mut self) -> JsonParseResult<Option<JsonSessionEvent>> {
        while let Some(entry) = self.state_stack.last().cloned() {
            match entry {
                StateStackEntry::BeforeAnyValue => {
                    let (location, token) = self.next_token_with_location(StringMode::Validate)?;
                    self.replace_top(StateStackEntry::BeforeAnyValueWithToken { token, location });
                }
                StateStackEntry::BeforeAnyValueWithToken { location, token } => {
                    let kind = match token {
                        JsonToken::Number => JsonPrimitiveKind::Number,
                        JsonToken::True | JsonToken::False => JsonPrimitiveKind::Boolean,
                        JsonToken::String | JsonToken::Key(_) => JsonPrimitiveKind::String,
                        JsonToken::Null => JsonPrimitiveKind::Null,
                        JsonToken::ArrayOpen => {
                            self.replace_top(StateStackEntry::ArrayAfterOpen);
                            return Ok(Some(JsonSessionEvent::BeginArray {
                                location_at_array_start: location,
                            }));
                        }
                        JsonToken::ObjOpen => {
                            self.replace_top(StateStackEntry::AfterObjectOpen);
                            return Ok(Some(JsonSessionEvent::BeginObject {
                                location_at_obj_start: location,
                            }));
                        }
                        t @ (JsonToken::Comma
                        | JsonToken::ArrayClose
                        | JsonToken::Colon
                        | JsonToken::ObjClose) => {
                            return Err(JsonParseError::new(
                                format!("Unexpected token {t:?}"),
                                location,
                            ));
                        }
                    };
                    let location_after = self.tokenizer.location();
                    self.state_stack.pop();
                    return Ok(Some(JsonSessionEvent::PrimitiveValue {
                        kind,
                        location_at_value_start: location,
                        location_after_value_end: location_after,
                    }));
                }
                StateStackEntry::AfterObjectOpen => {
                    let (location, token) = self.next_token_with_location(StringMode::Decode)?;
                    if matches!(token, JsonToken::ObjClose) {
                        self.state_stack.pop();
                        let location_after_obj_end = self.tokenizer.location();
                        return Ok(Some(JsonSessionEvent::EndObject {
                            location_after_obj_end,
                        }));
                    }

                    self.replace_top(StateStackEntry::BeforeObjectPropertyKeyWithToken {
                        location,
                        token,
                    });
                }
                StateStackEntry::BeforeObjectPropertyKeyWithToken { location, token } => {
                    let key = match token {
                        JsonToken::Key(s) => s,
                        other_token => {
                            return Err(JsonParseError::new(
                                format!("Key of object must be string but found {other_token:?}"),
                                location,
                            ))
                        }
                    };

                    let (colon_location, token) =
                        self.next_token_with_location(StringMode::Validate)?;
                    if token != JsonToken::Colon {
                        return Err(JsonParseError::new(
                            format!(
                                "':' is expected after key of object but actually found '{token:?}'",
                            ),
                            colon_location,
                        ));
                    }

                    self.replace_top(StateStackEntry::AfterObjectPropertyValue);
                    self.state_stack.push(StateStackEntry::BeforeAnyValue);
                    return Ok(Some(JsonSessionEvent::ObjectProperty {
                        property_key: key,
                        location_at_prop_key_start: location,
                    }));
                }
                StateStackEntry::AfterObjectPropertyValue => {
                    let (location, token) = self.next_token_with_location(StringMode::Validate)?;
                    match token {
                        JsonToken::Comma => {}
                        JsonToken::ObjClose => {
                            let location_after_obj_end = self.tokenizer.location();
                            self.state_stack.pop();
                            return Ok(Some(JsonSessionEvent::EndObject {
                                location_after_obj_end,
                            }));
                        }
                        token => {
                            return Err(JsonParseError::new(
                                format!(
                                "',' or '}}' is expected for object but actually found '{token:?}'",
                            ),
                                location,
                            ))
                        }
                    }

                    let (location, token) = self.next_token_with_location(StringMode::Decode)?;
                    self.replace_top(StateStackEntry::BeforeObjectPropertyKeyWithToken {
                        location,
                        token,
                    });
                }
                StateStackEntry::ArrayAfterOpen => {
                    let (location, token) = self.next_token_with_location(StringMode::Validate)?;

                    if token == JsonToken::ArrayClose {
                        let location_after_array_end = self.tokenizer.location();
                        self.state_stack.pop();
                        return Ok(Some(JsonSessionEvent::EndArray {
                            location_after_array_end,
                        }));
                    }

                    self.replace_top(StateStackEntry::ArrayAfterItem);
                    self.state_stack
                        .push(StateStackEntry::BeforeAnyValueWithToken { token, location });
                }
                StateStackEntry::ArrayAfterItem => {
                    let (location, token) = self.next_token_with_location(StringMode::Validate)?;
                    match token {
                        JsonToken::Comma => {}
                        JsonToken::ArrayClose => {
                            let location_after_array_end = self.tokenizer.location();
                            self.state_stack.pop();
                            return Ok(Some(JsonSessionEvent::EndArray {
                                location_after_array_end,
                            }));
                        }
                        token => {
                            return Err(JsonParseError::new(
                                format!(
                                "',' or ']' is expected for array but actually found '{token:?}'",
                            ),
                                location,
                            ))
                        }
                    }

                    self.state_stack.push(StateStackEntry::BeforeAnyValue);
                }
            }
        }

        self.tokenizer.expect_eof()?;

        Ok(None)
    }
}

#[cfg(feature = "fallible-iterator")]
impl<I: Iterator<Item = u8>> fallible_iterator::FallibleIterator for JsonSession<I> {
    type Item = JsonSessionEvent;
    type Error = JsonParseError;

    fn next(&mut self) -> Result<Option<Self::Item>, Self::Error> {
        JsonSession::next(self)
    }
}
