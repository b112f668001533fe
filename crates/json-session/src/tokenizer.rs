use std::fmt;
use std::iter::Peekable;

use smallvec::SmallVec;

/// A JSON token.
///
/// Only object keys carry their decoded contents. Value strings and numbers are
/// validated by the tokenizer, but decoding them is left to whoever later reads
/// the byte range of the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonToken {
    Number,
    True,
    False,
    /// A string in key position, decoded.
    Key(String),
    /// A string in value position, validated but not decoded.
    String,
    Null,
    ArrayOpen,
    Comma,
    ArrayClose,
    ObjOpen,
    Colon,
    ObjClose,
}

/// Whether the next string token should be decoded or only validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringMode {
    Decode,
    Validate,
}

/// A byte offset and the corresponding line and column number.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub byte_offset: u64,
    pub line: u64,
    pub col: u64,
}

impl Location {
    fn advance_by_byte(&mut self, c: u8) {
        if c == b'\n' {
            self.col = 0;
            self.line += 1;
        } else {
            self.col += 1;
        }
        self.byte_offset += 1;
    }
}

/// The error type used in this crate. Comes with Location information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonParseError {
    msg: String,
    location: Location,
}

impl JsonParseError {
    /// Creates a new [`JsonParseError`].
    pub fn new(msg: String, location: Location) -> JsonParseError {
        JsonParseError { msg, location }
    }

    /// The error message.
    pub fn msg(&self) -> &str {
        &self.msg
    }

    /// The location in the source document at which the parse error was encountered.
    pub fn location(&self) -> Location {
        self.location
    }
}

impl fmt::Display for JsonParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parse error at byte {} (line:{}, col:{}): {}",
            self.location.byte_offset, self.location.line, self.location.col, &self.msg,
        )
    }
}

impl std::error::Error for JsonParseError {}

/// A type alias for `Result<T, JsonParseError>`.
pub type JsonParseResult<T> = Result<T, JsonParseError>;

// Note: char::is_ascii_whitespace is not available because some characters are not defined as
// whitespace character in the JSON grammar. For example, U+000C FORM FEED is whitespace in Rust but
// it isn't in JSON.
fn is_whitespace(c: u8) -> bool {
    matches!(c, 0x20 | 0xa | 0xd | 0x9)
}

/// A pull-based tokenizer which takes an iterator over bytes and emits [`JsonToken`]s.
pub struct JsonTokenizer<I: Iterator<Item = u8>> {
    bytes: Peekable<I>,
    location: Location,
    scratch: SmallVec<[u8; 32]>,
}

impl<I: Iterator<Item = u8>> JsonTokenizer<I> {
    /// Create a new [`JsonTokenizer`]
    pub fn new(it: I) -> Self {
        JsonTokenizer {
            bytes: it.peekable(),
            location: Location::default(),
            scratch: SmallVec::new(),
        }
    }

    /// The location of the token that will be returned by the next call to `next_token()`.
    ///
    /// Well that's not entirely true if there is whitespace before the next token. In that
    /// case, this would be the location of that white space. Call
    /// [`JsonTokenizer::skip_whitespace`] first to get the exact token start.
    pub fn location(&self) -> Location {
        self.location
    }

    /// Skips white space so that [`JsonTokenizer::location`] points at the next token.
    pub fn skip_whitespace(&mut self) {
        self.peek_byte_skip_whitespace();
    }

    /// Returns an error if there is more than just white space in the remaining bytes.
    pub fn expect_eof(&mut self) -> Result<(), JsonParseError> {
        match self.peek_byte_skip_whitespace() {
            Some(b) => self.err(format!("Expected EOF but found byte {b:#x}")),
            None => Ok(()),
        }
    }

    fn err<T>(&self, msg: String) -> Result<T, JsonParseError> {
        Err(JsonParseError::new(msg, self.location))
    }

    fn eof_err(&self) -> JsonParseError {
        JsonParseError::new(String::from("Unexpected EOF"), self.location)
    }

    fn peek_byte_skip_whitespace(&mut self) -> Option<u8> {
        while let Some(c) = self.bytes.peek().copied() {
            if is_whitespace(c) {
                self.bytes.next();
                self.location.advance_by_byte(c);
                continue;
            }
            return Some(c);
        }
        None
    }

    fn peek_byte(&mut self) -> Option<u8> {
        self.bytes.peek().copied()
    }

    fn consume_byte(&mut self) -> Result<u8, JsonParseError> {
        match self.bytes.next() {
            Some(b) => {
                self.location.advance_by_byte(b);
                Ok(b)
            }
            None => Err(self.eof_err()),
        }
    }

    fn consume_hex4(&mut self) -> JsonParseResult<u16> {
        let mut u = 0u16;
        for _ in 0..4 {
            let b = self.consume_byte()?;
            match ascii_byte_to_hex_digit(b) {
                Some(h) => u = u * 0x10 + h as u16,
                None => {
                    return self.err(format!(
                        "Unicode character must be \\uXXXX (X is hex character) format but found byte {b:#x}"
                    ))
                }
            }
        }
        Ok(u)
    }

    /// Consumes a string literal, starting at the opening quote.
    ///
    /// The decoded bytes always go through `self.scratch` so that UTF-8 validity is checked in
    /// both modes; only [`StringMode::Decode`] allocates a `String` for the result.
    fn consume_string(&mut self, mode: StringMode) -> JsonParseResult<JsonToken> {
        let quote = self.consume_byte()?;
        debug_assert_eq!(quote, b'"');

        let mut s = std::mem::take(&mut self.scratch);
        s.clear();
        let result = self.consume_string_body(&mut s).and_then(|()| {
            match std::str::from_utf8(&s) {
                Ok(decoded) => Ok(match mode {
                    StringMode::Decode => JsonToken::Key(decoded.to_owned()),
                    StringMode::Validate => JsonToken::String,
                }),
                Err(_) => self.err("Invalid UTF-8 in string".into()),
            }
        });
        self.scratch = s;
        result
    }

    fn consume_string_body(&mut self, s: &mut SmallVec<[u8; 32]>) -> JsonParseResult<()> {
        loop {
            let b = match self.consume_byte()? {
                b'\\' => match self.consume_byte()? {
                    b'\\' => b'\\',
                    b'/' => b'/',
                    b'"' => b'"',
                    b'b' => 0x8,
                    b'f' => 0xc,
                    b'n' => b'\n',
                    b'r' => b'\r',
                    b't' => b'\t',
                    b'u' => {
                        let u = self.consume_hex4()?;
                        let c = match u {
                            0xD800..=0xDBFF => {
                                // A first surrogate must be directly followed by the second one.
                                if self.consume_byte()? != b'\\' || self.consume_byte()? != b'u' {
                                    return self.err(format!("First UTF-16 surrogate {u:#x} must be directly followed by a second \\uXXXX surrogate."));
                                }
                                let u2 = self.consume_hex4()?;
                                if !matches!(u2, 0xDC00..=0xDFFF) {
                                    return self.err(format!("First UTF-16 surrogate {u:#x} must be directly followed by a second \\uXXXX surrogate, but found something that's not a second surrogate: {u2:#x}."));
                                }
                                let c =
                                    (((u & 0x3ff) as u32) << 10 | (u2 & 0x3ff) as u32) + 0x1_0000;
                                char::from_u32(c)
                            }
                            0xDC00..=0xDFFF => {
                                return self
                                    .err(format!("Unpaired UTF-16 second surrogate: {u:#x}"));
                            }
                            _ => char::from_u32(u as u32),
                        };
                        let Some(c) = c else {
                            return self.err(format!("Invalid unicode escape {u:#x}"));
                        };
                        s.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes());
                        continue;
                    }
                    b => return self.err(format!("{b:#x} is invalid escaped character")),
                },
                b'"' => return Ok(()),
                // Note: c.is_control() is not available here because JSON accepts 0x7f (DEL) in
                // string literals but 0x7f is control character.
                b if b < 0x20 => {
                    return self.err(format!("Unexpected control character {b:#x} in string"));
                }
                b => b,
            };

            s.push(b);
        }
    }

    fn consume_constant(&mut self, s: &'static str) -> Result<(), JsonParseError> {
        for expected_byte in s.as_bytes() {
            let location = self.location;
            let b = self.consume_byte()?;
            if b != *expected_byte {
                return Err(JsonParseError::new(
                    format!("Unexpected byte {b:#x} while parsing '{s}'"),
                    location,
                ));
            }
        }
        Ok(())
    }

    fn consume_digits(&mut self) -> usize {
        let mut count = 0;
        while let Some(b'0'..=b'9') = self.peek_byte() {
            // Cannot fail, we just peeked the byte.
            let _ = self.consume_byte();
            count += 1;
        }
        count
    }

    /// Checks the number grammar without converting the literal.
    fn consume_number(&mut self) -> JsonParseResult<JsonToken> {
        if self.peek_byte() == Some(b'-') {
            self.consume_byte()?;
        }

        let leading_zero = self.peek_byte() == Some(b'0');
        let int_digits = self.consume_digits();
        if int_digits == 0 {
            return self.err("Integer part must not be empty in number literal".to_string());
        }
        if leading_zero && int_digits > 1 {
            return self
                .err("Integer part of number must not start with 0 except for '0'".to_string());
        }

        if self.peek_byte() == Some(b'.') {
            self.consume_byte()?;
            if self.consume_digits() == 0 {
                return self.err("Fraction part of number must not be empty".to_string());
            }
        }

        if let Some(b'e' | b'E') = self.peek_byte() {
            self.consume_byte()?;
            if let Some(b'+' | b'-') = self.peek_byte() {
                self.consume_byte()?;
            }
            if self.consume_digits() == 0 {
                return self.err("Exponent part must not be empty in number literal".to_string());
            }
        }

        Ok(JsonToken::Number)
    }

    /// Parses a token and returns it, or an error.
    pub fn next_token(&mut self, mode: StringMode) -> JsonParseResult<JsonToken> {
        let b = self
            .peek_byte_skip_whitespace()
            .ok_or_else(|| self.eof_err())?;
        let token = match b {
            b'[' => JsonToken::ArrayOpen,
            b']' => JsonToken::ArrayClose,
            b'{' => JsonToken::ObjOpen,
            b'}' => JsonToken::ObjClose,
            b':' => JsonToken::Colon,
            b',' => JsonToken::Comma,
            b'0'..=b'9' | b'-' => return self.consume_number(),
            b'"' => return self.consume_string(mode),
            b't' => return self.consume_constant("true").map(|()| JsonToken::True),
            b'f' => return self.consume_constant("false").map(|()| JsonToken::False),
            b'n' => return self.consume_constant("null").map(|()| JsonToken::Null),
            c => return self.err(format!("Invalid byte: {c:#x}")),
        };
        self.consume_byte()?;
        Ok(token)
    }
}

fn ascii_byte_to_hex_digit(c: u8) -> Option<u8> {
    if c.is_ascii_digit() {
        Some(c - b'0')
    } else if (b'a'..=b'f').contains(&c) {
        Some(10 + (c - b'a'))
    } else if (b'A'..=b'F').contains(&c) {
        Some(10 + (c - b'A'))
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    type Tokens = SmallVec<[JsonToken; 8]>;

    fn tokens(s: &str, mode: StringMode) -> JsonParseResult<Tokens> {
        let mut tokenizer = JsonTokenizer::new(s.bytes());
        let mut v = Tokens::new();
        loop {
            tokenizer.skip_whitespace();
            if tokenizer.expect_eof().is_ok() {
                return Ok(v);
            }
            v.push(tokenizer.next_token(mode)?);
        }
    }

    #[test]
    fn test_numbers_are_validated_not_converted() {
        let v = tokens("0 -1 3.25 1e9 -0.5E-3", StringMode::Validate).unwrap();
        assert_eq!(v.len(), 5);
        assert!(v.iter().all(|t| *t == JsonToken::Number));

        for bad in ["01", "-", "1.", "1e", "1.e5", "-a"] {
            let mut tokenizer = JsonTokenizer::new(bad.bytes());
            let result = tokenizer
                .next_token(StringMode::Validate)
                .and_then(|_| tokenizer.expect_eof());
            assert!(result.is_err(), "{bad} should not tokenize as a number");
        }
    }

    #[test]
    fn test_string_modes() {
        let s = r#""a\"bé😀""#;
        assert_eq!(
            tokens(s, StringMode::Decode).unwrap().as_slice(),
            &[JsonToken::Key("a\"bé😀".to_string())]
        );
        assert_eq!(
            tokens(s, StringMode::Validate).unwrap().as_slice(),
            &[JsonToken::String]
        );
    }

    #[test]
    fn test_string_errors() {
        for bad in [r#""\x""#, r#""\ud800""#, r#""\udc00""#, "\"a\nb\"", r#""abc"#] {
            assert!(tokens(bad, StringMode::Validate).is_err(), "{bad:?}");
        }
        let bytes = [b'"', 0xff, b'"'];
        let mut tokenizer = JsonTokenizer::new(bytes.iter().copied());
        assert!(tokenizer.next_token(StringMode::Validate).is_err());
    }

    #[test]
    fn test_error_location() {
        let mut tokenizer = JsonTokenizer::new("  \n tru".bytes());
        let err = tokenizer.next_token(StringMode::Validate).unwrap_err();
        assert_eq!(err.location().line, 1);
        assert_eq!(err.location().byte_offset, 7);
    }
}
