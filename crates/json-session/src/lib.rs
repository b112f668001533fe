//! Streaming structural parser for JSON. This crate provides a pull-based session which yields
//! `BeginObject`, `ObjectProperty`, `EndObject`, `BeginArray`, `EndArray`, and `PrimitiveValue`
//! events.
//!
//! Object keys are decoded, but primitive values are only validated: a `PrimitiveValue` event
//! carries the kind of the value and its exact byte span, so that the value can be decoded later
//! from just those bytes. This allows indexing large JSON documents without ever holding the
//! entire document, or any of its decoded values, in memory.
//!
//! Every event has location information attached to it, saying at which byte offset (and at
//! which line and column) the relevant fragment began or ended.
//!
//! ```
//! use json_session::{JsonPrimitiveKind, JsonSession, JsonSessionEvent};
//!
//! # fn main() {
//!     let s = r#"{"key1": 1234, "key2": [true]}"#;
//!     let mut session = JsonSession::new(s.as_bytes().iter().cloned());
//!     // BeginObject, ObjectProperty("key1")
//!     session.next().unwrap().unwrap();
//!     session.next().unwrap().unwrap();
//!     match session.next().unwrap().unwrap() {
//!         JsonSessionEvent::PrimitiveValue {
//!             kind,
//!             location_at_value_start,
//!             location_after_value_end,
//!         } => {
//!             assert_eq!(kind, JsonPrimitiveKind::Number);
//!             assert_eq!(location_at_value_start.byte_offset, 9);
//!             assert_eq!(location_after_value_end.byte_offset, 13);
//!         }
//!         other => panic!("unexpected event {other:?}"),
//!     }
//! # }
//! ```

mod session;
mod tokenizer;

pub use session::*;
pub use tokenizer::*;
