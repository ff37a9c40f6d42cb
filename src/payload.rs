//! Token extraction from data frame bodies.

use serde_json::Value;

use crate::sse::is_done_marker;

/// Field of a structured payload that carries the token text.
pub const CONTENT_FIELD: &str = "content";

/// Result of decoding a single data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Text for the caller.
    Token(String),
    /// The end-of-stream sentinel.
    Done,
}

/// Decode a data frame body.
///
/// A JSON object with a string `content` field yields that string. Anything
/// else, including invalid JSON, is delivered as the raw body.
pub fn decode_payload(body: &str) -> Payload {
    if is_done_marker(body) {
        return Payload::Done;
    }

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(mut object)) => match object.remove(CONTENT_FIELD) {
            Some(Value::String(content)) => Payload::Token(content),
            _ => Payload::Token(body.to_string()),
        },
        _ => Payload::Token(body.to_string()),
    }
}
