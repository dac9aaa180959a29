//! JSON payload encoding for structured columns.
//!
//! Structured values are stored as UTF-8 JSON text. Encoding never
//! escapes non-ASCII characters, so accented text round-trips
//! byte-for-byte. Decoding a corrupt payload yields `None` instead of
//! an error — one bad record must not poison a whole query.

use serde_json::Value;

/// Encodes a structured value for storage.
pub fn encode(value: &Value) -> String {
    value.to_string()
}

/// Decodes a stored payload. Returns `None` for empty or malformed text.
pub fn decode(payload: &str) -> Option<Value> {
    if payload.is_empty() {
        return None;
    }
    serde_json::from_str(payload).ok()
}
