//! Byte encoding of [`Message`].
//!
//! ```text
//! encode(&Message) -> Vec<u8>
//! decode(&[u8])    -> Result<Message>   // DEX_ERR_500 / DEX_ERR_501
//! ```
//!
//! A payload is a JSON object `{"type": <kind>, "payload": {...}}`. Decoding
//! is a single fallible parse into [`RawMessage`] followed by value
//! validation; nothing is returned unless every field is valid.

use p2pdex_types::{DexError, Message, Result};

use crate::raw::RawMessage;

/// Serialize a message to bytes.
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    serde_json::to_vec(&RawMessage::from(message))
        .map_err(|e| DexError::Serialization(e.to_string()))
}

/// Parse and validate bytes into a message.
///
/// # Errors
/// - `Decode` for malformed, truncated, unknown-kind or wrong-arity payloads
/// - `InvalidValue` when a field fails its value validation
pub fn decode(bytes: &[u8]) -> Result<Message> {
    let raw: RawMessage =
        serde_json::from_slice(bytes).map_err(|e| DexError::Decode(e.to_string()))?;
    Message::try_from(raw)
}
