//! Structural checks on messages, keys and envelopes
//!
//! Nothing here touches key material beyond decoding it; all checks run
//! before any cryptographic operation so bad input fails fast and cheaply.

use serde_json::Value;

use crate::codec::base64_decode_array;
use crate::error::{BoxError, BoxResult};
use crate::{KEY_SIZE, MAX_MESSAGE_LENGTH};

/// Envelope field names, in wire order.
pub const ENVELOPE_FIELDS: [&str; 4] = ["version", "nonce", "ephemeralPublicKey", "ciphertext"];

/// Reject empty messages and messages over [`MAX_MESSAGE_LENGTH`] UTF-8 bytes.
pub fn validate_message(msg: &str) -> BoxResult<()> {
    if msg.is_empty() {
        return Err(BoxError::invalid_message("message cannot be empty"));
    }
    if msg.len() > MAX_MESSAGE_LENGTH {
        return Err(BoxError::invalid_message(format!(
            "message exceeds maximum length of {MAX_MESSAGE_LENGTH} bytes (got {})",
            msg.len()
        )));
    }
    Ok(())
}

/// Reject public keys that are empty, not base64, or not 32 bytes once decoded.
pub fn validate_public_key_format(key: &str) -> BoxResult<()> {
    decode_public_key(key).map(|_| ())
}

pub(crate) fn decode_public_key(key: &str) -> BoxResult<[u8; KEY_SIZE]> {
    if key.is_empty() {
        return Err(BoxError::invalid_key("public key cannot be empty"));
    }
    base64_decode_array::<KEY_SIZE>(key)
        .map_err(|e| BoxError::invalid_key(format!("public key {e}")))
}

/// Check that an untyped envelope is an object carrying the four required
/// fields as non-empty strings.
///
/// When fields are missing, every missing name is reported at once.
pub fn validate_envelope_format(envelope: &Value) -> BoxResult<()> {
    let obj = envelope
        .as_object()
        .ok_or_else(|| BoxError::invalid_message("envelope must be a JSON object"))?;

    let missing: Vec<&str> = ENVELOPE_FIELDS
        .iter()
        .copied()
        .filter(|field| !obj.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(BoxError::invalid_message(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    for field in ENVELOPE_FIELDS {
        match &obj[field] {
            Value::String(s) if s.is_empty() => {
                return Err(BoxError::invalid_message(format!(
                    "field '{field}' cannot be empty"
                )))
            }
            Value::String(_) => {}
            _ => {
                return Err(BoxError::invalid_message(format!(
                    "field '{field}' must be a string"
                )))
            }
        }
    }
    Ok(())
}

/// Typed counterpart of [`validate_envelope_format`]: only emptiness can be
/// wrong once the fields are strings.
pub(crate) fn validate_envelope_fields(fields: [(&str, &str); 4]) -> BoxResult<()> {
    match fields.iter().find(|(_, value)| value.is_empty()) {
        Some((name, _)) => Err(BoxError::invalid_message(format!(
            "field '{name}' cannot be empty"
        ))),
        None => Ok(()),
    }
}
