//! Text encodings for binary fields crossing the API boundary
//!
//! Every key, nonce and ciphertext is carried as standard-alphabet, padded
//! base64. Hex is only used for key import and the `0x` envelope armor.

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Prefix marking a hex-armored envelope.
pub const HEX_ARMOR_PREFIX: &str = "0x";

pub fn base64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn base64_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(s)
}

/// Decode base64 into a fixed-size array, reporting the actual length on mismatch.
pub fn base64_decode_array<const N: usize>(s: &str) -> Result<[u8; N], DecodeArrayError> {
    let bytes = base64_decode(s).map_err(DecodeArrayError::Base64)?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| DecodeArrayError::Length {
        expected: N,
        actual: bytes.len(),
    })
}

#[derive(Debug, Error)]
pub enum DecodeArrayError {
    #[error("not valid base64: {0}")]
    Base64(#[source] base64::DecodeError),

    #[error("decoded to {actual} bytes (expected {expected})")]
    Length { expected: usize, actual: usize },
}

pub fn hex_decode(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(s)
}

/// `0x` + lowercase hex of the given text.
pub fn hex_armor(text: &str) -> String {
    format!("{HEX_ARMOR_PREFIX}{}", hex::encode(text.as_bytes()))
}

/// Reverse of [`hex_armor`]. The prefix is required.
pub fn hex_dearmor(armored: &str) -> anyhow::Result<String> {
    let body = armored
        .trim()
        .strip_prefix(HEX_ARMOR_PREFIX)
        .ok_or_else(|| anyhow::anyhow!("armor must start with {HEX_ARMOR_PREFIX:?}"))?;
    let bytes = hex::decode(body).context("armor is not valid hex")?;
    String::from_utf8(bytes).context("armor payload is not UTF-8")
}
