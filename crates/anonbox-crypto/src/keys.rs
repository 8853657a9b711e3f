//! X25519 key pairs: generation, public key derivation, validity checks, format conversion

use std::str::FromStr;

use anyhow::Context;
use crypto_box::SecretKey;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::codec::{base64_decode, base64_decode_array, base64_encode, hex_decode};
use crate::error::{BoxError, BoxResult};
use crate::KEY_SIZE;

/// A base64-encoded X25519 key pair.
///
/// The private half stays wrapped in a [`SecretString`] so it is redacted from
/// `Debug` output and zeroized on drop.
#[derive(Debug)]
pub struct KeyPair {
    public_key: String,
    private_key: SecretString,
}

impl KeyPair {
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn private_key(&self) -> &SecretString {
        &self.private_key
    }

    /// `{"privateKey": ..., "publicKey": ...}`, the shape peers exchange.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "privateKey": self.private_key.expose_secret(),
            "publicKey": self.public_key,
        })
    }
}

/// Which half of a key pair a string is expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Public,
    Private,
}

impl FromStr for KeyKind {
    type Err = BoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(BoxError::invalid_key(format!(
                "unknown key kind {other:?} (expected \"public\" or \"private\")"
            ))),
        }
    }
}

/// Encoding tag for [`format_key`] input, as named on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    Raw,
    Hex,
    Base64,
}

impl FromStr for KeyEncoding {
    type Err = BoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(Self::Raw),
            "hex" => Ok(Self::Hex),
            "base64" => Ok(Self::Base64),
            other => Err(BoxError::invalid_key(format!(
                "unsupported key encoding {other:?} (expected raw, hex or base64)"
            ))),
        }
    }
}

/// A key in one of the accepted input encodings.
#[derive(Debug, Clone, Copy)]
pub enum KeyInput<'a> {
    Raw(&'a [u8]),
    Hex(&'a str),
    Base64(&'a str),
}

/// Generate a fresh X25519 key pair from the OS CSPRNG.
pub fn generate_key_pair() -> BoxResult<KeyPair> {
    let secret = generate_secret()?;
    let public_key = base64_encode(secret.public_key().as_bytes());
    let scalar = Zeroizing::new(secret.to_bytes());
    let private_key = Zeroizing::new(base64_encode(&scalar[..]));

    tracing::trace!("generated X25519 key pair");
    Ok(KeyPair {
        public_key,
        private_key: SecretString::from(private_key.as_str()),
    })
}

/// Recompute the base64 public key belonging to a base64 private key.
pub fn derive_public_key(private_key: &str) -> BoxResult<String> {
    let secret = decode_private_key(private_key)?;
    Ok(base64_encode(secret.public_key().as_bytes()))
}

/// Non-failing validity check.
///
/// Public keys must decode to 32 bytes. Private keys must decode to something
/// the X25519 primitive accepts as a scalar, which is likewise any 32 bytes
/// (clamping happens inside the primitive).
pub fn is_valid_key(key: &str, kind: KeyKind) -> bool {
    match kind {
        KeyKind::Public => base64_decode_array::<KEY_SIZE>(key).is_ok(),
        KeyKind::Private => decode_private_key(key).is_ok(),
    }
}

/// Normalize a key from raw bytes, hex or base64 into canonical base64.
///
/// Only the encoding is checked here, not the length; use [`is_valid_key`]
/// for that.
pub fn format_key(input: KeyInput<'_>) -> BoxResult<String> {
    let bytes = Zeroizing::new(match input {
        KeyInput::Raw(bytes) => bytes.to_vec(),
        KeyInput::Hex(text) => hex_decode(text)
            .map_err(|e| BoxError::invalid_key(format!("failed to format key: invalid hex: {e}")))?,
        KeyInput::Base64(text) => base64_decode(text).map_err(|e| {
            BoxError::invalid_key(format!("failed to format key: invalid base64: {e}"))
        })?,
    });

    if bytes.is_empty() {
        return Err(BoxError::invalid_key("failed to format key: key is empty"));
    }
    Ok(base64_encode(&bytes))
}

/// Fresh secret scalar for a key pair or an ephemeral sender key.
pub(crate) fn generate_secret() -> BoxResult<SecretKey> {
    let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng
        .try_fill_bytes(&mut bytes[..])
        .context("OS random source unavailable for key generation")?;
    Ok(SecretKey::from(*bytes))
}

pub(crate) fn decode_private_key(key: &str) -> BoxResult<SecretKey> {
    if key.is_empty() {
        return Err(BoxError::invalid_key("private key cannot be empty"));
    }
    let bytes = Zeroizing::new(
        base64_decode(key)
            .map_err(|e| BoxError::invalid_key(format!("private key is not valid base64: {e}")))?,
    );
    if bytes.len() != KEY_SIZE {
        return Err(BoxError::invalid_key(format!(
            "private key decoded to {} bytes (expected {KEY_SIZE})",
            bytes.len()
        )));
    }

    let mut scalar = Zeroizing::new([0u8; KEY_SIZE]);
    scalar.copy_from_slice(&bytes);
    Ok(SecretKey::from(*scalar))
}
