//! Envelope construction (sender side) and the envelope wire format
//!
//! Wire format (JSON, fields in this order, binary fields base64):
//! ```text
//! {
//!   "version":            "x25519-xsalsa20-poly1305",
//!   "nonce":              24 random bytes,
//!   "ephemeralPublicKey": 32-byte X25519 public key of the single-use sender key,
//!   "ciphertext":         16-byte Poly1305 tag || XSalsa20 body (NaCl box layout)
//! }
//! ```
//!
//! The same JSON may also travel hex-armored: `0x` + hex of the JSON text.

use std::str::FromStr;

use anyhow::Context;
use crypto_box::aead::generic_array::GenericArray;
use crypto_box::aead::Aead;
use crypto_box::{PublicKey, SalsaBox};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::codec::{base64_encode, hex_armor, hex_dearmor, HEX_ARMOR_PREFIX};
use crate::error::{BoxError, BoxResult};
use crate::keys::generate_secret;
use crate::validate::{decode_public_key, validate_envelope_format, validate_message};
use crate::{NONCE_SIZE, VERSION};

/// A sealed message. Immutable once built.
///
/// Obtained from [`encrypt`] or by parsing wire JSON; there is no public
/// constructor taking raw fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    version: String,
    nonce: String,
    ephemeral_public_key: String,
    ciphertext: String,
}

impl EncryptedEnvelope {
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn ephemeral_public_key(&self) -> &str {
        &self.ephemeral_public_key
    }

    pub fn ciphertext(&self) -> &str {
        &self.ciphertext
    }

    /// Fields paired with their wire names, in wire order.
    pub(crate) fn fields(&self) -> [(&'static str, &str); 4] {
        [
            ("version", &self.version),
            ("nonce", &self.nonce),
            ("ephemeralPublicKey", &self.ephemeral_public_key),
            ("ciphertext", &self.ciphertext),
        ]
    }

    /// Build from an untyped JSON value after [`validate_envelope_format`].
    pub fn from_value(value: serde_json::Value) -> BoxResult<Self> {
        validate_envelope_format(&value)?;
        serde_json::from_value(value)
            .map_err(|e| BoxError::invalid_message(format!("malformed envelope: {e}")))
    }

    pub fn from_json(text: &str) -> BoxResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| BoxError::invalid_message(format!("envelope is not valid JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn to_json(&self) -> BoxResult<String> {
        Ok(serde_json::to_string(self).context("envelope serialization")?)
    }

    pub fn to_json_pretty(&self) -> BoxResult<String> {
        Ok(serde_json::to_string_pretty(self).context("envelope serialization")?)
    }

    /// `0x` + hex of the compact JSON form.
    pub fn to_hex_armor(&self) -> BoxResult<String> {
        Ok(hex_armor(&self.to_json()?))
    }

    pub fn from_hex_armor(armored: &str) -> BoxResult<Self> {
        let json = hex_dearmor(armored)
            .map_err(|e| BoxError::invalid_message(format!("malformed envelope armor: {e:#}")))?;
        Self::from_json(&json)
    }

    /// Accept either JSON or hex armor, told apart by the `0x` prefix.
    pub fn parse(text: &str) -> BoxResult<Self> {
        if text.trim_start().starts_with(HEX_ARMOR_PREFIX) {
            Self::from_hex_armor(text)
        } else {
            Self::from_json(text)
        }
    }
}

impl FromStr for EncryptedEnvelope {
    type Err = BoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Seal `message` to `receiver_public_key` (base64).
///
/// A fresh ephemeral key pair and a fresh 24-byte nonce are drawn from the OS
/// CSPRNG on every call; the ephemeral secret is dropped before returning.
pub fn encrypt(receiver_public_key: &str, message: &str) -> BoxResult<EncryptedEnvelope> {
    validate_message(message)?;
    let receiver = PublicKey::from(decode_public_key(receiver_public_key)?);

    let ephemeral = generate_secret()?;
    let ephemeral_public = ephemeral.public_key();

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .context("OS random source unavailable for nonce generation")?;
    let nonce = GenericArray::from_slice(&nonce_bytes);

    // X25519(ephemeral secret, receiver public) -> HSalsa20 -> box key
    let salsa_box = SalsaBox::new(&receiver, &ephemeral);
    let ciphertext = salsa_box
        .encrypt(nonce, message.as_bytes())
        .map_err(|e| anyhow::anyhow!("XSalsa20-Poly1305 encryption failed: {e}"))?;

    tracing::debug!(
        plaintext_len = message.len(),
        ciphertext_len = ciphertext.len(),
        "sealed envelope"
    );

    Ok(EncryptedEnvelope {
        version: VERSION.to_string(),
        nonce: base64_encode(&nonce_bytes),
        ephemeral_public_key: base64_encode(ephemeral_public.as_bytes()),
        ciphertext: base64_encode(&ciphertext),
    })
}

/// Serialize `payload` to JSON text and seal it.
pub fn encrypt_json<T: Serialize + ?Sized>(
    receiver_public_key: &str,
    payload: &T,
) -> BoxResult<EncryptedEnvelope> {
    let text = serde_json::to_string(payload).context("payload serialization")?;
    encrypt(receiver_public_key, &text)
}
