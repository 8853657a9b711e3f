//! anonbox-crypto: sender-anonymous public-key envelopes
//!
//! Construction: ephemeral X25519 key agreement + XSalsa20-Poly1305 (NaCl box)
//!
//! ```text
//! sender                                   recipient
//!   ephemeral (esk, epk) <- OsRng
//!   nonce (24 bytes)     <- OsRng
//!   key = HSalsa20(X25519(esk, rpk))         key = HSalsa20(X25519(rsk, epk))
//!   ct  = XSalsa20-Poly1305(key, nonce, m)   m   = open(key, nonce, ct)
//!
//!   envelope = { version, nonce, ephemeralPublicKey, ciphertext }   (base64 fields)
//! ```
//!
//! The ephemeral secret is dropped at the end of `encrypt`, so the sender
//! cannot decrypt its own envelope and the recipient learns nothing about who
//! sent it.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod open;
pub mod validate;

pub use envelope::{encrypt, encrypt_json, EncryptedEnvelope};
pub use error::{BoxError, BoxResult};
pub use keys::{
    derive_public_key, format_key, generate_key_pair, is_valid_key, KeyEncoding, KeyInput,
    KeyKind, KeyPair,
};
pub use open::{decrypt, decrypt_json};
pub use validate::{validate_envelope_format, validate_message, validate_public_key_format};

/// The only envelope version this crate produces or accepts.
pub const VERSION: &str = "x25519-xsalsa20-poly1305";

/// Size of an X25519 public or private key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an XSalsa20 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Largest plaintext accepted by `encrypt`, in UTF-8 bytes (1 MiB)
pub const MAX_MESSAGE_LENGTH: usize = 1024 * 1024;
