//! Envelope opening (recipient side)
//!
//! Checks run cheapest-first: structure, version, private key, field
//! decoding and lengths. Only then is the box key derived and the tag
//! verified. A failed tag never yields partial plaintext.

use anyhow::Context;
use crypto_box::aead::generic_array::GenericArray;
use crypto_box::aead::Aead;
use crypto_box::{PublicKey, SalsaBox};
use serde::de::DeserializeOwned;
use zeroize::Zeroizing;

use crate::codec::{base64_decode, base64_decode_array};
use crate::envelope::EncryptedEnvelope;
use crate::error::{BoxError, BoxResult};
use crate::keys::decode_private_key;
use crate::validate::validate_envelope_fields;
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE, VERSION};

/// Open `envelope` with the recipient's base64 private key.
pub fn decrypt(receiver_private_key: &str, envelope: &EncryptedEnvelope) -> BoxResult<String> {
    validate_envelope_fields(envelope.fields())?;

    if envelope.version() != VERSION {
        return Err(BoxError::invalid_message(format!(
            "unsupported version: {:?}",
            envelope.version()
        )));
    }

    let receiver = decode_private_key(receiver_private_key)?;

    let nonce_bytes = base64_decode_array::<NONCE_SIZE>(envelope.nonce())
        .map_err(|e| BoxError::invalid_message(format!("nonce {e}")))?;
    let ephemeral_bytes = base64_decode_array::<KEY_SIZE>(envelope.ephemeral_public_key())
        .map_err(|e| BoxError::invalid_message(format!("ephemeralPublicKey {e}")))?;
    // X25519 ignores bit 255; honest senders always leave it clear
    if ephemeral_bytes[KEY_SIZE - 1] & 0x80 != 0 {
        return Err(BoxError::invalid_message(
            "ephemeralPublicKey is not a canonical X25519 point encoding",
        ));
    }
    let ciphertext = base64_decode(envelope.ciphertext())
        .map_err(|e| BoxError::invalid_message(format!("ciphertext is not valid base64: {e}")))?;
    if ciphertext.len() < TAG_SIZE {
        return Err(BoxError::invalid_message(format!(
            "ciphertext too short: {} bytes (minimum {TAG_SIZE})",
            ciphertext.len()
        )));
    }

    // X25519(receiver secret, ephemeral public): same shared secret as the sender's
    let ephemeral = PublicKey::from(ephemeral_bytes);
    let salsa_box = SalsaBox::new(&ephemeral, &receiver);
    let plaintext = Zeroizing::new(
        salsa_box
            .decrypt(GenericArray::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|_| {
                tracing::debug!(
                    ciphertext_len = ciphertext.len(),
                    "envelope authentication failed"
                );
                anyhow::anyhow!(
                    "decryption failed: wrong private key, corrupted data, or tampered envelope"
                )
            })?,
    );

    tracing::debug!(plaintext_len = plaintext.len(), "opened envelope");

    let text = std::str::from_utf8(&plaintext)
        .context("decrypted message is not valid UTF-8")?
        .to_owned();
    Ok(text)
}

/// Open `envelope` and parse the plaintext as JSON.
pub fn decrypt_json<T: DeserializeOwned>(
    receiver_private_key: &str,
    envelope: &EncryptedEnvelope,
) -> BoxResult<T> {
    let text = Zeroizing::new(decrypt(receiver_private_key, envelope)?);
    Ok(serde_json::from_str(&text).context("decrypted payload is not the expected JSON")?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::base64_encode;
    use crate::envelope::{encrypt, encrypt_json};
    use crate::keys::{generate_key_pair, KeyPair};
    use secrecy::ExposeSecret;
    use serde_json::{json, Value};

    fn private(kp: &KeyPair) -> &str {
        kp.private_key().expose_secret()
    }

    /// Rebuild an envelope with one field replaced, going through the wire form.
    fn with_field(envelope: &EncryptedEnvelope, field: &str, value: &str) -> EncryptedEnvelope {
        let mut raw: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        raw[field] = Value::String(value.to_string());
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let kp = generate_key_pair().unwrap();
        let envelope = encrypt(kp.public_key(), "hello").unwrap();
        assert_eq!(decrypt(private(&kp), &envelope).unwrap(), "hello");
    }

    #[test]
    fn test_roundtrip_multibyte_text() {
        let kp = generate_key_pair().unwrap();
        let msg = "héllo wörld, 你好, 🔐";
        let envelope = encrypt(kp.public_key(), msg).unwrap();
        assert_eq!(decrypt(private(&kp), &envelope).unwrap(), msg);
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let alice = generate_key_pair().unwrap();
        let mallory = generate_key_pair().unwrap();

        let envelope = encrypt(alice.public_key(), "secret data").unwrap();
        let err = decrypt(private(&mallory), &envelope).unwrap_err();

        assert!(err.is_encryption(), "wrong key must be an integrity failure");
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let kp = generate_key_pair().unwrap();
        let envelope = encrypt(kp.public_key(), "hi").unwrap();
        let future = with_field(&envelope, "version", "x25519-xsalsa20-poly1305-v2");

        let err = decrypt(private(&kp), &future).unwrap_err();
        assert!(err.is_invalid_message());
        assert!(err.to_string().contains("unsupported version"));
    }

    #[test]
    fn test_version_checked_before_private_key() {
        let kp = generate_key_pair().unwrap();
        let envelope = encrypt(kp.public_key(), "hi").unwrap();
        let future = with_field(&envelope, "version", "v0");

        // A malformed key would be InvalidKey; the version gate comes first
        assert!(decrypt("", &future).unwrap_err().is_invalid_message());
    }

    #[test]
    fn test_empty_field_rejected() {
        let kp = generate_key_pair().unwrap();
        let envelope = encrypt(kp.public_key(), "hi").unwrap();
        let emptied = with_field(&envelope, "ciphertext", "");

        let err = decrypt(private(&kp), &emptied).unwrap_err();
        assert!(err.is_invalid_message());
        assert!(err.to_string().contains("'ciphertext' cannot be empty"));
    }

    #[test]
    fn test_malformed_private_key() {
        let kp = generate_key_pair().unwrap();
        let envelope = encrypt(kp.public_key(), "hi").unwrap();

        assert!(decrypt("", &envelope).unwrap_err().is_invalid_key());
        assert!(decrypt("!!", &envelope).unwrap_err().is_invalid_key());
        assert!(decrypt(&base64_encode(&[1u8; 31]), &envelope)
            .unwrap_err()
            .is_invalid_key());
    }

    #[test]
    fn test_field_length_invariants() {
        let kp = generate_key_pair().unwrap();
        let envelope = encrypt(kp.public_key(), "hi").unwrap();

        let short_nonce = with_field(&envelope, "nonce", &base64_encode(&[0u8; 23]));
        assert!(decrypt(private(&kp), &short_nonce)
            .unwrap_err()
            .is_invalid_message());

        let long_epk = with_field(&envelope, "ephemeralPublicKey", &base64_encode(&[0u8; 33]));
        assert!(decrypt(private(&kp), &long_epk)
            .unwrap_err()
            .is_invalid_message());

        let short_ct = with_field(&envelope, "ciphertext", &base64_encode(&[0u8; 15]));
        let err = decrypt(private(&kp), &short_ct).unwrap_err();
        assert!(err.is_invalid_message());
        assert!(err.to_string().contains("too short"));

        let bad_b64 = with_field(&envelope, "nonce", "not*base64");
        assert!(decrypt(private(&kp), &bad_b64)
            .unwrap_err()
            .is_invalid_message());
    }

    #[test]
    fn test_high_bit_ephemeral_key_rejected() {
        let kp = generate_key_pair().unwrap();
        let envelope = encrypt(kp.public_key(), "hi").unwrap();

        let mut epk = base64_decode(envelope.ephemeral_public_key()).unwrap();
        epk[KEY_SIZE - 1] ^= 0x80;
        let flipped = with_field(&envelope, "ephemeralPublicKey", &base64_encode(&epk));

        assert!(decrypt(private(&kp), &flipped)
            .unwrap_err()
            .is_invalid_message());
    }

    #[test]
    fn test_tag_only_ciphertext_fails_authentication() {
        let kp = generate_key_pair().unwrap();
        let envelope = encrypt(kp.public_key(), "hi").unwrap();
        let tag_only = with_field(&envelope, "ciphertext", &base64_encode(&[0u8; TAG_SIZE]));

        assert!(decrypt(private(&kp), &tag_only).unwrap_err().is_encryption());
    }

    #[test]
    fn test_tampered_ciphertext() {
        let kp = generate_key_pair().unwrap();
        let envelope = encrypt(kp.public_key(), "secret data").unwrap();

        let mut ct = base64_decode(envelope.ciphertext()).unwrap();
        ct[0] ^= 0xFF;
        let tampered = with_field(&envelope, "ciphertext", &base64_encode(&ct));

        let err = decrypt(private(&kp), &tampered).unwrap_err();
        assert!(err.is_encryption(), "tampered ciphertext must fail");
        assert!(err.to_string().contains("decryption failed"));
    }

    #[test]
    fn test_invalid_utf8_plaintext_is_distinct_from_auth_failure() {
        let kp = generate_key_pair().unwrap();
        let receiver = PublicKey::from(
            base64_decode_array::<KEY_SIZE>(kp.public_key()).unwrap(),
        );
        let sender = crate::keys::generate_secret().unwrap();
        let nonce = [7u8; NONCE_SIZE];
        let ciphertext = SalsaBox::new(&receiver, &sender)
            .encrypt(GenericArray::from_slice(&nonce), &[0xFFu8, 0xFE, 0xFD][..])
            .unwrap();

        let envelope = EncryptedEnvelope::from_value(json!({
            "version": VERSION,
            "nonce": base64_encode(&nonce),
            "ephemeralPublicKey": base64_encode(sender.public_key().as_bytes()),
            "ciphertext": base64_encode(&ciphertext),
        }))
        .unwrap();

        let err = decrypt(private(&kp), &envelope).unwrap_err();
        assert!(err.is_encryption());
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn test_decrypt_json_payload() {
        let kp = generate_key_pair().unwrap();
        let payload = json!({"to": "0xabc", "amount": 42, "memo": "rent"});
        let envelope = encrypt_json(kp.public_key(), &payload).unwrap();

        let opened: Value = decrypt_json(private(&kp), &envelope).unwrap();
        assert_eq!(opened, payload);
    }

    #[test]
    fn test_decrypt_json_wrong_shape() {
        let kp = generate_key_pair().unwrap();
        let envelope = encrypt(kp.public_key(), "plain words").unwrap();

        let err = decrypt_json::<Value>(private(&kp), &envelope).unwrap_err();
        assert!(err.is_encryption());
    }

    // NaCl tests/box.c: alice seals to bob
    const ALICE_SK: &str = "77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a";
    const BOB_SK: &str = "5dab087e624a8a4b79e17f8b83800ee66f3bb1292618b6fd1c2f8b27ff88e0eb";
    const BOX_NONCE: &str = "69696ee955b62b73cd62bda875fc73d68219e0036b7a0b37";
    const BOX_MESSAGE: &str = concat!(
        "be075fc53c81f2d5cf141316ebeb0c7b5228c52a4c62cbd44b66849b64244ffc",
        "e5ecbaaf33bd751a1ac728d45e6c61296cdc3c01233561f41db66cce314adb31",
        "0e3be8250c46f06dceea3a7fa1348057e2f6556ad6b1318a024a838f21af1fde",
        "048977eb48f59ffd4924ca1c60902e52f0a089bc76897040e082f937763848645e0705",
    );

    fn secret_from_hex(s: &str) -> crypto_box::SecretKey {
        let bytes: [u8; KEY_SIZE] = hex::decode(s).unwrap().try_into().unwrap();
        crypto_box::SecretKey::from(bytes)
    }

    fn peer_envelope(sender_pk: &PublicKey, nonce: &[u8], ciphertext: &[u8]) -> EncryptedEnvelope {
        EncryptedEnvelope::from_value(json!({
            "version": VERSION,
            "nonce": base64_encode(nonce),
            "ephemeralPublicKey": base64_encode(sender_pk.as_bytes()),
            "ciphertext": base64_encode(ciphertext),
        }))
        .unwrap()
    }

    #[test]
    fn test_nacl_box_vector_layout() {
        let alice = secret_from_hex(ALICE_SK);
        let bob = secret_from_hex(BOB_SK);
        let nonce = hex::decode(BOX_NONCE).unwrap();
        let message = hex::decode(BOX_MESSAGE).unwrap();
        assert_eq!(message.len(), 131);

        let ciphertext = SalsaBox::new(&bob.public_key(), &alice)
            .encrypt(GenericArray::from_slice(&nonce), message.as_slice())
            .unwrap();

        // Poly1305 tag first, then the XSalsa20 body
        assert_eq!(ciphertext.len(), TAG_SIZE + message.len());
        assert_eq!(hex::encode(&ciphertext[..TAG_SIZE]), "f3ffc7703f9400e52a7dfb4b3d3305d9");

        // Authenticates under bob's key; the vector plaintext is binary, not UTF-8
        let envelope = peer_envelope(&alice.public_key(), &nonce, &ciphertext);
        let bob_b64 = base64_encode(&bob.to_bytes());
        let err = decrypt(&bob_b64, &envelope).unwrap_err();
        assert!(err.is_encryption());
        assert!(err.to_string().contains("not valid UTF-8"), "{err}");
    }

    #[test]
    fn test_opens_peer_built_envelope() {
        let alice = secret_from_hex(ALICE_SK);
        let bob = secret_from_hex(BOB_SK);
        let nonce = hex::decode(BOX_NONCE).unwrap();
        let msg = "hello from a NaCl peer";

        let ciphertext = SalsaBox::new(&bob.public_key(), &alice)
            .encrypt(GenericArray::from_slice(&nonce), msg.as_bytes())
            .unwrap();
        let bob_b64 = base64_encode(&bob.to_bytes());

        let envelope = peer_envelope(&alice.public_key(), &nonce, &ciphertext);
        assert_eq!(decrypt(&bob_b64, &envelope).unwrap(), msg);

        // Same bytes with the tag moved to the end must not open
        let mut tag_last = ciphertext[TAG_SIZE..].to_vec();
        tag_last.extend_from_slice(&ciphertext[..TAG_SIZE]);
        let swapped = peer_envelope(&alice.public_key(), &nonce, &tag_last);
        assert!(decrypt(&bob_b64, &swapped).unwrap_err().is_encryption());
    }
}
