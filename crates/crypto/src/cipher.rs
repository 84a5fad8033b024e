//! Message content encryption using AES-256-GCM.
//!
//! Envelope format: `"encrypted_" || base64(nonce (12 bytes) || ciphertext || auth tag (16 bytes))`.
//! Content without the marker is legacy plaintext and passes through
//! `decrypt_content` untouched.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use companion_shared::constants::ENCRYPTED_PREFIX;
use rand::RngCore;

use crate::error::CryptoError;
use crate::key_manager::MessageKey;

const NONCE_SIZE: usize = 12; // 96-bit nonce for AES-256-GCM
const TAG_SIZE: usize = 16;

/// Whether `content` is an encrypted envelope.
pub fn is_encrypted(content: &str) -> bool {
    content.starts_with(ENCRYPTED_PREFIX)
}

/// Encrypt message text into an envelope. Every call uses a fresh random
/// nonce, so identical plaintexts produce distinct envelopes.
pub fn encrypt(plaintext: &str, key: &MessageKey) -> Result<String, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut data = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    data.extend_from_slice(&nonce_bytes);
    data.extend_from_slice(&ciphertext);

    let encoded = base64::engine::general_purpose::STANDARD.encode(&data);
    Ok(format!("{ENCRYPTED_PREFIX}{encoded}"))
}

/// Decrypt an envelope produced by [`encrypt`].
///
/// Fails with `DecryptionFailed` for a foreign key, a truncated or tampered
/// envelope, or content missing the envelope marker.
pub fn decrypt(envelope: &str, key: &MessageKey) -> Result<String, CryptoError> {
    let encoded = envelope
        .strip_prefix(ENCRYPTED_PREFIX)
        .ok_or_else(|| CryptoError::DecryptionFailed("missing envelope marker".into()))?;

    let data = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| CryptoError::DecryptionFailed(format!("invalid envelope encoding: {e}")))?;

    if data.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::DecryptionFailed(
            "envelope too short to contain nonce and tag".into(),
        ));
    }

    let (nonce_bytes, ciphertext_with_tag) = data.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

    let plaintext = cipher
        .decrypt(nonce, ciphertext_with_tag)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::DecryptionFailed("plaintext is not valid UTF-8".into()))
}

/// Decrypt stored content, passing legacy plaintext through unchanged.
pub fn decrypt_content(content: &str, key: &MessageKey) -> Result<String, CryptoError> {
    if is_encrypted(content) {
        decrypt(content, key)
    } else {
        Ok(content.to_string())
    }
}
