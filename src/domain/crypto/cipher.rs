//! AES-256-GCM envelope for all sensitive data at rest.
//!
//! Wire format: `base64(nonce || ciphertext || tag)` with a random 12-byte
//! nonce and the 16-byte GCM tag appended. The same envelope protects UBL
//! blobs, signed XML, request ZIPs, DIAN responses, API-key secrets and
//! certificate material.

use crate::domain::crypto::token::random_bytes;
use crate::infra::error::CryptoFailure;
use base64::engine::general_purpose;
use base64::Engine;
use openssl::symm::{decrypt_aead, encrypt_aead, Cipher};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypt `plaintext` under a 32-byte key; returns the base64 envelope.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<String, CryptoFailure> {
    let nonce = random_bytes(NONCE_LEN);
    let mut tag = [0u8; TAG_LEN];
    let ciphertext = encrypt_aead(
        Cipher::aes_256_gcm(),
        key,
        Some(&nonce),
        &[],
        plaintext,
        &mut tag,
    )?;

    let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len() + TAG_LEN);
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);
    envelope.extend_from_slice(&tag);
    Ok(general_purpose::STANDARD.encode(envelope))
}

/// Decrypt a base64 envelope produced by [`seal`].
pub fn open(key: &[u8; 32], envelope_b64: &str) -> Result<Vec<u8>, CryptoFailure> {
    let envelope = general_purpose::STANDARD
        .decode(envelope_b64)
        .map_err(|e| CryptoFailure::Internal(format!("envelope is not valid base64: {e}")))?;

    if envelope.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoFailure::Internal(
            "envelope shorter than nonce + tag".to_string(),
        ));
    }

    let (nonce, rest) = envelope.split_at(NONCE_LEN);
    let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);

    decrypt_aead(Cipher::aes_256_gcm(), key, Some(nonce), &[], ciphertext, tag)
        .map_err(|_| CryptoFailure::AuthTagMismatch)
}

/// Decrypt an envelope expected to hold UTF-8 text.
pub fn open_string(key: &[u8; 32], envelope_b64: &str) -> Result<String, CryptoFailure> {
    let bytes = open(key, envelope_b64)?;
    String::from_utf8(bytes)
        .map_err(|_| CryptoFailure::Internal("decrypted payload is not UTF-8".to_string()))
}
