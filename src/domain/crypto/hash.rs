//! Digest helpers used across the engine.
//!
//! CUFE/CUDE fingerprints use SHA-384, API-key derivation and request
//! signatures use SHA-512, the WS-Security password and XML references use
//! SHA-256. All hex output is lowercase.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha384, Sha512};

/// SHA-256 of `data`, lowercase hex.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// SHA-256 of `data`, raw bytes.
#[must_use]
pub fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// SHA-384 of `data`, lowercase hex.
#[must_use]
pub fn sha384_hex(data: &[u8]) -> String {
    hex::encode(Sha384::digest(data))
}

/// SHA-512 of `data`, lowercase hex.
#[must_use]
pub fn sha512_hex(data: &[u8]) -> String {
    hex::encode(Sha512::digest(data))
}

/// HMAC-SHA256 of `data` under `key`.
#[must_use]
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // FIPS 180-2 test vector for "abc"
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sha384_known_vector() {
        assert_eq!(
            sha384_hex(b"abc"),
            "cb00753f45a35e8bb5a03d699ac65007272c32ab0eded1631a8b605a43ff5bed\
             8086072ba1e7cc2358baeca134c825a7"
                .replace(char::is_whitespace, "")
        );
    }

    #[test]
    fn sha512_known_vector() {
        assert_eq!(sha512_hex(b"abc").len(), 128);
        assert!(sha512_hex(b"abc").starts_with("ddaf35a193617aba"));
    }

    #[test]
    fn hmac_is_keyed() {
        let a = hmac_sha256(b"key-a", b"payload");
        let b = hmac_sha256(b"key-b", b"payload");
        assert_ne!(a, b);
        assert_eq!(a, hmac_sha256(b"key-a", b"payload"));
    }
}
