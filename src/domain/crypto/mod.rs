//! Crypto primitives: digests, the AES-GCM envelope, randomness.
//!
//! Everything here is pure CPU work. Network and storage never appear below
//! this line.

pub mod cipher;
pub mod hash;
pub mod token;

pub use cipher::{open, open_string, seal};
pub use hash::{hmac_sha256, sha256, sha256_hex, sha384_hex, sha512_hex};
pub use token::{constant_time_eq, random_bytes, random_token};
