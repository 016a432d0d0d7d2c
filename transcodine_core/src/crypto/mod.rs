//! Symmetric cryptographic toolkit, built from scratch: AES-128, AES-CTR,
//! SHA-256, HMAC-SHA-256, PBKDF2-HMAC-SHA256, and a `/dev/urandom` source.
//!
//! This module intentionally does not depend on `aes`, `sha2`, `hmac`, or
//! `pbkdf2` crates. Hand-rolling these primitives is the actual subject of
//! this crate, not a gap to fill with the ecosystem's usual answer.

pub mod aes;
pub mod aes_ctr;
pub mod hmac;
pub mod pbkdf2;
pub mod sha256;
pub mod urandom;

use crate::constants::AES_KEY_SIZE;

/// Slices a carried 32-byte secret (KEK, database key, bin key) down to the
/// 16 bytes actually fed into AES-128 key expansion.
///
/// See `DESIGN.md` open question 1: the format's secrets are generated and
/// stored at [`crate::constants::KEK_SIZE`] (32 bytes), but AES-128 only
/// ever consumes the first [`AES_KEY_SIZE`] of them.
pub fn aes128_key_slice(key: &[u8]) -> &[u8; AES_KEY_SIZE] {
    key[..AES_KEY_SIZE]
        .try_into()
        .expect("key must be at least AES_KEY_SIZE bytes")
}
