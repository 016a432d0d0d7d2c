//! Key derivation glue and the two reserved database namespaces.
//!
//! Grounded on `original_source/src/db.c`'s `db_derive_key` and
//! `db_ns_key`.

use crate::constants::{DB_KEY_DERIVATION_SALT, KEK_SIZE, PBKDF2_ITERATIONS};
use crate::crypto::pbkdf2;

/// A reserved database key namespace. Using a typed constant instead of a
/// bare string literal turns a namespace typo into a compile error, instead
/// of leaving namespace discipline entirely up to the caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Namespace(&'static str);

impl Namespace {
    /// Maps a bin id to metadata about that bin.
    pub const BIN_ID: Namespace = Namespace("bin-id");
    /// Maps a bin id to the on-disk file backing it.
    pub const BIN_FILE: Namespace = Namespace("bin-file");

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

/// Builds a namespaced key in the `namespace:key` form `db_ns_key` wrote,
/// as raw bytes so callers can namespace keys that aren't valid UTF-8.
pub fn namespaced_key(namespace: Namespace, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(namespace.as_str().len() + 1 + key.len());
    out.extend_from_slice(namespace.as_str().as_bytes());
    out.push(b':');
    out.extend_from_slice(key);
    out
}

/// Derives the database's AES key from the KEK via PBKDF2 over the fixed
/// purpose-salt `"aes-key-edb"`.
pub fn derive_db_key(kek: &[u8]) -> [u8; KEK_SIZE] {
    let derived = pbkdf2::derive(kek, DB_KEY_DERIVATION_SALT, PBKDF2_ITERATIONS, KEK_SIZE);
    derived.try_into().expect("pbkdf2::derive returns exactly dklen bytes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_key_uses_colon_separator() {
        let key = namespaced_key(Namespace::BIN_ID, b"abc123");
        assert_eq!(key, b"bin-id:abc123");
    }

    #[test]
    fn derive_db_key_is_deterministic() {
        let kek = [0x7a; KEK_SIZE];
        assert_eq!(derive_db_key(&kek), derive_db_key(&kek));
    }

    #[test]
    fn derive_db_key_differs_per_kek() {
        let a = derive_db_key(&[0x01; KEK_SIZE]);
        let b = derive_db_key(&[0x02; KEK_SIZE]);
        assert_ne!(a, b);
    }
}
