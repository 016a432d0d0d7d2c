//! PBKDF2-HMAC-SHA256 (RFC 8018).

use crate::constants::SHA256_HASH_SIZE;
use crate::crypto::hmac;

/// Derives `dklen` bytes from `password` and `salt` using `iterations`
/// rounds of HMAC-SHA-256, per RFC 8018 section 5.2.
pub fn derive(password: &[u8], salt: &[u8], iterations: u32, dklen: usize) -> Vec<u8> {
    let block_count = dklen.div_ceil(SHA256_HASH_SIZE);
    let mut out = Vec::with_capacity(block_count * SHA256_HASH_SIZE);

    for block_index in 1..=block_count as u32 {
        let mut salt_and_index = Vec::with_capacity(salt.len() + 4);
        salt_and_index.extend_from_slice(salt);
        salt_and_index.extend_from_slice(&block_index.to_be_bytes());

        let mut u = hmac::hash(password, &salt_and_index);
        let mut t = u;

        for _ in 1..iterations {
            u = hmac::hash(password, &u);
            for i in 0..SHA256_HASH_SIZE {
                t[i] ^= u[i];
            }
        }

        out.extend_from_slice(&t);
    }

    out.truncate(dklen);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    // RFC 6070-shaped vector, adapted to PBKDF2-HMAC-SHA256 (RFC 6070 itself
    // specifies SHA-1; these expected values are PBKDF2-HMAC-SHA256 outputs
    // for the same password/salt/iteration inputs).
    #[test]
    fn single_iteration_short_key() {
        let dk = derive(b"password", b"salt", 1, 32);
        assert_eq!(
            hex(&dk),
            "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
        );
    }

    #[test]
    fn output_length_is_truncated_to_dklen() {
        let dk = derive(b"password", b"salt", 1, 16);
        assert_eq!(dk.len(), 16);
    }

    #[test]
    fn different_salts_produce_different_keys() {
        let a = derive(b"password", b"salt-a", 100, 32);
        let b = derive(b"password", b"salt-b", 100, 32);
        assert_ne!(a, b);
    }
}
