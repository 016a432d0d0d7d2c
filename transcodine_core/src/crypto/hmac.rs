//! HMAC-SHA-256 (RFC 2104).
//!
//! `original_source/src/crypto/hmac.c` is a broken stub that XOR-encrypts
//! the key instead of computing an HMAC; it is not followed here. This is
//! the standard `ipad`/`opad` (0x36/0x5c) construction instead.

use crate::constants::{SHA256_BLOCK_SIZE, SHA256_HASH_SIZE};
use crate::crypto::sha256::{self, Digest};

const IPAD: u8 = 0x36;
const OPAD: u8 = 0x5c;

fn block_sized_key(key: &[u8]) -> [u8; SHA256_BLOCK_SIZE] {
    let mut block = [0u8; SHA256_BLOCK_SIZE];
    if key.len() > SHA256_BLOCK_SIZE {
        let digest = sha256::hash(key);
        block[..SHA256_HASH_SIZE].copy_from_slice(&digest);
    } else {
        block[..key.len()].copy_from_slice(key);
    }
    block
}

/// Computes HMAC-SHA-256(key, data).
pub fn hash(key: &[u8], data: &[u8]) -> Digest {
    let key_block = block_sized_key(key);

    let mut ipad_key = [0u8; SHA256_BLOCK_SIZE];
    let mut opad_key = [0u8; SHA256_BLOCK_SIZE];
    for i in 0..SHA256_BLOCK_SIZE {
        ipad_key[i] = key_block[i] ^ IPAD;
        opad_key[i] = key_block[i] ^ OPAD;
    }

    let mut inner = sha256::Sha256::new();
    inner.update(&ipad_key);
    inner.update(data);
    let inner_digest = inner.finalize();

    let mut outer = sha256::Sha256::new();
    outer.update(&opad_key);
    outer.update(&inner_digest);
    outer.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(digest: &Digest) -> String {
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    // RFC 4231 test case 1.
    #[test]
    fn rfc4231_case1() {
        let key = [0x0bu8; 20];
        let data = b"Hi There";
        assert_eq!(
            hex(&hash(&key, data)),
            "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7"
        );
    }

    // RFC 4231 test case 2.
    #[test]
    fn rfc4231_case2() {
        let key = b"Jefe";
        let data = b"what do ya want for nothing?";
        assert_eq!(
            hex(&hash(key, data)),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }
}
