//! Direct `/dev/urandom` reads, matching
//! `original_source/src/crypto/urandom.c` exactly: this module's whole
//! purpose is being the raw entropy source, so it opens the device file
//! itself rather than going through `rand`'s `OsRng`.

use std::fs::File;
use std::io::Read;

const BASE62: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Reads `len` random bytes from `/dev/urandom`.
///
/// Returns `None` if the device couldn't be opened (recoverable: the caller
/// decides whether that's fatal in its own context). A successful open that
/// yields fewer than `len` bytes is a programming-environment invariant
/// violation and panics, matching the original's unconditional `freads`
/// after a successful `fopen`.
pub fn bytes(len: usize) -> Option<Vec<u8>> {
    let mut f = File::open("/dev/urandom").ok()?;

    let mut buf = vec![0u8; len];
    f.read_exact(&mut buf)
        .expect("short read from /dev/urandom after successful open");
    Some(buf)
}

/// Reads `len` random bytes from `/dev/urandom` and maps each byte onto the
/// base62 alphabet (`[A-Za-z0-9]`), for generating bin ids.
pub fn ascii(len: usize) -> Option<Vec<u8>> {
    bytes(len).map(|mut buf| {
        for b in buf.iter_mut() {
            *b = BASE62[(*b as usize) % 62];
        }
        buf
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_requested_length() {
        let buf = bytes(32).expect("/dev/urandom should be available in CI");
        assert_eq!(buf.len(), 32);
    }

    #[test]
    fn ascii_output_is_base62() {
        let buf = ascii(64).expect("/dev/urandom should be available in CI");
        assert!(buf.iter().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn successive_reads_differ() {
        let a = bytes(32).unwrap();
        let b = bytes(32).unwrap();
        assert_ne!(a, b);
    }
}
