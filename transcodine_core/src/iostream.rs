//! The cipher I/O stream: random-access encrypting/decrypting reads and
//! writes over a file, tracking where in the file the ciphertext starts
//! (`file_offset`) and how far into the logical plaintext stream the cursor
//! has advanced (`stream_offset`).
//!
//! A `CipherStream` cannot seek backwards — re-open a new one to do that —
//! but [`CipherStream::skip`] can move the cursor forward lazily, only
//! updating the tracked offsets until the next read or write finalizes the
//! seek in the file.
//!
//! Grounded on `original_source/include/iostream.h` and `src/iostream.c`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::constants::AES_BLOCK_SIZE;
use crate::crypto::aes::AesCtx;
use crate::crypto::aes_ctr;
use crate::error::CoreError;

pub struct CipherStream<'a> {
    file: &'a mut File,
    ctx: &'a AesCtx,
    iv: [u8; AES_BLOCK_SIZE],
    file_offset: u64,
    stream_offset: u64,
}

impl<'a> CipherStream<'a> {
    /// Wraps `file`, decrypting/encrypting relative to `iv`, with the
    /// ciphertext body starting at byte `offset` from the start of the
    /// file (i.e. past whatever plaintext global header precedes it).
    pub fn new(file: &'a mut File, ctx: &'a AesCtx, iv: [u8; AES_BLOCK_SIZE], offset: u64) -> Self {
        Self {
            file,
            ctx,
            iv,
            file_offset: offset,
            stream_offset: 0,
        }
    }

    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }

    pub fn stream_offset(&self) -> u64 {
        self.stream_offset
    }

    /// Reads `len` bytes of ciphertext from the current position and
    /// returns the decrypted plaintext.
    pub fn read(&mut self, len: usize) -> Result<Vec<u8>, CoreError> {
        self.file.seek(SeekFrom::Start(self.file_offset))?;

        let mut ciphertext = vec![0u8; len];
        self.file.read_exact(&mut ciphertext).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                CoreError::UnexpectedEof {
                    expected: len,
                    got: 0,
                }
            } else {
                CoreError::Io(e)
            }
        })?;

        let plaintext = aes_ctr::crypt_at_offset(self.ctx, &self.iv, self.stream_offset, &ciphertext);

        self.file_offset += len as u64;
        self.stream_offset += len as u64;
        Ok(plaintext)
    }

    /// Encrypts `data` and writes it at the current position.
    pub fn write(&mut self, data: &[u8]) -> Result<(), CoreError> {
        let ciphertext = aes_ctr::crypt_at_offset(self.ctx, &self.iv, self.stream_offset, data);

        self.file.seek(SeekFrom::Start(self.file_offset))?;
        self.file.write_all(&ciphertext)?;

        self.file_offset += data.len() as u64;
        self.stream_offset += data.len() as u64;
        Ok(())
    }

    /// Lazily advances both offsets by `n` bytes without touching the file.
    pub fn skip(&mut self, n: u64) {
        self.file_offset += n;
        self.stream_offset += n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::AES_KEY_SIZE;
    use std::io::Write as _;

    fn ctx() -> AesCtx {
        AesCtx::new(&[0x11; AES_KEY_SIZE])
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut tmp = tempfile::tempfile().unwrap();
        tmp.write_all(b"plaintext-header-untouched").unwrap();

        let aes = ctx();
        let iv = [0x22; AES_BLOCK_SIZE];
        let header_len = 10u64;

        {
            let mut w = CipherStream::new(&mut tmp, &aes, iv, header_len);
            w.write(b"hello, streamed world").unwrap();
        }

        let mut r = CipherStream::new(&mut tmp, &aes, iv, header_len);
        let out = r.read(b"hello, streamed world".len()).unwrap();
        assert_eq!(out, b"hello, streamed world");
    }

    #[test]
    fn skip_advances_without_touching_file() {
        let mut tmp = tempfile::tempfile().unwrap();
        let aes = ctx();
        let iv = [0x33; AES_BLOCK_SIZE];

        let mut s = CipherStream::new(&mut tmp, &aes, iv, 0);
        assert_eq!(s.stream_offset(), 0);
        s.skip(5);
        assert_eq!(s.stream_offset(), 5);
        assert_eq!(s.file_offset(), 5);
    }

    #[test]
    fn reading_past_eof_is_unexpected_eof() {
        let mut tmp = tempfile::tempfile().unwrap();
        let aes = ctx();
        let iv = [0x44; AES_BLOCK_SIZE];

        let mut s = CipherStream::new(&mut tmp, &aes, iv, 0);
        assert!(matches!(
            s.read(10),
            Err(CoreError::UnexpectedEof { .. })
        ));
    }
}
