//! ARC64: a TAR-inspired encrypted bin archive.
//!
//! ```text
//! [40-byte Global Header]
//!   [8-byte VERSION]: "ARCHV-64"
//!   [16-byte BIN_ID]
//!   [16-byte AES_IV]
//! [8-byte Magic Block]
//!   [8-byte MAGIC]: "UNLOCKED"
//! [24-byte File Header]
//!   [8-byte MAGIC]: "ARCHVFLE"
//!   [8-byte PATH_LEN]
//!   [8-byte DATA_LEN]
//! [File Data]
//!   [... FILE_PATH_DATA]
//!   [... FILE_DATA]
//! [Footer]
//!   [8-byte END]: "ARCHVEND"
//! ```
//!
//! `PATH_LEN` includes a trailing NUL byte the path is stored with, matching
//! `original_source/src/command/bin/add.c`'s `buf_write(&fq_path, 0)` before
//! the path is handed to `bin_addfile`.
//!
//! Opening a bin decrypts it onto `decrypted_path` in full; file operations
//! (add/list/fetch/remove) work directly on that plaintext working copy.
//! Closing re-encrypts it back onto `encrypted_path`, rotating the IV first
//! if the bin was modified. Grounded on `original_source/include/bin.h` and
//! `src/bin.c`.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::constants::{
    AES_IV_SIZE, BIN_FILE_HEADER_SIZE, BIN_GLOBAL_HEADER_SIZE, BIN_ID_SIZE, BIN_MAGIC_END,
    BIN_MAGIC_FILE, BIN_MAGIC_UNLOCKED, BIN_MAGIC_VERSION, KEK_SIZE, MAGIC_SIZE, READFILE_CHUNK,
};
use crate::crypto::aes::AesCtx;
use crate::crypto::{aes128_key_slice, aes_ctr, urandom};
use crate::error::CoreError;
use crate::fsutil;
use crate::log::debug;

/// A bin archive. Holds no secret material itself: the AES key is supplied
/// by the caller (looked up in the database under the [`crate::keys::Namespace::BIN_ID`]
/// namespace) on every open/close call.
pub struct Bin {
    id: Vec<u8>,
    iv: [u8; AES_IV_SIZE],
    encrypted_path: PathBuf,
    decrypted_path: PathBuf,
    open: bool,
    dirty: bool,
}

/// Location of a stored file entry, as found by [`Bin::find_file`].
struct FileEntry {
    /// Offset where the entry's data begins (past the NUL-terminated path).
    data_offset: u64,
    data_len: usize,
}

/// A streamed write in progress, returned by [`Bin::open_file`]. Chunk size
/// is unconstrained: each [`Bin::write_file`] call appends its chunk and
/// rewrites the footer, so the working copy stays well-formed between calls
/// regardless of how the caller splits the data.
pub struct BinFileWriter {
    /// Offset of the 8-byte `DATA_LEN` field to backfill on close.
    data_len_offset: u64,
    /// Offset where the next chunk should be written.
    cursor: u64,
    written: u64,
}

impl Bin {
    /// Creates a new, empty bin at `encrypted_path`. Returns the bin handle
    /// (closed) and a freshly generated AES key for it. Do not use this to
    /// open an existing bin.
    pub fn create(encrypted_path: impl Into<PathBuf>) -> Result<(Self, [u8; KEK_SIZE]), CoreError> {
        let encrypted_path = encrypted_path.into();
        debug!("creating bin at {}", encrypted_path.display());

        let id = urandom::ascii(BIN_ID_SIZE).ok_or(CoreError::UrandomUnavailable)?;
        let iv: [u8; AES_IV_SIZE] = urandom::bytes(AES_IV_SIZE)
            .ok_or(CoreError::UrandomUnavailable)?
            .try_into()
            .unwrap();
        let key: [u8; KEK_SIZE] = urandom::bytes(KEK_SIZE)
            .ok_or(CoreError::UrandomUnavailable)?
            .try_into()
            .unwrap();

        let mut f = File::create(&encrypted_path)?;
        f.write_all(BIN_MAGIC_VERSION)?;
        f.write_all(&id)?;
        f.write_all(&iv)?;

        let mut body = Vec::with_capacity(MAGIC_SIZE * 2);
        body.extend_from_slice(BIN_MAGIC_UNLOCKED);
        body.extend_from_slice(BIN_MAGIC_END);

        let ctx = AesCtx::new(aes128_key_slice(&key));
        let ciphertext = aes_ctr::crypt_at_offset(&ctx, &iv, 0, &body);
        f.write_all(&ciphertext)?;

        Ok((
            Self {
                id,
                iv,
                encrypted_path,
                decrypted_path: PathBuf::new(),
                open: false,
                dirty: false,
            },
            key,
        ))
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Decrypts the bin at `encrypted_path` onto `decrypted_path` using
    /// `aes_key`. Leaves the working file removed if decryption doesn't
    /// reveal the `UNLOCKED` sentinel (wrong key or corrupted file).
    pub fn open(
        encrypted_path: impl Into<PathBuf>,
        decrypted_path: impl Into<PathBuf>,
        aes_key: &[u8],
    ) -> Result<Self, CoreError> {
        let encrypted_path = encrypted_path.into();
        let decrypted_path = decrypted_path.into();
        debug!("opening bin at {}", encrypted_path.display());

        let mut enc_file = File::open(&encrypted_path)?;
        let mut global_header = [0u8; BIN_GLOBAL_HEADER_SIZE];
        fsutil::read_exact(&mut enc_file, &mut global_header)?;

        let id = global_header[MAGIC_SIZE..MAGIC_SIZE + BIN_ID_SIZE].to_vec();
        let iv: [u8; AES_IV_SIZE] = global_header[MAGIC_SIZE + BIN_ID_SIZE..BIN_GLOBAL_HEADER_SIZE]
            .try_into()
            .unwrap();

        let mut dec_file = File::create(&decrypted_path)?;
        dec_file.write_all(&global_header)?;

        let ctx = AesCtx::new(aes128_key_slice(aes_key));
        let mut stream_offset = 0u64;
        let mut chunk = [0u8; READFILE_CHUNK];
        loop {
            let n = enc_file.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            let plaintext = aes_ctr::crypt_at_offset(&ctx, &iv, stream_offset, &chunk[..n]);
            dec_file.write_all(&plaintext)?;
            stream_offset += n as u64;
        }
        drop(dec_file);

        let mut check = File::open(&decrypted_path)?;
        check.seek(SeekFrom::Start(BIN_GLOBAL_HEADER_SIZE as u64))?;
        let mut magic = [0u8; MAGIC_SIZE];
        fsutil::read_exact(&mut check, &mut magic)?;
        if &magic != BIN_MAGIC_UNLOCKED {
            fs::remove_file(&decrypted_path).ok();
            return Err(CoreError::DecryptionFailed);
        }

        Ok(Self {
            id,
            iv,
            encrypted_path,
            decrypted_path,
            open: true,
            dirty: false,
        })
    }

    /// Re-encrypts the decrypted working copy back onto `encrypted_path`,
    /// rotating the IV first if the bin was modified. Leaves the bin closed.
    pub fn close(mut self, aes_key: &[u8]) -> Result<(), CoreError> {
        debug!("closing bin at {}", self.encrypted_path.display());
        if !self.open {
            return Ok(());
        }

        let iv = if self.dirty {
            let fresh: [u8; AES_IV_SIZE] = urandom::bytes(AES_IV_SIZE)
                .ok_or(CoreError::UrandomUnavailable)?
                .try_into()
                .unwrap();
            fresh
        } else {
            self.iv
        };

        let mut enc_file = File::create(&self.encrypted_path)?;
        enc_file.write_all(BIN_MAGIC_VERSION)?;
        enc_file.write_all(&self.id)?;
        enc_file.write_all(&iv)?;

        let ctx = AesCtx::new(aes128_key_slice(aes_key));

        let mut dec_file = File::open(&self.decrypted_path)?;
        dec_file.seek(SeekFrom::Start(BIN_GLOBAL_HEADER_SIZE as u64))?;

        let mut stream_offset = 0u64;
        let mut chunk = [0u8; READFILE_CHUNK];
        loop {
            let n = dec_file.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            let ciphertext = aes_ctr::crypt_at_offset(&ctx, &iv, stream_offset, &chunk[..n]);
            enc_file.write_all(&ciphertext)?;
            stream_offset += n as u64;
        }

        self.open = false;
        Ok(())
    }

    fn require_open(&self) -> Result<(), CoreError> {
        if !self.open {
            return Err(CoreError::Corruption("bin is not open".to_string()));
        }
        Ok(())
    }

    /// Scans stored entries for `path_with_nul`, returning its location if
    /// present. Used both to answer `fetch_file`/`remove_file` and to
    /// enforce that paths are unique within a bin before `add_file`/
    /// `open_file` append a new entry.
    fn find_file(&self, path_with_nul: &[u8]) -> Result<Option<FileEntry>, CoreError> {
        self.require_open()?;

        let mut f = File::open(&self.decrypted_path)?;
        f.seek(SeekFrom::Start((BIN_GLOBAL_HEADER_SIZE + MAGIC_SIZE) as u64))?;

        loop {
            let mut marker = [0u8; MAGIC_SIZE];
            fsutil::read_exact(&mut f, &mut marker)?;
            if &marker == BIN_MAGIC_END {
                return Ok(None);
            }
            if &marker != BIN_MAGIC_FILE {
                return Err(CoreError::Corruption("unknown record type in bin".to_string()));
            }

            let mut len_buf = [0u8; 16];
            fsutil::read_exact(&mut f, &mut len_buf)?;
            let path_len = u64::from_le_bytes(len_buf[..8].try_into().unwrap()) as usize;
            let data_len = u64::from_le_bytes(len_buf[8..].try_into().unwrap()) as usize;

            let mut entry_path = vec![0u8; path_len];
            fsutil::read_exact(&mut f, &mut entry_path)?;
            let data_offset = f.stream_position()?;

            if entry_path == path_with_nul {
                return Ok(Some(FileEntry { data_offset, data_len }));
            }

            f.seek(SeekFrom::Current(data_len as i64))?;
        }
    }

    /// Appends a file at the end of the archive, just before the footer.
    /// Returns `false` without writing anything if `path` is already
    /// present (paths are unique within a bin; the caller must remove the
    /// existing entry first).
    pub fn add_file(&mut self, path: &[u8], data: &[u8]) -> Result<bool, CoreError> {
        self.require_open()?;

        let mut path_with_nul = path.to_vec();
        path_with_nul.push(0);

        if self.find_file(&path_with_nul)?.is_some() {
            return Ok(false);
        }

        let mut file_header = Vec::with_capacity(BIN_FILE_HEADER_SIZE);
        file_header.extend_from_slice(BIN_MAGIC_FILE);
        file_header.extend_from_slice(&(path_with_nul.len() as u64).to_le_bytes());
        file_header.extend_from_slice(&(data.len() as u64).to_le_bytes());

        let mut f = OpenOptions::new().read(true).write(true).open(&self.decrypted_path)?;
        f.seek(SeekFrom::End(-(MAGIC_SIZE as i64)))?;
        f.write_all(&file_header)?;
        f.write_all(&path_with_nul)?;
        f.write_all(data)?;
        f.write_all(BIN_MAGIC_END)?;

        self.dirty = true;
        Ok(true)
    }

    /// Begins a streamed write of a new file at `path`: writes an
    /// `ARCHVFLE` header with a placeholder `DATA_LEN` of zero just before
    /// the footer, to be backfilled by [`Bin::close_file`]. Returns `None`
    /// under the same existing-path condition as [`Bin::add_file`].
    pub fn open_file(&mut self, path: &[u8]) -> Result<Option<BinFileWriter>, CoreError> {
        self.require_open()?;

        let mut path_with_nul = path.to_vec();
        path_with_nul.push(0);

        if self.find_file(&path_with_nul)?.is_some() {
            return Ok(None);
        }

        let mut file_header = Vec::with_capacity(BIN_FILE_HEADER_SIZE);
        file_header.extend_from_slice(BIN_MAGIC_FILE);
        file_header.extend_from_slice(&(path_with_nul.len() as u64).to_le_bytes());
        file_header.extend_from_slice(&0u64.to_le_bytes());

        let mut f = OpenOptions::new().read(true).write(true).open(&self.decrypted_path)?;
        let header_offset = f.seek(SeekFrom::End(-(MAGIC_SIZE as i64)))?;
        f.write_all(&file_header)?;
        f.write_all(&path_with_nul)?;
        let cursor = f.stream_position()?;
        f.write_all(BIN_MAGIC_END)?;

        self.dirty = true;
        Ok(Some(BinFileWriter {
            data_len_offset: header_offset + MAGIC_SIZE as u64 + 8,
            cursor,
            written: 0,
        }))
    }

    /// Appends `chunk` to a file opened with [`Bin::open_file`], in any
    /// chunk size the caller chooses, then rewrites the footer after it.
    pub fn write_file(&mut self, writer: &mut BinFileWriter, chunk: &[u8]) -> Result<(), CoreError> {
        self.require_open()?;
        if chunk.is_empty() {
            return Ok(());
        }

        let mut f = OpenOptions::new().write(true).open(&self.decrypted_path)?;
        f.seek(SeekFrom::Start(writer.cursor))?;
        f.write_all(chunk)?;
        f.write_all(BIN_MAGIC_END)?;

        writer.cursor += chunk.len() as u64;
        writer.written += chunk.len() as u64;
        Ok(())
    }

    /// Finalizes a streamed write, backfilling the real `DATA_LEN` into the
    /// header [`Bin::open_file`] wrote.
    pub fn close_file(&mut self, writer: BinFileWriter) -> Result<(), CoreError> {
        self.require_open()?;

        let mut f = OpenOptions::new().write(true).open(&self.decrypted_path)?;
        f.seek(SeekFrom::Start(writer.data_len_offset))?;
        f.write_all(&writer.written.to_le_bytes())?;

        debug!("closed streamed write of {} bytes into bin", writer.written);
        Ok(())
    }

    /// Lists every file path stored in the archive (including each path's
    /// trailing NUL, as stored), in storage order.
    pub fn list_files(&self) -> Result<Vec<Vec<u8>>, CoreError> {
        self.require_open()?;

        let mut f = File::open(&self.decrypted_path)?;
        f.seek(SeekFrom::Start((BIN_GLOBAL_HEADER_SIZE + MAGIC_SIZE) as u64))?;

        let mut paths = Vec::new();
        loop {
            let mut marker = [0u8; MAGIC_SIZE];
            fsutil::read_exact(&mut f, &mut marker)?;
            if &marker == BIN_MAGIC_END {
                break;
            }
            if &marker != BIN_MAGIC_FILE {
                return Err(CoreError::Corruption("unknown record type in bin".to_string()));
            }

            let mut len_buf = [0u8; 16];
            fsutil::read_exact(&mut f, &mut len_buf)?;
            let path_len = u64::from_le_bytes(len_buf[..8].try_into().unwrap()) as usize;
            let data_len = u64::from_le_bytes(len_buf[8..].try_into().unwrap()) as usize;

            let mut path = vec![0u8; path_len];
            fsutil::read_exact(&mut f, &mut path)?;
            paths.push(path);

            f.seek(SeekFrom::Current(data_len as i64))?;
        }

        Ok(paths)
    }

    /// Returns the contents of `path` if present.
    pub fn fetch_file(&self, path: &[u8]) -> Result<Option<Vec<u8>>, CoreError> {
        let mut path_with_nul = path.to_vec();
        path_with_nul.push(0);

        let Some(entry) = self.find_file(&path_with_nul)? else {
            return Ok(None);
        };

        let mut f = File::open(&self.decrypted_path)?;
        f.seek(SeekFrom::Start(entry.data_offset))?;
        let mut data = vec![0u8; entry.data_len];
        fsutil::read_exact(&mut f, &mut data)?;
        Ok(Some(data))
    }

    /// Removes `path` from the archive if present, returning whether it was
    /// found. Other entries are shifted back to reclaim the freed space.
    pub fn remove_file(&mut self, path: &[u8]) -> Result<bool, CoreError> {
        self.require_open()?;

        let mut path_with_nul = path.to_vec();
        path_with_nul.push(0);

        let mut src = File::open(&self.decrypted_path)?;
        let tmp_path = fsutil::tempfile_in(
            self.decrypted_path
                .parent()
                .unwrap_or_else(|| Path::new(".")),
        );
        let mut dst = File::create(&tmp_path)?;

        let mut header = [0u8; BIN_GLOBAL_HEADER_SIZE];
        fsutil::read_exact(&mut src, &mut header)?;
        dst.write_all(&header)?;

        let mut unlocked = [0u8; MAGIC_SIZE];
        fsutil::read_exact(&mut src, &mut unlocked)?;
        dst.write_all(&unlocked)?;

        let mut found = false;
        loop {
            let mut marker = [0u8; MAGIC_SIZE];
            fsutil::read_exact(&mut src, &mut marker)?;
            if &marker == BIN_MAGIC_END {
                dst.write_all(&marker)?;
                break;
            }
            if &marker != BIN_MAGIC_FILE {
                return Err(CoreError::Corruption("unknown record type in bin".to_string()));
            }

            let mut len_buf = [0u8; 16];
            fsutil::read_exact(&mut src, &mut len_buf)?;
            let path_len = u64::from_le_bytes(len_buf[..8].try_into().unwrap()) as usize;
            let data_len = u64::from_le_bytes(len_buf[8..].try_into().unwrap()) as usize;

            let mut entry_path = vec![0u8; path_len];
            fsutil::read_exact(&mut src, &mut entry_path)?;
            let mut data = vec![0u8; data_len];
            fsutil::read_exact(&mut src, &mut data)?;

            if entry_path == path_with_nul {
                found = true;
                continue;
            }

            dst.write_all(&marker)?;
            dst.write_all(&len_buf)?;
            dst.write_all(&entry_path)?;
            dst.write_all(&data)?;
        }
        drop(src);
        drop(dst);

        fsutil::atomic_replace(&self.decrypted_path, &tmp_path)?;
        if found {
            self.dirty = true;
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_open_roundtrip_with_correct_key() {
        let dir = tempfile::tempdir().unwrap();
        let enc_path = dir.path().join("bin.arc64");
        let dec_path = dir.path().join("bin.working");

        let (bin, key) = Bin::create(&enc_path).unwrap();
        drop(bin);

        let opened = Bin::open(&enc_path, &dec_path, &key).unwrap();
        assert!(opened.is_open());
        assert_eq!(opened.list_files().unwrap().len(), 0);
    }

    #[test]
    fn open_with_wrong_key_fails_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let enc_path = dir.path().join("bin.arc64");
        let dec_path = dir.path().join("bin.working");

        let (_bin, _key) = Bin::create(&enc_path).unwrap();
        let wrong_key = [0xffu8; KEK_SIZE];

        let result = Bin::open(&enc_path, &dec_path, &wrong_key);
        assert!(matches!(result, Err(CoreError::DecryptionFailed)));
        assert!(!dec_path.exists());
    }

    #[test]
    fn add_list_fetch_remove_file() {
        let dir = tempfile::tempdir().unwrap();
        let enc_path = dir.path().join("bin.arc64");
        let dec_path = dir.path().join("bin.working");

        let (bin, key) = Bin::create(&enc_path).unwrap();
        drop(bin);

        let mut opened = Bin::open(&enc_path, &dec_path, &key).unwrap();
        assert!(opened.add_file(b"hello.txt", b"hello, world").unwrap());
        assert!(opened.add_file(b"nested/file.bin", b"binary-ish data").unwrap());

        let paths = opened.list_files().unwrap();
        assert_eq!(paths, vec![b"hello.txt\0".to_vec(), b"nested/file.bin\0".to_vec()]);

        assert_eq!(
            opened.fetch_file(b"hello.txt").unwrap(),
            Some(b"hello, world".to_vec())
        );
        assert_eq!(opened.fetch_file(b"missing").unwrap(), None);

        let removed = opened.remove_file(b"hello.txt").unwrap();
        assert!(removed);
        assert_eq!(opened.list_files().unwrap(), vec![b"nested/file.bin\0".to_vec()]);

        opened.close(&key).unwrap();

        let reopened = Bin::open(&enc_path, &dec_path, &key).unwrap();
        assert_eq!(reopened.list_files().unwrap(), vec![b"nested/file.bin\0".to_vec()]);
    }

    #[test]
    fn add_file_rejects_duplicate_path() {
        let dir = tempfile::tempdir().unwrap();
        let enc_path = dir.path().join("bin.arc64");
        let dec_path = dir.path().join("bin.working");

        let (bin, key) = Bin::create(&enc_path).unwrap();
        drop(bin);

        let mut opened = Bin::open(&enc_path, &dec_path, &key).unwrap();
        assert!(opened.add_file(b"a.txt", b"first").unwrap());
        assert!(!opened.add_file(b"a.txt", b"second").unwrap());
        assert_eq!(opened.fetch_file(b"a.txt").unwrap(), Some(b"first".to_vec()));
    }

    #[test]
    fn streamed_write_matches_one_shot_write_regardless_of_chunk_size() {
        let dir = tempfile::tempdir().unwrap();
        let enc_path = dir.path().join("bin.arc64");
        let dec_path = dir.path().join("bin.working");

        let (bin, key) = Bin::create(&enc_path).unwrap();
        drop(bin);

        let mut opened = Bin::open(&enc_path, &dec_path, &key).unwrap();

        let payload: Vec<u8> = (0..777u32).map(|i| (i % 251) as u8).collect();
        let mut writer = opened.open_file(b"streamed.bin").unwrap().unwrap();
        for chunk in payload.chunks(37) {
            opened.write_file(&mut writer, chunk).unwrap();
        }
        opened.close_file(writer).unwrap();

        assert_eq!(opened.fetch_file(b"streamed.bin").unwrap(), Some(payload));
    }

    #[test]
    fn open_file_rejects_duplicate_path() {
        let dir = tempfile::tempdir().unwrap();
        let enc_path = dir.path().join("bin.arc64");
        let dec_path = dir.path().join("bin.working");

        let (bin, key) = Bin::create(&enc_path).unwrap();
        drop(bin);

        let mut opened = Bin::open(&enc_path, &dec_path, &key).unwrap();
        assert!(opened.add_file(b"a.txt", b"first").unwrap());
        assert!(opened.open_file(b"a.txt").unwrap().is_none());
    }

    #[test]
    fn closing_a_dirty_bin_rotates_the_iv() {
        let dir = tempfile::tempdir().unwrap();
        let enc_path = dir.path().join("bin.arc64");
        let dec_path = dir.path().join("bin.working");

        let (bin, key) = Bin::create(&enc_path).unwrap();
        drop(bin);

        let original_header = fs::read(&enc_path).unwrap()[..BIN_GLOBAL_HEADER_SIZE].to_vec();

        let mut opened = Bin::open(&enc_path, &dec_path, &key).unwrap();
        opened.add_file(b"x", b"y").unwrap();
        opened.close(&key).unwrap();

        let new_header = fs::read(&enc_path).unwrap()[..BIN_GLOBAL_HEADER_SIZE].to_vec();
        assert_ne!(
            original_header[MAGIC_SIZE + BIN_ID_SIZE..],
            new_header[MAGIC_SIZE + BIN_ID_SIZE..]
        );
    }
}
