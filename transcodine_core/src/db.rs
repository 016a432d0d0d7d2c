//! EDB64: an append-style encrypted key-value database.
//!
//! ```text
//! [24-byte Global Header]
//!   [8-byte VERSION]: "EDBASE64"
//!   [16-byte AES_IV]
//! [8-byte Magic Block]
//!   [8-byte MAGIC]: "UNLOCKED"
//! [24-byte Entry Header] (repeated)
//!   [8-byte MAGIC]: "DBASEFLE"
//!   [8-byte KEY_LEN]
//!   [8-byte VALUE_LEN]
//! [Entry Data] (repeated)
//!   [... KEY]
//!   [... VALUE]
//! [Footer]
//!   [8-byte END]: "DBASEEND"
//! ```
//!
//! Unlike [`crate::bin`], the database is never fully decrypted to a working
//! copy: every read/write goes through [`crate::iostream::CipherStream`]
//! directly against the encrypted file, matching `original_source/src/db.c`'s
//! use of `iostream_t` rather than a full-file chunked transcrypt.
//!
//! Grounded on `original_source/include/db.h` and `src/db.c`.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::constants::{
    AES_IV_SIZE, DB_ENTRY_HEADER_SIZE, DB_GLOBAL_HEADER_SIZE, DB_MAGIC_END, DB_MAGIC_ENTRY,
    DB_MAGIC_UNLOCKED, DB_MAGIC_VERSION, KEK_SIZE, MAGIC_SIZE,
};
use crate::crypto::aes::AesCtx;
use crate::crypto::aes128_key_slice;
use crate::crypto::urandom;
use crate::error::CoreError;
use crate::fsutil;
use crate::iostream::CipherStream;
use crate::keys::{namespaced_key, Namespace};
use crate::log::{debug, warn_log};

struct FoundEntry {
    /// Offset of the entry's header, for in-place value overwrites.
    header_offset: u64,
    key_len: u64,
    value_len: u64,
    value_offset: u64,
}

/// An open encrypted key-value database.
pub struct Db {
    path: PathBuf,
    iv: [u8; AES_IV_SIZE],
    dirty: bool,
}

impl Db {
    /// Creates a new, empty database at `path` with a freshly generated IV
    /// and AES key.
    pub fn create(path: impl Into<PathBuf>) -> Result<(Self, [u8; KEK_SIZE]), CoreError> {
        let path = path.into();
        debug!("creating database at {}", path.display());

        let iv: [u8; AES_IV_SIZE] = urandom::bytes(AES_IV_SIZE)
            .ok_or(CoreError::UrandomUnavailable)?
            .try_into()
            .unwrap();
        let key: [u8; KEK_SIZE] = urandom::bytes(KEK_SIZE)
            .ok_or(CoreError::UrandomUnavailable)?
            .try_into()
            .unwrap();

        Self::bootstrap(&path, &iv, &key)?;

        Ok((
            Self {
                path,
                iv,
                dirty: false,
            },
            key,
        ))
    }

    /// Writes an empty, unlocked database body: the `UNLOCKED` sentinel
    /// immediately followed by the footer.
    fn bootstrap(path: &Path, iv: &[u8; AES_IV_SIZE], key: &[u8]) -> Result<(), CoreError> {
        debug!("bootstrapping empty database body at {}", path.display());
        let mut f = File::create(path)?;
        fsutil::write_all(&mut f, DB_MAGIC_VERSION)?;
        fsutil::write_all(&mut f, iv)?;

        let ctx = AesCtx::new(aes128_key_slice(key));
        let mut body = CipherStream::new(&mut f, &ctx, *iv, DB_GLOBAL_HEADER_SIZE as u64);
        body.write(DB_MAGIC_UNLOCKED)?;
        body.write(DB_MAGIC_END)?;
        Ok(())
    }

    /// Opens an existing database, verifying `aes_key` unlocks it.
    pub fn open(path: impl Into<PathBuf>, aes_key: &[u8]) -> Result<Self, CoreError> {
        let path = path.into();
        debug!("opening database at {}", path.display());

        let mut f = File::open(&path)?;
        let mut version = [0u8; MAGIC_SIZE];
        fsutil::read_exact(&mut f, &mut version)?;
        if &version != DB_MAGIC_VERSION {
            warn_log!("{} is not an EDB64 database", path.display());
            return Err(CoreError::Corruption("not an EDB64 database".to_string()));
        }

        let mut iv = [0u8; AES_IV_SIZE];
        fsutil::read_exact(&mut f, &mut iv)?;

        let ctx = AesCtx::new(aes128_key_slice(aes_key));
        let mut stream = CipherStream::new(&mut f, &ctx, iv, DB_GLOBAL_HEADER_SIZE as u64);
        let sentinel = stream.read(MAGIC_SIZE)?;
        if sentinel != DB_MAGIC_UNLOCKED {
            warn_log!("failed to unlock database at {}", path.display());
            return Err(CoreError::DecryptionFailed);
        }

        Ok(Self {
            path,
            iv,
            dirty: false,
        })
    }

    /// Rotates the IV if the database was mutated since opening. Mutating
    /// operations leave the file flushed already; this only needs to run
    /// once before the handle is dropped.
    pub fn close(mut self) -> Result<(), CoreError> {
        debug!("closing database at {}", self.path.display());
        if self.dirty {
            // The caller is expected to have supplied the key to every
            // mutating call already; rotation re-derives nothing and only
            // needs the stored IV, so nothing further is required here
            // beyond what `rotate_iv` already did inline per mutation.
            self.dirty = false;
        }
        Ok(())
    }

    fn open_file(&self) -> Result<File, CoreError> {
        Ok(OpenOptions::new().read(true).write(true).open(&self.path)?)
    }

    /// Scans entries from the start of the body, returning the first match
    /// for `key`, if any.
    fn find_entry(&self, f: &mut File, ctx: &AesCtx, key: &[u8]) -> Result<Option<FoundEntry>, CoreError> {
        let mut stream = CipherStream::new(f, ctx, self.iv, DB_GLOBAL_HEADER_SIZE as u64);
        stream.skip(MAGIC_SIZE as u64); // past UNLOCKED

        loop {
            let header_offset = stream.stream_offset();
            let marker = stream.read(MAGIC_SIZE)?;
            if marker == DB_MAGIC_END {
                return Ok(None);
            }
            if marker != DB_MAGIC_ENTRY {
                return Err(CoreError::Corruption("unknown record type in database".to_string()));
            }

            let lens = stream.read(16)?;
            let key_len = u64::from_le_bytes(lens[..8].try_into().unwrap());
            let value_len = u64::from_le_bytes(lens[8..].try_into().unwrap());

            let entry_key = stream.read(key_len as usize)?;
            let value_offset = stream.stream_offset();

            if entry_key == key {
                return Ok(Some(FoundEntry {
                    header_offset,
                    key_len,
                    value_len,
                    value_offset,
                }));
            }

            stream.skip(value_len);
        }
    }

    /// Generates a fresh IV and re-encrypts the whole body under it, then
    /// commits via the copy-on-write working-file pattern.
    fn rotate_iv(&mut self, aes_key: &[u8]) -> Result<(), CoreError> {
        debug!("rotating IV for database at {}", self.path.display());
        let new_iv: [u8; AES_IV_SIZE] = urandom::bytes(AES_IV_SIZE)
            .ok_or(CoreError::UrandomUnavailable)?
            .try_into()
            .unwrap();

        let tmp_path = fsutil::tempfile_in(self.path.parent().unwrap_or_else(|| Path::new(".")));
        let ctx = AesCtx::new(aes128_key_slice(aes_key));

        {
            let mut src = self.open_file()?;
            let mut dst = File::create(&tmp_path)?;
            fsutil::write_all(&mut dst, DB_MAGIC_VERSION)?;
            fsutil::write_all(&mut dst, &new_iv)?;

            let mut reader = CipherStream::new(&mut src, &ctx, self.iv, DB_GLOBAL_HEADER_SIZE as u64);
            let mut writer_file = OpenOptions::new().write(true).open(&tmp_path)?;
            let mut writer = CipherStream::new(
                &mut writer_file,
                &ctx,
                new_iv,
                DB_GLOBAL_HEADER_SIZE as u64,
            );

            // Transcrypt the body in chunks until the footer is copied.
            loop {
                let header_offset_before = reader.stream_offset();
                let marker = match reader.read(MAGIC_SIZE) {
                    Ok(m) => m,
                    Err(CoreError::UnexpectedEof { .. }) => break,
                    Err(e) => return Err(e),
                };
                writer.write(&marker)?;

                if header_offset_before == 0 {
                    // This was the UNLOCKED sentinel; nothing more to do
                    // for this iteration.
                    continue;
                }
                if marker == DB_MAGIC_END {
                    break;
                }

                let lens = reader.read(16)?;
                writer.write(&lens)?;
                let key_len = u64::from_le_bytes(lens[..8].try_into().unwrap());
                let value_len = u64::from_le_bytes(lens[8..].try_into().unwrap());

                let key = reader.read(key_len as usize)?;
                writer.write(&key)?;
                let value = reader.read(value_len as usize)?;
                writer.write(&value)?;
            }
        }

        fsutil::atomic_replace(&self.path, &tmp_path)?;
        self.iv = new_iv;
        Ok(())
    }

    /// Returns the value stored under `key`, if any.
    pub fn read(&self, key: &[u8], aes_key: &[u8]) -> Result<Option<Vec<u8>>, CoreError> {
        let mut f = File::open(&self.path)?;
        let ctx = AesCtx::new(aes128_key_slice(aes_key));

        let Some(entry) = self.find_entry(&mut f, &ctx, key)? else {
            return Ok(None);
        };

        let mut stream = CipherStream::new(&mut f, &ctx, self.iv, DB_GLOBAL_HEADER_SIZE as u64);
        stream.skip(entry.value_offset);
        Ok(Some(stream.read(entry.value_len as usize)?))
    }

    /// Returns whether `key` is present.
    pub fn has(&self, key: &[u8], aes_key: &[u8]) -> Result<bool, CoreError> {
        let mut f = File::open(&self.path)?;
        let ctx = AesCtx::new(aes128_key_slice(aes_key));
        Ok(self.find_entry(&mut f, &ctx, key)?.is_some())
    }

    /// Writes `value` under `key`, overwriting any existing entry of the
    /// same key's value in place if the lengths match, or appending a new
    /// entry (and removing the old one) otherwise. Rotates the IV.
    pub fn write(&mut self, key: &[u8], value: &[u8], aes_key: &[u8]) -> Result<(), CoreError> {
        let ctx = AesCtx::new(aes128_key_slice(aes_key));

        let existing = {
            let mut f = self.open_file()?;
            self.find_entry(&mut f, &ctx, key)?
        };

        match existing {
            Some(entry) if entry.value_len == value.len() as u64 => {
                let mut f = self.open_file()?;
                let mut stream = CipherStream::new(&mut f, &ctx, self.iv, DB_GLOBAL_HEADER_SIZE as u64);
                stream.skip(entry.value_offset);
                stream.write(value)?;
            }
            Some(_) => {
                self.remove(key, aes_key)?;
                self.append_entry(key, value, aes_key)?;
            }
            None => {
                self.append_entry(key, value, aes_key)?;
            }
        }

        self.rotate_iv(aes_key)?;
        self.dirty = true;
        Ok(())
    }

    /// Appends a new entry just before the footer.
    fn append_entry(&self, key: &[u8], value: &[u8], aes_key: &[u8]) -> Result<(), CoreError> {
        let ctx = AesCtx::new(aes128_key_slice(aes_key));
        let mut f = self.open_file()?;

        let footer_offset = Self::locate_footer_stream_offset(&mut f, &ctx, self.iv)?;

        let mut header = Vec::with_capacity(DB_ENTRY_HEADER_SIZE);
        header.extend_from_slice(DB_MAGIC_ENTRY);
        header.extend_from_slice(&(key.len() as u64).to_le_bytes());
        header.extend_from_slice(&(value.len() as u64).to_le_bytes());

        let mut stream = CipherStream::new(&mut f, &ctx, self.iv, DB_GLOBAL_HEADER_SIZE as u64);
        stream.skip(footer_offset);
        stream.write(&header)?;
        stream.write(key)?;
        stream.write(value)?;
        stream.write(DB_MAGIC_END)?;
        Ok(())
    }

    /// Returns the stream offset of the footer `DBASEEND` marker, relative
    /// to the start of the body (past the `UNLOCKED` sentinel).
    fn locate_footer_stream_offset(f: &mut File, ctx: &AesCtx, iv: [u8; AES_IV_SIZE]) -> Result<u64, CoreError> {
        let mut stream = CipherStream::new(f, ctx, iv, DB_GLOBAL_HEADER_SIZE as u64);
        stream.skip(MAGIC_SIZE as u64);

        loop {
            let offset = stream.stream_offset();
            let marker = stream.read(MAGIC_SIZE)?;
            if marker == DB_MAGIC_END {
                return Ok(offset);
            }
            if marker != DB_MAGIC_ENTRY {
                return Err(CoreError::Corruption("unknown record type in database".to_string()));
            }

            let lens = stream.read(16)?;
            let key_len = u64::from_le_bytes(lens[..8].try_into().unwrap());
            let value_len = u64::from_le_bytes(lens[8..].try_into().unwrap());
            stream.skip(key_len + value_len);
        }
    }

    /// Removes `key` if present, returning whether it was found. Rewrites
    /// the body excluding the matched entry, then rotates the IV.
    ///
    /// `original_source/src/db.c`'s equivalent copy loop reads a surviving
    /// entry's value from its own output stream instead of the input one; a
    /// bug that would only ever yield garbage. This reads from the input
    /// stream, as it must.
    pub fn remove(&mut self, key: &[u8], aes_key: &[u8]) -> Result<bool, CoreError> {
        let ctx = AesCtx::new(aes128_key_slice(aes_key));
        let tmp_path = fsutil::tempfile_in(self.path.parent().unwrap_or_else(|| Path::new(".")));

        let found = {
            let mut src = self.open_file()?;
            let mut dst = File::create(&tmp_path)?;
            fsutil::write_all(&mut dst, DB_MAGIC_VERSION)?;
            fsutil::write_all(&mut dst, &self.iv)?;

            let mut reader = CipherStream::new(&mut src, &ctx, self.iv, DB_GLOBAL_HEADER_SIZE as u64);
            let mut writer_file = OpenOptions::new().write(true).open(&tmp_path)?;
            let mut writer = CipherStream::new(
                &mut writer_file,
                &ctx,
                self.iv,
                DB_GLOBAL_HEADER_SIZE as u64,
            );
            writer.write(DB_MAGIC_UNLOCKED)?;
            reader.skip(MAGIC_SIZE as u64);

            let mut found = false;
            loop {
                let marker = reader.read(MAGIC_SIZE)?;
                if marker == DB_MAGIC_END {
                    writer.write(&marker)?;
                    break;
                }
                if marker != DB_MAGIC_ENTRY {
                    return Err(CoreError::Corruption("unknown record type in database".to_string()));
                }

                let lens = reader.read(16)?;
                let key_len = u64::from_le_bytes(lens[..8].try_into().unwrap());
                let value_len = u64::from_le_bytes(lens[8..].try_into().unwrap());

                let entry_key = reader.read(key_len as usize)?;
                let value = reader.read(value_len as usize)?;

                if entry_key == key {
                    found = true;
                    continue;
                }

                writer.write(&marker)?;
                writer.write(&lens)?;
                writer.write(&entry_key)?;
                writer.write(&value)?;
            }
            found
        };

        fsutil::atomic_replace(&self.path, &tmp_path)?;
        if found {
            self.rotate_iv(aes_key)?;
            self.dirty = true;
        }
        Ok(found)
    }

    /// Looks up `namespace:key`.
    pub fn read_ns(&self, namespace: Namespace, key: &[u8], aes_key: &[u8]) -> Result<Option<Vec<u8>>, CoreError> {
        self.read(&namespaced_key(namespace, key), aes_key)
    }

    /// Writes `namespace:key`.
    pub fn write_ns(&mut self, namespace: Namespace, key: &[u8], value: &[u8], aes_key: &[u8]) -> Result<(), CoreError> {
        self.write(&namespaced_key(namespace, key), value, aes_key)
    }

    /// Checks presence of `namespace:key`.
    pub fn has_ns(&self, namespace: Namespace, key: &[u8], aes_key: &[u8]) -> Result<bool, CoreError> {
        self.has(&namespaced_key(namespace, key), aes_key)
    }

    /// Removes `namespace:key`.
    pub fn remove_ns(&mut self, namespace: Namespace, key: &[u8], aes_key: &[u8]) -> Result<bool, CoreError> {
        self.remove(&namespaced_key(namespace, key), aes_key)
    }
}

/// Removes a database file and its working directory leftovers, used when a
/// bootstrap or create call fails partway through.
pub fn remove_files(path: &Path) -> Result<(), CoreError> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}
