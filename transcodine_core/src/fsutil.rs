//! Small filesystem helpers the container formats lean on: full-transfer
//! I/O, copy-on-write working files, and sanitised directory creation.
//! Grounded in `original_source/include/utils/io.h`'s `freads`/`fwrites`
//! contracts and the `tempfile()`/`fcopy()` call sites in `src/db.c`.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::crypto::urandom;
use crate::error::CoreError;

/// Reads exactly `buf.len()` bytes, returning [`CoreError::UnexpectedEof`]
/// on a short read instead of silently returning a partial buffer.
pub fn read_exact(f: &mut File, buf: &mut [u8]) -> Result<(), CoreError> {
    let expected = buf.len();
    f.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            CoreError::UnexpectedEof { expected, got: 0 }
        } else {
            CoreError::Io(e)
        }
    })
}

/// Writes the full buffer, returning [`CoreError::ShortWrite`] if the
/// underlying writer could not accept it all.
pub fn write_all(f: &mut File, buf: &[u8]) -> Result<(), CoreError> {
    f.write_all(buf).map_err(CoreError::Io)
}

/// Produces a fresh temporary file path alongside `dir`, for the
/// copy-on-write working-file pattern used by database mutation and IV
/// rotation. Named with a random base62 suffix rather than a counter to
/// avoid colliding with a previous run's leftovers.
pub fn tempfile_in(dir: &Path) -> PathBuf {
    let suffix = urandom::ascii(16).expect("/dev/urandom must be available to create scratch files");
    let name = format!(".tc-tmp-{}", String::from_utf8(suffix).unwrap());
    dir.join(name)
}

/// Copies `src` to `dst`, overwriting `dst` if present.
pub fn copy_file(src: &Path, dst: &Path) -> Result<(), CoreError> {
    fs::copy(src, dst)?;
    Ok(())
}

/// Replaces `target` with `replacement`'s contents, then removes
/// `replacement`. This is the copy-on-write commit point: a crash before
/// the copy completes leaves `target` untouched.
pub fn atomic_replace(target: &Path, replacement: &Path) -> Result<(), CoreError> {
    copy_file(replacement, target)?;
    fs::remove_file(replacement)?;
    Ok(())
}

/// Validates `path` only contains `[A-Za-z0-9 ._-/]`, then creates it and
/// all missing parent directories.
pub fn sanitized_mkdir_p(path: &Path) -> Result<(), CoreError> {
    let s = path.to_str().ok_or_else(|| {
        CoreError::UnsafePath("path is not valid UTF-8".to_string())
    })?;

    let is_safe = s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-' | '/'));
    if !is_safe {
        return Err(CoreError::UnsafePath(s.to_string()));
    }

    fs::create_dir_all(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_mkdir_p_rejects_unsafe_characters() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("bad;rm -rf");
        assert!(matches!(
            sanitized_mkdir_p(&target),
            Err(CoreError::UnsafePath(_))
        ));
    }

    #[test]
    fn sanitized_mkdir_p_creates_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/c");
        sanitized_mkdir_p(&target).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn atomic_replace_swaps_contents_and_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        let replacement = dir.path().join("replacement");

        fs::write(&target, b"old").unwrap();
        fs::write(&replacement, b"new").unwrap();

        atomic_replace(&target, &replacement).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert!(!replacement.exists());
    }
}
