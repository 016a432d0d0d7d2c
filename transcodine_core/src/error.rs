use std::io;

use thiserror::Error;

/// A `CoreError` indicates a fatal condition raised by the crypto toolkit,
/// the cipher I/O stream, or one of the two container formats.
///
/// Recoverable outcomes (a missing key, a bin not being open yet) are
/// expressed as `bool`/`Option` return values instead, mirroring the
/// recoverable/fatal split the original storage core draws between its
/// return-value checks and its `throw()` calls.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A read returned fewer bytes than the container format requires at
    /// that position. Always indicates a truncated or corrupted file.
    #[error("unexpected end of file: expected {expected} bytes, got {got}")]
    UnexpectedEof { expected: usize, got: usize },

    /// A write did not transfer the full buffer.
    #[error("short write: expected {expected} bytes, wrote {got}")]
    ShortWrite { expected: usize, got: usize },

    /// A magic marker did not match what the format requires at that
    /// position, or an entry reported a size that does not fit the
    /// remaining file.
    #[error("corrupted container: {0}")]
    Corruption(String),

    /// Decryption did not reveal the `UNLOCKED` sentinel. Either the key is
    /// wrong or the file is corrupted.
    #[error("decryption failed: container did not unlock")]
    DecryptionFailed,

    /// A path given to [`crate::fsutil::sanitized_mkdir_p`] contains
    /// characters outside the documented whitelist.
    #[error("unsafe path: {0}")]
    UnsafePath(String),

    /// `/dev/urandom` could not be opened.
    #[error("urandom unavailable")]
    UrandomUnavailable,

    /// An `std::io::Error` occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A `toml::de::Error` occurred while loading `AgentConfig`.
    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// A `toml::ser::Error` occurred while saving `AgentConfig`.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}
