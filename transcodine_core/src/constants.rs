//! Shared framing constants for the crypto toolkit and both container
//! formats. Values are taken from the `constants.h` actually `#include`d by
//! `bin.c`, `db.c`, and `iostream.c` (not the differently-valued
//! `utils/constants.h`), and from the byte-layout diagrams documented at the
//! top of `bin.h`/`db.h`.

/// AES-128 cipher key length in bytes.
pub const AES_KEY_SIZE: usize = 16;
/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;
/// Number of AES-128 encryption rounds.
pub const AES_ROUNDS: usize = 10;
/// Number of 32-bit words in the AES-128 key.
pub const AES_NK: usize = 4;
/// Number of 32-bit words in an AES block.
pub const AES_NB: usize = 4;
/// AES IV / counter length in bytes.
pub const AES_IV_SIZE: usize = 16;

/// Size of the carried secret (KEK, database key, bin key) in bytes. Only
/// the first [`AES_KEY_SIZE`] bytes of a value this size are ever fed to
/// the AES-128 key schedule; see `crypto::aes128_key_slice`.
pub const KEK_SIZE: usize = 32;

/// SHA-256 digest size in bytes.
pub const SHA256_HASH_SIZE: usize = 32;
/// SHA-256 block size in bytes.
pub const SHA256_BLOCK_SIZE: usize = 64;
/// PBKDF2 iteration count used to derive the database key from the KEK.
pub const PBKDF2_ITERATIONS: u32 = 16384;

/// Chunk size used when streaming a container body through the cipher I/O
/// layer (IV rotation, bin open/close).
pub const READFILE_CHUNK: usize = 512;

/// Length of a generated bin id (ASCII base62).
pub const BIN_ID_SIZE: usize = 16;

/// All framing magic markers are this many bytes.
pub const MAGIC_SIZE: usize = 8;

/// EDB64 version marker.
pub const DB_MAGIC_VERSION: &[u8; MAGIC_SIZE] = b"EDBASE64";
/// EDB64 decrypted-body sentinel.
pub const DB_MAGIC_UNLOCKED: &[u8; MAGIC_SIZE] = b"UNLOCKED";
/// EDB64 entry header marker.
pub const DB_MAGIC_ENTRY: &[u8; MAGIC_SIZE] = b"DBASEFLE";
/// EDB64 footer marker.
pub const DB_MAGIC_END: &[u8; MAGIC_SIZE] = b"DBASEEND";

/// EDB64 global header size: 8-byte version + 16-byte IV.
pub const DB_GLOBAL_HEADER_SIZE: usize = MAGIC_SIZE + AES_IV_SIZE;
/// EDB64 entry header size: 8-byte magic + 8-byte key_len + 8-byte value_len.
pub const DB_ENTRY_HEADER_SIZE: usize = MAGIC_SIZE + 8 + 8;

/// ARC64 version marker.
pub const BIN_MAGIC_VERSION: &[u8; MAGIC_SIZE] = b"ARCHV-64";
/// ARC64 decrypted-body sentinel.
pub const BIN_MAGIC_UNLOCKED: &[u8; MAGIC_SIZE] = b"UNLOCKED";
/// ARC64 file header marker.
pub const BIN_MAGIC_FILE: &[u8; MAGIC_SIZE] = b"ARCHVFLE";
/// ARC64 footer marker.
pub const BIN_MAGIC_END: &[u8; MAGIC_SIZE] = b"ARCHVEND";

/// ARC64 global header size: 8-byte version + 16-byte bin id + 16-byte IV.
pub const BIN_GLOBAL_HEADER_SIZE: usize = MAGIC_SIZE + BIN_ID_SIZE + AES_IV_SIZE;
/// ARC64 file header size: 8-byte magic + 8-byte path_len + 8-byte data_len.
pub const BIN_FILE_HEADER_SIZE: usize = MAGIC_SIZE + 8 + 8;

/// Fixed salt used to derive the database key from the KEK via PBKDF2.
pub const DB_KEY_DERIVATION_SALT: &[u8] = b"aes-key-edb";
