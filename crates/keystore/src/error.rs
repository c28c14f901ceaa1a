//! Keystore error types.

use std::path::PathBuf;

use vaultdrop_protocol::FileId;

/// Errors produced by keystore operations.
#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("keystore directory is not empty: {}", .0.display())]
    DirNotEmpty(PathBuf),

    #[error("invalid keystore directory: {}", .0.display())]
    InvalidDir(PathBuf),

    #[error("corrupt keystore index {}: {reason}", .path.display())]
    CorruptIndex { path: PathBuf, reason: String },

    #[error("keystore is closed")]
    Closed,

    #[error("key file missing for file {0}")]
    KeyFileMissing(FileId),

    #[error("key error: {0}")]
    Crypto(#[from] vaultdrop_crypto::CryptoError),

    #[error("secure deletion incomplete: {0} file(s) could not be shredded")]
    ShredIncomplete(usize),
}
