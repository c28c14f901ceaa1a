//! Codec error types.

use std::path::PathBuf;

/// Errors produced by the encryption codec.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key length {0}: expected 16, 24 or 32 bytes")]
    InvalidKeyLength(usize),

    #[error("unknown cipher: {0}")]
    UnknownCipher(String),

    #[error("decryption unsupported for cipher: {0}")]
    Unsupported(String),

    #[error("ciphertext truncated: {0} bytes is shorter than the IV")]
    Truncated(usize),

    #[error("key file already exists: {}", .0.display())]
    KeyFileExists(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CryptoError {
    /// Returns `true` for errors caused by caller-supplied parameters
    /// (cipher name or key length) rather than data or I/O.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CryptoError::InvalidKeyLength(_) | CryptoError::UnknownCipher(_)
        )
    }
}
