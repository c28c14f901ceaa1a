//! Engine error types.

use std::path::PathBuf;

use vaultdrop_crypto::CryptoError;
use vaultdrop_keystore::KeystoreError;
use vaultdrop_transfer::TransferError;

use crate::remote::RemoteError;

/// Coarse failure class of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad cipher, key length or option combination. Nothing was transferred.
    Configuration,
    /// Encrypted payload without a usable key. Destination untouched.
    KeyResolution,
    /// Network failure or error response from the remote.
    Transport,
    /// Local and remote digests differ.
    ChecksumMismatch,
    Keystore,
    Cancelled,
    DecryptionUnsupported,
    Io,
}

/// Errors produced by the transfer engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("no usable key: {0}")]
    KeyResolution(String),

    #[error("transport error: {0}")]
    Transport(#[from] RemoteError),

    #[error("checksum mismatch: local {local}, remote {remote}")]
    ChecksumMismatch { local: String, remote: String },

    #[error("keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("cancelled")]
    Cancelled,

    #[error("decryption not supported for cipher {0:?}")]
    DecryptionUnsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Configuration(_) | EngineError::DestinationExists(_) => {
                ErrorKind::Configuration
            }
            EngineError::KeyResolution(_) => ErrorKind::KeyResolution,
            EngineError::Transport(_) => ErrorKind::Transport,
            EngineError::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            EngineError::Keystore(_) => ErrorKind::Keystore,
            EngineError::Cancelled => ErrorKind::Cancelled,
            EngineError::DecryptionUnsupported(_) => ErrorKind::DecryptionUnsupported,
            EngineError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

impl From<CryptoError> for EngineError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidKeyLength(_) | CryptoError::UnknownCipher(_) => {
                EngineError::Configuration(e.to_string())
            }
            CryptoError::Unsupported(id) => EngineError::DecryptionUnsupported(id),
            CryptoError::Io(io) => EngineError::Io(io),
            other => EngineError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

impl From<TransferError> for EngineError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Io(io) => EngineError::Io(io),
            other => EngineError::Configuration(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(e: tokio::task::JoinError) -> Self {
        EngineError::Io(std::io::Error::other(format!("task join error: {e}")))
    }
}
