use serde::{Deserialize, Serialize};

use crate::types::{FileAttributes, FileId};

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// Metadata sent alongside an upload body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub name: String,
    /// Payload size in bytes, when known up front.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub attributes: FileAttributes,
    #[serde(default)]
    pub public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_name: Option<String>,
    /// Cipher identifier when the body is encrypted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,
    /// Plaintext SHA-256 hex digest, known only once the body was fully read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Response of a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub file_id: FileId,
    pub file_name: String,
    /// SHA-256 hex digest of the bytes the remote received.
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// Metadata returned before a file body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHeader {
    pub file_id: FileId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Size of the body as sent (ciphertext size for encrypted files).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// SHA-256 hex digest of the plaintext.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Cipher identifier; `None` means plaintext.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,
}

impl FileHeader {
    /// Returns `true` if the remote marked the body as encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.encryption
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty())
    }
}
