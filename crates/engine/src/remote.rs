//! Remote store trait.
//!
//! `RemoteStore` is implemented by the application on top of its
//! authenticated HTTP client. Keeping it a trait keeps the pipelines
//! independent of the transport and testable with an in-memory store.

use std::future::Future;
use std::pin::Pin;

use tokio::io::AsyncRead;
use vaultdrop_protocol::{FileHeader, FileLocator, UploadReceipt, UploadRequest};
use vaultdrop_transfer::ChecksumHandle;

/// Owned, sendable byte stream.
pub type BoxReader = Pin<Box<dyn AsyncRead + Send>>;

/// Future returned by [`RemoteStore`] operations.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Failure reported by the remote store client.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The request never got a response.
    #[error("network error: {0}")]
    Network(String),

    /// The remote answered with an error status.
    #[error("remote returned {status}: {message}")]
    Declared { status: u16, message: String },
}

impl RemoteError {
    /// Status code of a declared error.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Declared { status, .. } => Some(*status),
            RemoteError::Network(_) => None,
        }
    }
}

/// Payload handed to [`RemoteStore::send_file`].
pub enum UploadBody {
    /// Local bytes, possibly encrypted.
    ///
    /// `checksum` holds the plaintext digest once `reader` has reached EOF.
    /// Clients send it after the body (for instance as an HTTP trailer) so
    /// the remote can serve it with the file.
    Stream {
        reader: BoxReader,
        size: Option<u64>,
        checksum: ChecksumHandle,
    },
    /// A URL the remote fetches itself.
    Url(String),
}

impl std::fmt::Debug for UploadBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadBody::Stream { size, .. } => {
                f.debug_struct("Stream").field("size", size).finish_non_exhaustive()
            }
            UploadBody::Url(url) => f.debug_tuple("Url").field(url).finish(),
        }
    }
}

/// Metadata plus body of a requested file.
pub struct RemoteFile {
    pub header: FileHeader,
    pub body: BoxReader,
}

/// Abstract connection to the remote object store.
pub trait RemoteStore: Send + Sync {
    /// Uploads a file and returns the remote's receipt.
    fn send_file(&self, request: UploadRequest, body: UploadBody)
    -> RemoteFuture<'_, UploadReceipt>;

    /// Requests a file's metadata and body stream.
    fn request_file(&self, locator: &FileLocator) -> RemoteFuture<'_, RemoteFile>;

    /// Public link for a published file name, when the store has one.
    fn public_url(&self, _public_name: &str) -> Option<String> {
        None
    }
}
