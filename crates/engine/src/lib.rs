//! Client-side transfer engine.
//!
//! Moves files to and from a remote object store through the
//! [`RemoteStore`] seam, optionally encrypting payloads in transit,
//! verifying SHA-256 checksums and tracking encryption keys in a local
//! [`Keystore`](vaultdrop_keystore::Keystore).
//!
//! # Upload
//!
//! [`UploadPipeline::upload`] validates the options, then runs one worker
//! per source on a bounded pool. Each worker resolves its key, streams the
//! source through the encryptor to the remote, verifies the receipt
//! checksum and registers the key.
//!
//! # Download
//!
//! [`DownloadPipeline::download`] resolves the decryption key before
//! touching the destination, streams into a hidden part file and renames it
//! into place once the checksum policy is satisfied.
//!
//! All collaborators (remote, keystore, prompter, progress tracker,
//! cancellation) are passed in through an [`EngineContext`].

pub mod commands;
pub mod config;
pub mod download;
pub mod error;
pub mod keys;
pub mod prompt;
pub mod remote;
pub mod types;
pub mod upload;

#[cfg(test)]
mod testing;

pub use commands::{
    add_key_to_keystore, cleanup_keystore, create_keystore, delete_keystore, keystore_info,
};
pub use config::{ClientConfig, EngineContext, KeystoreSettings};
pub use download::DownloadPipeline;
pub use error::{EngineError, ErrorKind};
pub use keys::{DownloadKey, KeySource};
pub use prompt::{Prompter, TerminalPrompter};
pub use remote::{BoxReader, RemoteError, RemoteFile, RemoteFuture, RemoteStore, UploadBody};
pub use types::{
    Destination, DownloadOptions, DownloadReport, SourceLocator, UploadEvent, UploadOptions,
    UploadOutcome, UploadReport, Verification,
};
pub use upload::UploadPipeline;
