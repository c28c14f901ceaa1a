//! Checksum verification and progress tracking for file transfers.
//!
//! Both pipelines share the same checksum rules: SHA-256 over the
//! plaintext, compared as lowercase hex. Progress is counted by I/O
//! wrappers and observed by a [`ProgressTracker`] on a fixed cadence.

mod checksum;
mod counting;
mod progress;
mod render;
mod types;
mod validation;

pub use checksum::{
    Checksum, ChecksumHandle, HashingReader, HashingWriter, checksum_bytes, checksum_file, verify,
};
pub use counting::{CountingReader, CountingWriter};
pub use progress::{ProgressCallback, ProgressTracker, SpeedCalculator};
pub use render::BarRenderer;
pub use types::{ProgressSnapshot, TransferProgress, TransferStatus};
pub use validation::validate_file_name;

/// Buffer size used when copying transfer streams: 64 KiB.
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid checksum: {0}")]
    InvalidChecksum(String),

    #[error("invalid file name: {0}")]
    InvalidPath(String),
}
