use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Lifecycle state of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }
}

/// Point-in-time view of a [`TransferProgress`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub id: String,
    pub label: String,
    pub status: TransferStatus,
    pub total_bytes: Option<u64>,
    pub transferred_bytes: u64,
    pub bytes_per_second: f64,
    /// Estimated time left; set by the tracker once it has a windowed speed.
    pub eta: Option<Duration>,
    pub error: Option<String>,
}

impl ProgressSnapshot {
    /// Returns progress as a percentage (0-100), if the total is known.
    pub fn percentage(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some((self.transferred_bytes as f64 / total as f64 * 100.0).min(100.0)),
            None => None,
        }
    }
}

/// Byte progress of one active transfer job (thread-safe).
///
/// The transferred counter only ever grows. Once the transfer reached a
/// terminal status further status changes are ignored.
pub struct TransferProgress {
    id: String,
    transferred: AtomicU64,
    inner: RwLock<ProgressInner>,
}

struct ProgressInner {
    label: String,
    status: TransferStatus,
    total_bytes: Option<u64>,
    started_at: Option<Instant>,
    completed_at: Option<Instant>,
    error: Option<String>,
}

impl TransferProgress {
    /// Creates a pending transfer.
    pub fn new(id: impl Into<String>, label: impl Into<String>, total_bytes: Option<u64>) -> Self {
        Self {
            id: id.into(),
            transferred: AtomicU64::new(0),
            inner: RwLock::new(ProgressInner {
                label: label.into(),
                status: TransferStatus::Pending,
                total_bytes,
                started_at: None,
                completed_at: None,
                error: None,
            }),
        }
    }

    /// Marks the transfer as in progress.
    pub fn start(&self) {
        let mut s = self.inner.write().unwrap();
        if s.status == TransferStatus::Pending {
            s.status = TransferStatus::InProgress;
            s.started_at = Some(Instant::now());
        }
    }

    /// Adds `bytes` to the transferred counter.
    pub fn add(&self, bytes: u64) {
        self.transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Sets the expected total once it becomes known.
    pub fn set_total(&self, total_bytes: Option<u64>) {
        self.inner.write().unwrap().total_bytes = total_bytes;
    }

    pub fn set_label(&self, label: impl Into<String>) {
        self.inner.write().unwrap().label = label.into();
    }

    pub fn complete(&self) {
        self.finish(TransferStatus::Completed, None);
    }

    pub fn fail(&self, err: &str) {
        self.finish(TransferStatus::Failed, Some(err.to_string()));
    }

    pub fn cancel(&self) {
        self.finish(TransferStatus::Cancelled, None);
    }

    fn finish(&self, status: TransferStatus, error: Option<String>) {
        let mut s = self.inner.write().unwrap();
        if s.status.is_terminal() {
            return;
        }
        s.status = status;
        s.error = error;
        s.completed_at = Some(Instant::now());
    }

    /// Returns the current state. `bytes_per_second` is the average since start.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let s = self.inner.read().unwrap();
        let transferred = self.transferred();
        let elapsed = match (s.started_at, s.completed_at) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        };
        let bytes_per_second = if elapsed.is_zero() {
            0.0
        } else {
            transferred as f64 / elapsed.as_secs_f64()
        };
        ProgressSnapshot {
            id: self.id.clone(),
            label: s.label.clone(),
            status: s.status,
            total_bytes: s.total_bytes,
            transferred_bytes: transferred,
            bytes_per_second,
            eta: None,
            error: s.error.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> TransferStatus {
        self.inner.read().unwrap().status
    }

    /// Returns `true` while pending or in progress.
    pub fn is_active(&self) -> bool {
        !self.status().is_terminal()
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> Option<u64> {
        self.inner.read().unwrap().total_bytes
    }
}
