use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::types::{ProgressSnapshot, TransferProgress};

/// Default progress notification interval.
const DEFAULT_INTERVAL: Duration = Duration::from_millis(250);

/// Callback invoked with transfer progress.
pub type ProgressCallback = Box<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Tracks the active transfers of one pipeline run and notifies callbacks
/// periodically.
///
/// Workers only bump atomic counters; rendering happens on the tracker's
/// own task so UI state is never touched from inside an I/O call.
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<RwLock<TrackerInner>>,
    ticker: Arc<Mutex<Ticker>>,
}

/// Background notification task shared by every clone of a tracker.
#[derive(Default)]
struct Ticker {
    /// Outstanding `start` calls not yet matched by `stop`.
    runs: usize,
    stop: Option<tokio::sync::oneshot::Sender<()>>,
}

struct TrackerInner {
    callbacks: Vec<ProgressCallback>,
    transfers: Vec<Arc<TransferProgress>>,
    speeds: HashMap<String, SpeedCalculator>,
    interval: Duration,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ProgressTracker {
    /// Creates a new tracker with the given notification interval.
    ///
    /// If `interval` is `None`, defaults to 250 ms.
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TrackerInner {
                callbacks: Vec::new(),
                transfers: Vec::new(),
                speeds: HashMap::new(),
                interval: interval.unwrap_or(DEFAULT_INTERVAL),
            })),
            ticker: Arc::new(Mutex::new(Ticker::default())),
        }
    }

    /// Registers a progress callback.
    pub fn on_progress(&self, callback: ProgressCallback) {
        let mut inner = self.inner.write().unwrap();
        inner.callbacks.push(callback);
    }

    /// Begins tracking a transfer. Transfers are reported in insertion order.
    pub fn track(&self, progress: Arc<TransferProgress>) {
        let mut inner = self.inner.write().unwrap();
        inner
            .speeds
            .insert(progress.id().to_string(), SpeedCalculator::new(None, None));
        inner.transfers.push(progress);
    }

    /// Stops tracking a transfer.
    pub fn untrack(&self, id: &str) {
        let mut inner = self.inner.write().unwrap();
        inner.transfers.retain(|t| t.id() != id);
        inner.speeds.remove(id);
    }

    /// Returns a tracked transfer by ID.
    pub fn get(&self, id: &str) -> Option<Arc<TransferProgress>> {
        let inner = self.inner.read().unwrap();
        inner.transfers.iter().find(|t| t.id() == id).cloned()
    }

    /// Number of tracked transfers.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends a one-time notification for a transfer, whatever its status.
    pub fn notify(&self, id: &str) {
        let inner = self.inner.read().unwrap();
        if let Some(progress) = inner.transfers.iter().find(|t| t.id() == id) {
            let snapshot = snapshot_with_speed(&inner, progress);
            for cb in &inner.callbacks {
                cb(&snapshot);
            }
        }
    }

    /// Notifies callbacks for every active transfer.
    pub fn tick(&self) {
        let inner = self.inner.read().unwrap();
        for progress in inner.transfers.iter().filter(|t| t.is_active()) {
            let snapshot = snapshot_with_speed(&inner, progress);
            for cb in &inner.callbacks {
                cb(&snapshot);
            }
        }
    }

    /// Starts periodic notifications in a background tokio task.
    ///
    /// Calls nest across clones: the task is spawned by the first `start`
    /// and ends with the matching last [`stop`](Self::stop).
    pub fn start(&self) {
        let mut ticker = self.ticker.lock().unwrap();
        ticker.runs += 1;
        if ticker.runs > 1 {
            return;
        }

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        ticker.stop = Some(tx);

        let tracker = self.clone();
        tokio::spawn(async move {
            let interval = tracker.inner.read().unwrap().interval;
            let mut timer = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = timer.tick() => tracker.tick(),
                    _ = &mut rx => break,
                }
            }
        });
    }

    /// Ends one [`start`](Self::start). The task exits when none remain.
    pub fn stop(&self) {
        let mut ticker = self.ticker.lock().unwrap();
        if ticker.runs == 0 {
            return;
        }
        ticker.runs -= 1;
        if ticker.runs == 0 {
            // Dropping the sender signals the task to exit.
            drop(ticker.stop.take());
        }
    }
}

fn snapshot_with_speed(inner: &TrackerInner, progress: &TransferProgress) -> ProgressSnapshot {
    let mut snapshot = progress.snapshot();
    if let Some(speed) = inner.speeds.get(progress.id()) {
        speed.add_sample(snapshot.transferred_bytes);
        let windowed = speed.bytes_per_second();
        if windowed > 0.0 {
            snapshot.bytes_per_second = windowed;
        }
        if !snapshot.status.is_terminal() {
            snapshot.eta = snapshot
                .total_bytes
                .and_then(|total| speed.eta(total.saturating_sub(snapshot.transferred_bytes)));
        }
    }
    snapshot
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    total: u64,
    timestamp: Instant,
}

/// Calculates transfer speed from cumulative byte counts over a sliding window.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: Vec::new(),
                max_samples: max_samples.unwrap_or(100).max(2),
                window_size: window_size.unwrap_or(Duration::from_secs(5)),
            }),
        }
    }

    /// Records the cumulative byte count observed now.
    pub fn add_sample(&self, total: u64) {
        let mut s = self.inner.lock().unwrap();
        let now = Instant::now();
        s.samples.push(SpeedSample {
            total,
            timestamp: now,
        });

        if let Some(cutoff) = now.checked_sub(s.window_size) {
            s.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if s.samples.len() > s.max_samples {
            let excess = s.samples.len() - s.max_samples;
            s.samples.drain(..excess);
        }
    }

    /// Returns the average speed in bytes/second within the window.
    ///
    /// Returns 0.0 if fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.inner.lock().unwrap();
        let (Some(first), Some(last)) = (s.samples.first(), s.samples.last()) else {
            return 0.0;
        };
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() || last.total <= first.total {
            return 0.0;
        }
        (last.total - first.total) as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    /// Clears all recorded samples.
    pub fn reset(&self) {
        self.inner.lock().unwrap().samples.clear();
    }
}
