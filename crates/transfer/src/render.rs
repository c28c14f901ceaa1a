//! Terminal progress bars drawn from tracker snapshots.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::progress::ProgressCallback;
use crate::types::{ProgressSnapshot, TransferStatus};

const BAR_TEMPLATE: &str =
    "{msg:24!} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";
const SPINNER_TEMPLATE: &str = "{spinner} {msg:24!} {bytes} ({bytes_per_sec})";

/// Renders one bar per transfer inside a shared [`MultiProgress`].
pub struct BarRenderer {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl BarRenderer {
    /// Draws to stderr.
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Keeps state without drawing anything.
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: Mutex::new(HashMap::new()),
        }
    }

    /// Wraps the renderer as a tracker callback.
    pub fn into_callback(self: Arc<Self>) -> ProgressCallback {
        Box::new(move |snapshot| self.update(snapshot))
    }

    /// Applies a snapshot, adding a bar the first time an id is seen.
    pub fn update(&self, snapshot: &ProgressSnapshot) {
        // The map lock serialises bar creation across workers.
        let mut bars = self.bars.lock().unwrap();
        let bar = bars
            .entry(snapshot.id.clone())
            .or_insert_with(|| self.multi.add(new_bar(snapshot.total_bytes)));

        if let Some(total) = snapshot.total_bytes {
            bar.set_length(total);
        }
        bar.set_message(snapshot.label.clone());
        bar.set_position(snapshot.transferred_bytes);

        if bar.is_finished() {
            return;
        }
        match snapshot.status {
            TransferStatus::Completed => bar.finish_with_message(format!("{} done", snapshot.label)),
            TransferStatus::Failed => bar.abandon_with_message(format!(
                "{} failed: {}",
                snapshot.label,
                snapshot.error.as_deref().unwrap_or("unknown error")
            )),
            TransferStatus::Cancelled => {
                bar.abandon_with_message(format!("{} cancelled", snapshot.label))
            }
            TransferStatus::Pending | TransferStatus::InProgress => {}
        }
    }

    /// Position of the bar for `id`, if one was created.
    pub fn position(&self, id: &str) -> Option<u64> {
        self.bars.lock().unwrap().get(id).map(ProgressBar::position)
    }

    pub fn bar_count(&self) -> usize {
        self.bars.lock().unwrap().len()
    }
}

impl Default for BarRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn new_bar(total: Option<u64>) -> ProgressBar {
    match total {
        Some(len) => {
            let bar = ProgressBar::new(len);
            if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
                bar.set_style(style.progress_chars("=> "));
            }
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template(SPINNER_TEMPLATE) {
                bar.set_style(style);
            }
            bar
        }
    }
}
