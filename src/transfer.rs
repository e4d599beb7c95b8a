// src/transfer.rs

//! Unit-counted transfers
//!
//! Every bulk operation (tree upload, tree download, prefix download) declares
//! its unit count before the first byte moves and advances once per completed
//! file or directory. A [`Transfer`] is finalised exactly once: [`Transfer::complete`]
//! on success, or its `Drop` when an error unwinds the operation early.

use crate::progress::ProgressTracker;
use tracing::{debug, warn};

/// Outcome of a completed transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSummary {
    /// Units that were completed
    pub units: u64,
}

/// An in-flight bulk transfer
pub struct Transfer {
    label: String,
    tracker: Box<dyn ProgressTracker>,
    total: u64,
    completed: u64,
    finished: bool,
}

impl Transfer {
    /// Start a transfer of `total` units, reporting to a child of `parent`
    pub fn start(parent: &dyn ProgressTracker, label: impl Into<String>, total: u64) -> Self {
        let label = label.into();
        debug!("{}: starting transfer of {} units", label, total);
        let tracker = parent.child(&label, total);
        Self {
            label,
            tracker,
            total,
            completed: 0,
            finished: false,
        }
    }

    /// Declared unit count
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Units completed so far
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Record one completed unit
    pub fn advance(&mut self, item: &str) {
        if self.completed >= self.total {
            warn!(
                "{}: unit '{}' exceeds declared total of {}",
                self.label, item, self.total
            );
            return;
        }
        self.completed += 1;
        self.tracker.unit_done(item);
    }

    /// Finalise successfully
    pub fn complete(mut self) -> TransferSummary {
        if self.completed < self.total {
            warn!(
                "{}: finished with {}/{} units",
                self.label, self.completed, self.total
            );
        }
        self.tracker.finish(&format!("{} done", self.label));
        self.finished = true;
        TransferSummary {
            units: self.completed,
        }
    }
}

impl Drop for Transfer {
    fn drop(&mut self) {
        if !self.finished {
            self.tracker.abort(&format!(
                "{} aborted after {}/{}",
                self.label, self.completed, self.total
            ));
        }
    }
}
