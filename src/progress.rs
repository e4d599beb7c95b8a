// src/progress.rs

//! Transfer progress reporting
//!
//! Bulk transfers open one child tracker on the root tracker handed to the
//! controller, report each finished file or directory to it, and close it
//! exactly once. Output modes are interchangeable:
//! - `CliProgress`: one indicatif bar per transfer
//! - `LogProgress`: milestones through tracing
//! - `CallbackProgress`: events to a closure (tests, embedding)
//! - `SilentProgress`: nothing, for `--quiet`

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Sink for transfer progress
///
/// Implementations are `Send + Sync` so a root tracker can sit inside the
/// controller and be borrowed by every transfer.
pub trait ProgressTracker: Send + Sync {
    /// Open a tracker for one transfer of `total` units
    fn child(&self, label: &str, total: u64) -> Box<dyn ProgressTracker>;

    /// One unit finished; `item` names the file or directory
    fn unit_done(&self, item: &str);

    /// The transfer succeeded
    fn finish(&self, message: &str);

    /// The transfer stopped early
    fn abort(&self, message: &str);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl SilentProgress {
    pub fn new() -> Self {
        Self
    }
}

impl ProgressTracker for SilentProgress {
    fn child(&self, _label: &str, _total: u64) -> Box<dyn ProgressTracker> {
        Box::new(Self)
    }

    fn unit_done(&self, _item: &str) {}

    fn finish(&self, _message: &str) {}

    fn abort(&self, _message: &str) {}
}

/// Logs transfers through tracing
///
/// Every unit goes to `debug`; roughly every tenth of a transfer is logged at
/// `info`. Used when stderr is not a terminal.
#[derive(Debug)]
pub struct LogProgress {
    label: String,
    total: u64,
    done: AtomicU64,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self::sized(label.into(), 0)
    }

    fn sized(label: String, total: u64) -> Self {
        Self {
            label,
            total,
            done: AtomicU64::new(0),
        }
    }

    fn step(&self) -> u64 {
        (self.total / 10).max(1)
    }
}

impl ProgressTracker for LogProgress {
    fn child(&self, label: &str, total: u64) -> Box<dyn ProgressTracker> {
        info!("{}: {} units", label, total);
        Box::new(Self::sized(label.to_string(), total))
    }

    fn unit_done(&self, item: &str) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("{}: {}", self.label, item);
        if self.total > 0 && done % self.step() == 0 {
            info!(
                "{}: {}% ({}/{})",
                self.label,
                done * 100 / self.total,
                done,
                self.total
            );
        }
    }

    fn finish(&self, message: &str) {
        info!("{}: {}", self.label, message);
    }

    fn abort(&self, message: &str) {
        warn!("{}: {}", self.label, message);
    }
}

/// Events seen by a [`CallbackProgress`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started { label: String, total: u64 },
    Unit { label: String, item: String, done: u64, total: u64 },
    Finished { label: String, message: String },
    Aborted { label: String, message: String },
}

/// Forwards every event to a closure shared by all children
pub struct CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync + 'static,
{
    label: String,
    total: u64,
    done: AtomicU64,
    callback: Arc<F>,
}

impl<F> CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync + 'static,
{
    pub fn new(callback: F) -> Self {
        Self::sized(String::new(), 0, Arc::new(callback))
    }

    fn sized(label: String, total: u64, callback: Arc<F>) -> Self {
        Self {
            label,
            total,
            done: AtomicU64::new(0),
            callback,
        }
    }
}

impl<F> ProgressTracker for CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync + 'static,
{
    fn child(&self, label: &str, total: u64) -> Box<dyn ProgressTracker> {
        (self.callback)(ProgressEvent::Started {
            label: label.to_string(),
            total,
        });
        Box::new(Self::sized(label.to_string(), total, Arc::clone(&self.callback)))
    }

    fn unit_done(&self, item: &str) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        (self.callback)(ProgressEvent::Unit {
            label: self.label.clone(),
            item: item.to_string(),
            done,
            total: self.total,
        });
    }

    fn finish(&self, message: &str) {
        (self.callback)(ProgressEvent::Finished {
            label: self.label.clone(),
            message: message.to_string(),
        });
    }

    fn abort(&self, message: &str) {
        (self.callback)(ProgressEvent::Aborted {
            label: self.label.clone(),
            message: message.to_string(),
        });
    }
}

/// Terminal progress bars, stacked one per transfer
pub struct CliProgress {
    bars: MultiProgress,
    bar: ProgressBar,
}

impl Default for CliProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl CliProgress {
    /// Root tracker; draws nothing itself
    pub fn new() -> Self {
        let bars = MultiProgress::new();
        let bar = bars.add(ProgressBar::hidden());
        Self { bars, bar }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:>16} [{bar:40.green/dim}] {pos}/{len} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-")
    }
}

impl ProgressTracker for CliProgress {
    fn child(&self, label: &str, total: u64) -> Box<dyn ProgressTracker> {
        let bar = self.bars.add(ProgressBar::new(total));
        bar.set_style(Self::style());
        bar.set_prefix(label.to_string());
        Box::new(CliProgress {
            bars: self.bars.clone(),
            bar,
        })
    }

    fn unit_done(&self, item: &str) {
        self.bar.set_message(item.to_string());
        self.bar.inc(1);
    }

    fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    fn abort(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}
