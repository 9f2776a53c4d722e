//! Progress notification for observers of a running download.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::trace;

use crate::task::TaskCounters;

/// Minimum spacing between two progress notifications.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Receives best-effort notifications from a download worker.
///
/// Calls happen on the worker, so implementations must return quickly.
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, _percent: f64, _downloaded: u64, _total: u64) {}

    fn on_complete(&self, _path: &Path) {}

    fn on_error(&self, _message: &str) {}
}

/// Listener that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl ProgressListener for NoopListener {}

/// Events forwarded by [`ChannelListener`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Progress {
        percent: f64,
        downloaded: u64,
        total: u64,
    },
    Completed {
        path: PathBuf,
    },
    Failed {
        message: String,
    },
}

/// Forwards notifications over a bounded channel.
///
/// Uses `try_send`, so a slow consumer loses events instead of stalling the
/// worker.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelListener {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// Create a listener together with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    fn send(&self, event: ProgressEvent) {
        if let Err(e) = self.tx.try_send(event) {
            trace!(error = %e, "Dropped progress event");
        }
    }
}

impl ProgressListener for ChannelListener {
    fn on_progress(&self, percent: f64, downloaded: u64, total: u64) {
        self.send(ProgressEvent::Progress {
            percent,
            downloaded,
            total,
        });
    }

    fn on_complete(&self, path: &Path) {
        self.send(ProgressEvent::Completed {
            path: path.to_path_buf(),
        });
    }

    fn on_error(&self, message: &str) {
        self.send(ProgressEvent::Failed {
            message: message.to_string(),
        });
    }
}

/// Per-attempt progress publisher.
///
/// Computes the attempt's speed and forwards progress to the listener no more
/// than once per [`PROGRESS_INTERVAL`].
pub struct ProgressReporter<'a> {
    counters: &'a TaskCounters,
    listener: &'a dyn ProgressListener,
    interval: Duration,
    attempt_started: Instant,
    attempt_base: u64,
    last_emit: Instant,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(counters: &'a TaskCounters, listener: &'a dyn ProgressListener) -> Self {
        let now = Instant::now();
        Self {
            counters,
            listener,
            interval: PROGRESS_INTERVAL,
            attempt_started: now,
            attempt_base: counters.downloaded(),
            last_emit: now,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Publish if the interval has elapsed since the previous publish.
    pub fn tick(&mut self) {
        if self.last_emit.elapsed() >= self.interval {
            self.publish();
        }
    }

    /// Publish now, regardless of cadence.
    pub fn publish(&mut self) {
        let downloaded = self.counters.downloaded();
        let elapsed = self.attempt_started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let attempt_bytes = downloaded.saturating_sub(self.attempt_base);
            self.counters.set_speed((attempt_bytes as f64 / elapsed) as u64);
        }
        self.listener
            .on_progress(self.counters.percent(), downloaded, self.counters.total());
        self.last_emit = Instant::now();
    }
}
