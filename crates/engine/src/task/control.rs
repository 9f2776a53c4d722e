use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Default)]
struct ControlInner {
    paused: AtomicBool,
    cancelled: AtomicBool,
    /// Fired by pause or cancel so sleeping workers wake up. Replaced on resume.
    interrupt: Mutex<CancellationToken>,
}

/// Cheap, cloneable handle for pausing or cancelling a task from outside the
/// worker that owns it.
///
/// Workers observe the flags at checkpoints (before each chunk write and
/// before each retry attempt) and wait on [`TaskControl::token`] during
/// rate-limit and backoff sleeps.
#[derive(Debug, Clone, Default)]
pub struct TaskControl {
    inner: Arc<ControlInner>,
}

impl TaskControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a pause. Partial work is kept for a later resume.
    pub fn pause(&self) {
        debug!("Pause requested");
        self.inner.paused.store(true, Ordering::SeqCst);
        self.inner.interrupt.lock().cancel();
    }

    /// Request a cancel. Like pause, but the caller should not expect a retry.
    pub fn cancel(&self) {
        debug!("Cancel requested");
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.interrupt.lock().cancel();
    }

    /// Clear the pause flag and arm a fresh interrupt token.
    ///
    /// Returns `false` for a cancelled task, which stays cancelled.
    pub fn resume(&self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.inner.paused.store(false, Ordering::SeqCst);
        let mut token = self.inner.interrupt.lock();
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
        true
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Either flag is set.
    pub fn should_stop(&self) -> bool {
        self.is_paused() || self.is_cancelled()
    }

    /// Token fired by the next pause or cancel.
    pub fn token(&self) -> CancellationToken {
        self.inner.interrupt.lock().clone()
    }

    /// Drop both flags and arm a fresh token. Used by task reset.
    pub(crate) fn clear(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
        self.inner.cancelled.store(false, Ordering::SeqCst);
        *self.inner.interrupt.lock() = CancellationToken::new();
    }
}
