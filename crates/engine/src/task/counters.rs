use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};

/// Live progress counters of one task.
///
/// Written by the single worker driving the task, possibly from inside a
/// retry attempt that only holds a shared reference. All counters use
/// relaxed atomics; readers wanting a consistent view take a snapshot.
#[derive(Debug)]
pub struct TaskCounters {
    downloaded_bytes: AtomicU64,
    total_bytes: AtomicU64,
    /// Bytes per second over the current attempt
    speed: AtomicU64,
    completed_segments: AtomicU64,
    total_segments: AtomicU64,
    retry_count: AtomicU32,
    /// Caller-supplied percent as `f64` bits, used while `total_bytes` is unknown
    percent_bits: AtomicU64,
    updated_at_ms: AtomicI64,
}

impl Default for TaskCounters {
    fn default() -> Self {
        Self {
            downloaded_bytes: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            speed: AtomicU64::new(0),
            completed_segments: AtomicU64::new(0),
            total_segments: AtomicU64::new(0),
            retry_count: AtomicU32::new(0),
            percent_bits: AtomicU64::new(0f64.to_bits()),
            updated_at_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

impl TaskCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded_bytes.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn speed(&self) -> u64 {
        self.speed.load(Ordering::Relaxed)
    }

    pub fn completed_segments(&self) -> u64 {
        self.completed_segments.load(Ordering::Relaxed)
    }

    pub fn total_segments(&self) -> u64 {
        self.total_segments.load(Ordering::Relaxed)
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Relaxed)
    }

    /// `downloaded / total * 100` when the total is known, otherwise the last
    /// value given to [`Self::set_percent`]. Always within [0, 100].
    pub fn percent(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            clamp_percent(self.downloaded() as f64 / total as f64 * 100.0)
        } else {
            clamp_percent(f64::from_bits(self.percent_bits.load(Ordering::Relaxed)))
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.updated_at_ms.load(Ordering::Relaxed))
            .unwrap_or_else(Utc::now)
    }

    pub fn touch(&self) {
        self.updated_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn set_total(&self, bytes: u64) {
        self.total_bytes.store(bytes, Ordering::Relaxed);
        self.touch();
    }

    pub fn add_downloaded(&self, bytes: u64) -> u64 {
        let now = self.downloaded_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.touch();
        now
    }

    /// Overwrite the byte count, e.g. with what a resumed download finds on disk.
    pub fn set_downloaded(&self, bytes: u64) {
        self.downloaded_bytes.store(bytes, Ordering::Relaxed);
        self.touch();
    }

    pub fn set_speed(&self, bytes_per_second: u64) {
        self.speed.store(bytes_per_second, Ordering::Relaxed);
        self.touch();
    }

    pub fn set_percent(&self, percent: f64) {
        self.percent_bits
            .store(clamp_percent(percent).to_bits(), Ordering::Relaxed);
        self.touch();
    }

    /// Start a whole-file attempt over from byte 0.
    pub fn restart_attempt(&self) {
        self.downloaded_bytes.store(0, Ordering::Relaxed);
        self.speed.store(0, Ordering::Relaxed);
        self.touch();
    }

    pub fn set_total_segments(&self, count: u64) {
        self.total_segments.store(count, Ordering::Relaxed);
        self.touch();
    }

    /// Mark one more segment done and recompute the segment-based percent.
    pub fn complete_segment(&self) -> u64 {
        let completed = self.completed_segments.fetch_add(1, Ordering::Relaxed) + 1;
        self.update_segment_percent(completed);
        completed
    }

    /// Set the completed count from fragments found on disk.
    pub fn set_completed_segments(&self, completed: u64) {
        self.completed_segments.store(completed, Ordering::Relaxed);
        self.update_segment_percent(completed);
    }

    fn update_segment_percent(&self, completed: u64) {
        let total = self.total_segments();
        if total > 0 {
            self.set_percent(completed as f64 / total as f64 * 100.0);
        } else {
            self.touch();
        }
    }

    pub fn record_retry(&self) -> u32 {
        let count = self.retry_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.touch();
        count
    }

    /// Zero every counter. Used by task reset.
    pub fn clear(&self) {
        self.downloaded_bytes.store(0, Ordering::Relaxed);
        self.total_bytes.store(0, Ordering::Relaxed);
        self.speed.store(0, Ordering::Relaxed);
        self.completed_segments.store(0, Ordering::Relaxed);
        self.total_segments.store(0, Ordering::Relaxed);
        self.retry_count.store(0, Ordering::Relaxed);
        self.percent_bits.store(0f64.to_bits(), Ordering::Relaxed);
        self.touch();
    }
}
