use std::path::Path;

use tracing::{info, warn};
use vidfetch_engine::ProgressListener;

/// Logs engine notifications for one download.
pub struct LogListener {
    label: String,
}

impl LogListener {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ProgressListener for LogListener {
    fn on_progress(&self, percent: f64, downloaded: u64, total: u64) {
        if total > 0 {
            info!(
                "[{}] {:>5.1}% of {} ({} done)",
                self.label,
                percent,
                format_bytes(total),
                format_bytes(downloaded)
            );
        } else {
            info!("[{}] {} done", self.label, format_bytes(downloaded));
        }
    }

    fn on_complete(&self, path: &Path) {
        info!("[{}] Saved to {}", self.label, path.display());
    }

    fn on_error(&self, message: &str) {
        warn!("[{}] {}", self.label, message);
    }
}

/// Format bytes into human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
