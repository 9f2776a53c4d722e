//! Download task state machine.

use serde::{Deserialize, Serialize};

use crate::error::DownloadError;

/// Lifecycle states of a download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Freshly created or reset.
    #[default]
    Default,
    /// Queued, waiting for a worker.
    Pending,
    /// Extraction in progress.
    Prepare,
    /// Transfer in progress.
    Downloading,
    /// Stopped at a checkpoint, partial work kept.
    Pause,
    /// Failed after exhausting retries or on a fatal error.
    Error,
    /// Output file fully written.
    Success,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Pending => "PENDING",
            Self::Prepare => "PREPARE",
            Self::Downloading => "DOWNLOADING",
            Self::Pause => "PAUSE",
            Self::Error => "ERROR",
            Self::Success => "SUCCESS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEFAULT" => Some(Self::Default),
            "PENDING" => Some(Self::Pending),
            "PREPARE" => Some(Self::Prepare),
            "DOWNLOADING" => Some(Self::Downloading),
            "PAUSE" => Some(Self::Pause),
            "ERROR" => Some(Self::Error),
            "SUCCESS" => Some(Self::Success),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Downloading)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending | Self::Prepare)
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Pause | Self::Error)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_initial(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// Validate a state transition.
    ///
    /// Returning to `Default` is reserved for [`super::DownloadTask::reset`].
    pub fn can_transition_to(&self, target: TaskState) -> bool {
        use TaskState::*;

        match (self, target) {
            // Same state is always allowed
            (from, to) if *from == to => true,

            (Default, Pending | Prepare) => true,
            (Pending, Prepare) => true,

            // Extraction either binds a format or fails
            (Prepare, Downloading | Error) => true,

            (Downloading, Success | Error | Pause) => true,

            // Resume and manual retry
            (Pause | Error, Downloading) => true,

            _ => false,
        }
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&self, target: TaskState) -> Result<TaskState, DownloadError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(DownloadError::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
