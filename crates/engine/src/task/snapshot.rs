use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TaskState;

/// Detached, read-only copy of a task's observable state.
///
/// Owns all of its data, so it can cross threads or be persisted while the
/// live task keeps changing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub url: String,
    pub title: String,
    pub state: TaskState,
    pub percent: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    /// Bytes per second over the last attempt
    pub speed: u64,
    pub completed_segments: u64,
    pub total_segments: u64,
    pub retry_count: u32,
    pub format_id: Option<String>,
    pub file_name: String,
    pub file_path: Option<PathBuf>,
    pub cover_url: Option<String>,
    pub group_name: String,
    pub paused: bool,
    pub cancelled: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
