use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;
use vidfetch_extractor::{Format, MediaInfo};

use super::{TaskControl, TaskCounters, TaskSnapshot, TaskState};
use crate::error::DownloadError;
use crate::progress::{NoopListener, ProgressListener};

/// Identity key of a source url: surrounding whitespace removed, lowercased.
pub fn normalize_url(url: &str) -> String {
    url.trim().to_lowercase()
}

/// The unit of work tracked from submission to a terminal state.
///
/// A task is mutated in place by one worker at a time. Other threads observe
/// it through [`DownloadTask::snapshot`] and steer it through
/// [`DownloadTask::control`].
pub struct DownloadTask {
    id: Uuid,
    /// Source url as submitted, trimmed
    url: String,
    key: String,
    state: TaskState,
    format: Option<Format>,
    media_info: Option<MediaInfo>,
    counters: TaskCounters,
    control: TaskControl,
    listener: Arc<dyn ProgressListener>,
    title: String,
    file_name: String,
    file_path: Option<PathBuf>,
    cover_url: Option<String>,
    cover_path: Option<PathBuf>,
    group_name: String,
    error_code: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl DownloadTask {
    pub fn new(url: impl AsRef<str>) -> Self {
        let url = url.as_ref().trim().to_string();
        let key = normalize_url(&url);
        Self {
            id: Uuid::new_v4(),
            url,
            key,
            state: TaskState::Default,
            format: None,
            media_info: None,
            counters: TaskCounters::new(),
            control: TaskControl::new(),
            listener: Arc::new(NoopListener),
            title: String::new(),
            file_name: String::new(),
            file_path: None,
            cover_url: None,
            cover_path: None,
            group_name: String::new(),
            error_code: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Normalized url used for equality and duplicate detection.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn format(&self) -> Option<&Format> {
        self.format.as_ref()
    }

    pub fn media_info(&self) -> Option<&MediaInfo> {
        self.media_info.as_ref()
    }

    pub fn counters(&self) -> &TaskCounters {
        &self.counters
    }

    pub fn control(&self) -> &TaskControl {
        &self.control
    }

    pub fn listener(&self) -> Arc<dyn ProgressListener> {
        Arc::clone(&self.listener)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn cover_url(&self) -> Option<&str> {
        self.cover_url.as_deref()
    }

    pub fn cover_path(&self) -> Option<&Path> {
        self.cover_path.as_deref()
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn percent(&self) -> f64 {
        self.counters.percent()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.counters.updated_at()
    }

    /// Move along the state graph, rejecting transitions it does not allow.
    pub fn set_state(&mut self, target: TaskState) -> Result<(), DownloadError> {
        let next = self.state.transition_to(target)?;
        if next != self.state {
            debug!(url = %self.url, from = %self.state, to = %next, "Task state changed");
        }
        self.state = next;
        if next == TaskState::Downloading {
            self.error_code = None;
            self.error_message = None;
        }
        self.counters.touch();
        Ok(())
    }

    /// Record a failure and move to `Error`.
    ///
    /// A cancellation is not a failure and goes through [`Self::interrupt`] instead.
    pub fn fail(&mut self, error: &DownloadError) -> Result<(), DownloadError> {
        if error.is_cancelled() {
            return self.interrupt();
        }
        self.set_state(TaskState::Error)?;
        self.error_code = Some(error.code().to_string());
        self.error_message = Some(error.to_string());
        Ok(())
    }

    /// Move a running task to `Pause` after a pause or cancel was observed.
    pub fn interrupt(&mut self) -> Result<(), DownloadError> {
        self.set_state(TaskState::Pause)
    }

    /// Bind the format chosen for this task.
    ///
    /// A task keeps one format for its whole life; re-binding is only accepted
    /// for the same `format_id` (for example a refreshed signed url).
    pub fn bind_format(&mut self, format: Format) -> Result<(), DownloadError> {
        if let Some(current) = &self.format
            && current.format_id() != format.format_id()
        {
            return Err(DownloadError::configuration(format!(
                "task already bound to format `{}`, refusing `{}`",
                current.format_id(),
                format.format_id()
            )));
        }
        self.format = Some(format);
        self.counters.touch();
        Ok(())
    }

    /// Store the extraction result and copy its descriptive fields.
    pub fn set_media_info(&mut self, info: MediaInfo) {
        self.title = info.title.clone();
        self.cover_url = info.thumbnail.clone();
        self.media_info = Some(info);
        self.counters.touch();
    }

    pub fn set_output_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.file_path = Some(path);
        self.counters.touch();
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.counters.touch();
    }

    pub fn set_cover_path(&mut self, path: impl Into<PathBuf>) {
        self.cover_path = Some(path.into());
        self.counters.touch();
    }

    pub fn set_group_name(&mut self, group: impl Into<String>) {
        self.group_name = group.into();
        self.counters.touch();
    }

    pub fn set_listener(&mut self, listener: Arc<dyn ProgressListener>) {
        self.listener = listener;
    }

    /// Return to `Default`, clearing progress and descriptive fields.
    ///
    /// The identity url, id, creation time and bound format survive.
    pub fn reset(&mut self) {
        debug!(url = %self.url, from = %self.state, "Task reset");
        self.state = TaskState::Default;
        self.counters.clear();
        self.control.clear();
        self.media_info = None;
        self.title.clear();
        self.file_name.clear();
        self.file_path = None;
        self.cover_url = None;
        self.cover_path = None;
        self.group_name.clear();
        self.error_code = None;
        self.error_message = None;
    }

    /// Detached copy of the observable state.
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            url: self.url.clone(),
            title: self.title.clone(),
            state: self.state,
            percent: self.counters.percent(),
            downloaded_bytes: self.counters.downloaded(),
            total_bytes: self.counters.total(),
            speed: self.counters.speed(),
            completed_segments: self.counters.completed_segments(),
            total_segments: self.counters.total_segments(),
            retry_count: self.counters.retry_count(),
            format_id: self.format.as_ref().map(|f| f.format_id().to_string()),
            file_name: self.file_name.clone(),
            file_path: self.file_path.clone(),
            cover_url: self.cover_url.clone(),
            group_name: self.group_name.clone(),
            paused: self.control.is_paused(),
            cancelled: self.control.is_cancelled(),
            error_code: self.error_code.clone(),
            error_message: self.error_message.clone(),
            created_at: self.created_at,
            updated_at: self.counters.updated_at(),
        }
    }
}

impl PartialEq for DownloadTask {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for DownloadTask {}

impl Hash for DownloadTask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadTask")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("state", &self.state)
            .field("format", &self.format.as_ref().map(|f| f.format_id()))
            .field("counters", &self.counters)
            .field("control", &self.control)
            .field("error_message", &self.error_message)
            .finish_non_exhaustive()
    }
}
