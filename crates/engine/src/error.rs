use std::path::PathBuf;

use reqwest::StatusCode;
use vidfetch_extractor::ExtractorError;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Deliberate stop requested through the task's control handle.
    /// Not a failure: it never counts as a retry and never sets an error message.
    #[error("download cancelled")]
    Cancelled,

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractorError),

    #[error("HTTP {} {message} for {url}", status.as_u16())]
    Network {
        status: StatusCode,
        message: String,
        url: String,
    },

    #[error("HTTP request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    #[error("segment {index} failed: {reason}")]
    Segment { index: usize, reason: String },

    /// The `EXT-X-MAP` initialization section could not be fetched.
    #[error("init section failed: {reason}")]
    InitSection { reason: String },

    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("playlist error: {reason}")]
    Playlist { reason: String },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("proxy configuration error: {reason}")]
    ProxyConfiguration { reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("task already submitted: {url}")]
    DuplicateTask { url: String },

    #[error("no downloader accepts format `{format_id}` ({protocol})")]
    NoSuitableDownloader { format_id: String, protocol: String },

    #[error("no formats available for {url}")]
    NoFormats { url: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl DownloadError {
    pub fn network(status: StatusCode, url: impl Into<String>) -> Self {
        Self::Network {
            status,
            message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            url: url.into(),
        }
    }

    pub fn segment(index: usize, reason: impl Into<String>) -> Self {
        Self::Segment {
            index,
            reason: reason.into(),
        }
    }

    pub fn init_section(reason: impl Into<String>) -> Self {
        Self::InitSection {
            reason: reason.into(),
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn playlist(reason: impl Into<String>) -> Self {
        Self::Playlist {
            reason: reason.into(),
        }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether another attempt may succeed. Filesystem, configuration and
    /// playlist problems are fatal; so is cancellation.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Segment { .. } | Self::InitSection { .. } => true,
            Self::Http { source } => crate::retry::is_retryable_reqwest_error(source),
            Self::Cancelled
            | Self::Extraction(_)
            | Self::Filesystem { .. }
            | Self::Playlist { .. }
            | Self::InvalidUrl { .. }
            | Self::ProxyConfiguration { .. }
            | Self::Configuration { .. }
            | Self::InvalidStateTransition { .. }
            | Self::DuplicateTask { .. }
            | Self::NoSuitableDownloader { .. }
            | Self::NoFormats { .. }
            | Self::Internal { .. } => false,
        }
    }

    /// Short machine-readable code stored on failed tasks.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::Extraction(_) => "EXTRACTION",
            Self::Network { .. } | Self::Http { .. } => "NETWORK",
            Self::Segment { .. } | Self::InitSection { .. } => "SEGMENT",
            Self::Filesystem { .. } => "FILESYSTEM",
            Self::Playlist { .. } => "PLAYLIST",
            Self::InvalidUrl { .. } => "INVALID_URL",
            Self::ProxyConfiguration { .. } | Self::Configuration { .. } => "CONFIGURATION",
            Self::InvalidStateTransition { .. } => "STATE",
            Self::DuplicateTask { .. } => "DUPLICATE",
            Self::NoSuitableDownloader { .. } | Self::NoFormats { .. } => "UNSUPPORTED",
            Self::Internal { .. } => "INTERNAL",
        }
    }
}

pub type Result<T, E = DownloadError> = std::result::Result<T, E>;
