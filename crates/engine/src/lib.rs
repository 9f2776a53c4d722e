//! Download engine for resolved media formats.
//!
//! A [`DownloadTask`] is created per submitted url, bound to one format by the
//! extractor stage and then driven by a [`Downloader`]: [`HttpDownloader`] for
//! single-stream files, [`HlsDownloader`] for segmented playlists. Transfers
//! retry with linear backoff, honor an optional byte-rate ceiling and can be
//! paused or cancelled through the task's [`TaskControl`].

pub mod client;
pub mod config;
pub mod downloader;
pub mod engine;
pub mod error;
pub mod output;
pub mod progress;
pub mod proxy;
pub mod rate_limiter;
pub mod retry;
pub mod task;

pub use client::create_client;
pub use config::{DownloaderConfig, parse_header_lines, parse_rate_limit};
pub use downloader::{Downloader, HlsDownloader, HttpDownloader};
pub use engine::DownloadEngine;
pub use error::{DownloadError, Result};
pub use progress::{ChannelListener, NoopListener, ProgressEvent, ProgressListener};
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
pub use task::{DownloadTask, TaskControl, TaskSnapshot, TaskState};

pub use vidfetch_extractor as extractor;
