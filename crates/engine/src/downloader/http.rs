//! Single-stream HTTP(S) downloader.
//!
//! Every attempt restarts from byte 0 and truncates the output file, even
//! though the request advertises `Range: bytes=0-`. On failure the partial
//! file is left in place.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, RANGE};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use vidfetch_extractor::{Format, MediaInfo, Protocol};

use super::{Downloader, apply_format_headers, fs_err};
use crate::config::DownloaderConfig;
use crate::error::DownloadError;
use crate::progress::{ProgressListener, ProgressReporter};
use crate::rate_limiter::RateLimiter;
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};
use crate::task::{DownloadTask, TaskControl, TaskCounters};

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

pub struct HttpDownloader {
    client: Client,
    config: DownloaderConfig,
}

impl HttpDownloader {
    pub fn new(client: Client, config: DownloaderConfig) -> Self {
        Self { client, config }
    }

    /// Metadata-only request. Returns the advertised size, if any.
    async fn probe(&self, format: &Format) -> Result<Option<u64>, DownloadError> {
        let response = apply_format_headers(self.client.head(format.url()), format)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::network(status, format.url()));
        }

        let size = content_length(response.headers());
        debug!(status = status.as_u16(), ?size, "Probe succeeded");
        Ok(size)
    }

    /// One full transfer into `output_path`.
    ///
    /// Returns [`DownloadError::Cancelled`] when a pause or cancel is observed.
    async fn attempt(
        &self,
        counters: &TaskCounters,
        control: &TaskControl,
        listener: &dyn ProgressListener,
        format: &Format,
        output_path: &Path,
    ) -> Result<(), DownloadError> {
        counters.restart_attempt();
        let token = control.token();

        let response = apply_format_headers(self.client.get(format.url()), format)
            .header(RANGE, "bytes=0-")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::network(status, format.url()));
        }

        if counters.total() == 0
            && let Some(len) = content_length(response.headers())
        {
            counters.set_total(len);
        }

        let mut file = File::create(output_path)
            .await
            .map_err(fs_err(output_path))?;
        let mut reporter = ProgressReporter::new(counters, listener);
        let mut limiter = RateLimiter::from_limit(self.config.rate_limit);
        let chunk_size = self.config.chunk_size.max(1);

        // The response, and with it the connection, is dropped on every return path.
        let mut stream = response.bytes_stream();
        while let Some(item) = stream.next().await {
            let bytes = item?;
            for chunk in bytes.chunks(chunk_size) {
                if control.should_stop() {
                    file.flush().await.map_err(fs_err(output_path))?;
                    return Err(DownloadError::Cancelled);
                }

                file.write_all(chunk).await.map_err(fs_err(output_path))?;
                counters.add_downloaded(chunk.len() as u64);
                reporter.tick();

                if let Some(limiter) = limiter.as_mut() {
                    limiter.acquire(chunk.len(), &token).await?;
                }
            }
        }

        file.flush().await.map_err(fs_err(output_path))?;
        reporter.publish();
        Ok(())
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    fn name(&self) -> &'static str {
        "http"
    }

    fn suitable(&self, format: &Format) -> bool {
        matches!(format.protocol(), Protocol::Http | Protocol::Https)
    }

    #[instrument(
        skip(self, task, media_info, format, output_path),
        fields(id = %media_info.id, format_id = format.format_id(), url = format.url())
    )]
    async fn perform_download(
        &self,
        task: &mut DownloadTask,
        media_info: &MediaInfo,
        format: &Format,
        output_path: &Path,
    ) -> Result<bool, DownloadError> {
        if let Some(total) = self.probe(format).await? {
            task.counters().set_total(total);
        }

        let counters = task.counters();
        let control = task.control();
        let listener = task.listener();
        let listener = listener.as_ref();
        let token = control.token();
        let policy = RetryPolicy::linear(self.config.retries, self.config.retry_base_delay);

        let result = retry_with_backoff(
            &policy,
            &token,
            |_| async move {
                RetryAction::from_result(
                    self.attempt(counters, control, listener, format, output_path)
                        .await,
                )
            },
            |attempt, error| {
                let retries = counters.record_retry();
                warn!(attempt = attempt + 1, retries, error = %error, "Download attempt failed");
            },
        )
        .await;

        match result {
            Ok(()) => {
                if counters.total() == 0 {
                    counters.set_total(counters.downloaded());
                }
                info!(
                    bytes = counters.downloaded(),
                    path = %output_path.display(),
                    "Download finished"
                );
                Ok(true)
            }
            Err(DownloadError::Cancelled) => {
                info!(bytes = counters.downloaded(), "Download interrupted");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downloader() -> HttpDownloader {
        crate::client::install_rustls_provider();
        HttpDownloader::new(Client::new(), DownloaderConfig::default())
    }

    #[test]
    fn handles_plain_http_formats_only() {
        let downloader = downloader();
        let mp4 = Format::builder("https://cdn.example.com/a.mp4").build();
        let plain = Format::builder("http://cdn.example.com/a.flv").build();
        let hls = Format::builder("https://cdn.example.com/a.m3u8").build();
        assert!(downloader.suitable(&mp4));
        assert!(downloader.suitable(&plain));
        assert!(!downloader.suitable(&hls));
    }

    #[test]
    fn parses_content_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), None);
        headers.insert(CONTENT_LENGTH, "1000".parse().unwrap());
        assert_eq!(content_length(&headers), Some(1000));
    }
}
