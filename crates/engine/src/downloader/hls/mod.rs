//! Segmented HLS downloader.
//!
//! Fragments are stored one file per segment in a `<output name>.part`
//! directory. A restarted download skips every fragment already on disk, and
//! the directory is only removed after a successful merge.

mod merge;
mod playlist;
mod segment;

pub use merge::{Container, merge_fragments, sniff_container};
pub use playlist::{InitSection, SegmentPlan, parse_playlist, resolve_uri, select_variant};
pub use segment::{ByteSpan, Segment, fragment_ext, fragment_name};

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use m3u8_rs::Playlist;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;
use vidfetch_extractor::{Format, MediaInfo, Protocol};

use super::{Downloader, apply_format_headers, fs_err};
use crate::config::DownloaderConfig;
use crate::error::DownloadError;
use crate::progress::ProgressReporter;
use crate::rate_limiter::RateLimiter;
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};
use crate::task::{DownloadTask, TaskControl, TaskCounters};

const INIT_FILE_NAME: &str = "init.mp4";

/// Directory holding the fragments of `output_path`.
pub fn fragment_dir(output_path: &Path, cache_dir: Option<&Path>) -> PathBuf {
    let mut name = output_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "download".into());
    name.push(".part");

    let parent = cache_dir
        .map(Path::to_path_buf)
        .or_else(|| output_path.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    parent.join(name)
}

/// Final name of a merged download. A playlist extension is swapped for the
/// container's; any other extension is kept.
pub fn merged_output_path(output_path: &Path, container: Container) -> PathBuf {
    match output_path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("m3u8") => {
            output_path.with_extension(container.ext())
        }
        _ => output_path.to_path_buf(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FragmentKind {
    Init,
    Media(usize),
}

impl FragmentKind {
    fn error(self, reason: impl Into<String>) -> DownloadError {
        match self {
            Self::Init => DownloadError::init_section(reason),
            Self::Media(index) => DownloadError::segment(index, reason),
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::Media(index) => write!(f, "{index}"),
        }
    }
}

/// Where a fragment body comes from.
struct FragmentSource<'a> {
    kind: FragmentKind,
    url: &'a Url,
    byte_range: Option<ByteSpan>,
    path: &'a Path,
}

pub struct HlsDownloader {
    client: Client,
    config: DownloaderConfig,
}

impl HlsDownloader {
    pub fn new(client: Client, config: DownloaderConfig) -> Self {
        Self { client, config }
    }

    async fn fetch_text(&self, url: &Url, format: &Format) -> Result<String, DownloadError> {
        let response = apply_format_headers(self.client.get(url.clone()), format)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::network(status, url.as_str()));
        }
        Ok(response.text().await?)
    }

    /// Fetch the playlist, following a master playlist to its best variant.
    async fn load_media_playlist(
        &self,
        format: &Format,
        token: &tokio_util::sync::CancellationToken,
    ) -> Result<(Url, m3u8_rs::MediaPlaylist), DownloadError> {
        let policy = RetryPolicy::linear(self.config.retries, self.config.retry_base_delay);
        let mut url = Url::parse(format.url())
            .map_err(|e| DownloadError::invalid_url(format.url(), e.to_string()))?;

        // One level of indirection at most: master -> media.
        for _ in 0..2 {
            let body = retry_with_backoff(
                &policy,
                token,
                |_| {
                    let url = &url;
                    async move { RetryAction::from_result(self.fetch_text(url, format).await) }
                },
                |attempt, error| warn!(attempt = attempt + 1, error = %error, "Playlist fetch failed"),
            )
            .await?;

            match parse_playlist(&body)? {
                Playlist::MediaPlaylist(media) => return Ok((url, media)),
                Playlist::MasterPlaylist(master) => {
                    let variant = select_variant(&master).ok_or_else(|| {
                        DownloadError::playlist("master playlist has no playable variant")
                    })?;
                    info!(
                        bandwidth = variant.bandwidth,
                        uri = %variant.uri,
                        "Selected variant from master playlist"
                    );
                    url = resolve_uri(&url, &variant.uri)?;
                }
            }
        }

        Err(DownloadError::playlist("variant playlist is itself a master playlist"))
    }

    /// Download one fragment to its staging path and move it into place.
    ///
    /// Returns the fragment size.
    async fn fetch_fragment(
        &self,
        source: &FragmentSource<'_>,
        format: &Format,
        control: &TaskControl,
        limiter: &Mutex<Option<RateLimiter>>,
    ) -> Result<u64, DownloadError> {
        let token = control.token();
        let mut request = apply_format_headers(self.client.get(source.url.clone()), format);
        if let Some(span) = source.byte_range {
            request = request.header(RANGE, span.range_header());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(source.kind.error(
                DownloadError::network(status, source.url.as_str()).to_string(),
            ));
        }
        // A 200 to a ranged request is the whole resource, not the fragment.
        if source.byte_range.is_some() && status != StatusCode::PARTIAL_CONTENT {
            return Err(source
                .kind
                .error(format!("server ignored byte range (HTTP {})", status.as_u16())));
        }

        let staging = segment::staging_path(source.path);
        let mut file = File::create(&staging).await.map_err(fs_err(&staging))?;
        let chunk_size = self.config.chunk_size.max(1);
        let mut written = 0u64;

        let mut stream = response.bytes_stream();
        while let Some(item) = stream.next().await {
            let bytes = item?;
            for chunk in bytes.chunks(chunk_size) {
                if control.should_stop() {
                    return Err(DownloadError::Cancelled);
                }
                file.write_all(chunk).await.map_err(fs_err(&staging))?;
                written += chunk.len() as u64;

                if let Some(limiter) = limiter.lock().await.as_mut() {
                    limiter.acquire(chunk.len(), &token).await?;
                }
            }
        }

        file.flush().await.map_err(fs_err(&staging))?;
        drop(file);

        if written == 0 {
            return Err(source.kind.error("empty response body"));
        }

        tokio::fs::rename(&staging, source.path)
            .await
            .map_err(fs_err(source.path))?;
        Ok(written)
    }

    /// Fetch a fragment under the fragment retry policy.
    async fn fetch_with_retry(
        &self,
        source: FragmentSource<'_>,
        format: &Format,
        control: &TaskControl,
        counters: &TaskCounters,
        limiter: &Mutex<Option<RateLimiter>>,
    ) -> Result<u64, DownloadError> {
        let policy =
            RetryPolicy::linear(self.config.fragment_retries, self.config.retry_base_delay);
        let token = control.token();
        let source = &source;

        retry_with_backoff(
            &policy,
            &token,
            |_| async move {
                RetryAction::from_result(
                    self.fetch_fragment(source, format, control, limiter).await,
                )
            },
            |attempt, error| {
                let retries = counters.record_retry();
                warn!(
                    fragment = %source.kind,
                    attempt = attempt + 1,
                    retries,
                    error = %error,
                    "Fragment attempt failed"
                );
            },
        )
        .await
        .map_err(|e| match e {
            DownloadError::Network { .. } | DownloadError::Http { .. } => {
                source.kind.error(e.to_string())
            }
            other => other,
        })
    }
}

#[async_trait]
impl Downloader for HlsDownloader {
    fn name(&self) -> &'static str {
        "hls"
    }

    fn suitable(&self, format: &Format) -> bool {
        format.protocol() == Protocol::Hls
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
        let counters = task.counters();
        let control = task.control();
        let listener = task.listener();
        let token = control.token();

        let (media_url, media) = match self.load_media_playlist(format, &token).await {
            Err(DownloadError::Cancelled) => return Ok(false),
            other => other?,
        };

        let dir = fragment_dir(output_path, self.config.cache_dir.as_deref());
        let mut plan = SegmentPlan::build(&media_url, &media, &dir)?;
        counters.set_total_segments(plan.segments.len() as u64);
        if let Some(estimate) = plan.estimated_bytes {
            counters.set_total(estimate);
        }

        tokio::fs::create_dir_all(&dir).await.map_err(fs_err(&dir))?;

        // Rebuild the baseline from what is already on disk.
        let mut completed = 0u64;
        let mut on_disk = 0u64;
        for segment in plan.segments.iter_mut() {
            if let Some(size) = segment.check_on_disk().await {
                completed += 1;
                on_disk += size;
            }
        }
        counters.set_completed_segments(completed);
        counters.set_downloaded(on_disk);
        info!(
            segments = plan.segments.len(),
            completed,
            dir = %dir.display(),
            "Starting segmented download"
        );

        let limiter = Mutex::new(RateLimiter::from_limit(self.config.rate_limit));
        let mut reporter = ProgressReporter::new(counters, listener.as_ref());

        let init_path = match &plan.init {
            Some(init) => {
                let path = dir.join(INIT_FILE_NAME);
                if segment::existing_size(&path).await.is_none() {
                    let source = FragmentSource {
                        kind: FragmentKind::Init,
                        url: &init.url,
                        byte_range: init.byte_range,
                        path: &path,
                    };
                    match self
                        .fetch_with_retry(source, format, control, counters, &limiter)
                        .await
                    {
                        Ok(size) => debug!(bytes = size, "Init section downloaded"),
                        Err(DownloadError::Cancelled) => return Ok(false),
                        Err(e) => return Err(e),
                    }
                }
                Some(path)
            }
            None => None,
        };

        for segment in plan.segments.iter_mut() {
            if segment.completed {
                continue;
            }
            if control.should_stop() {
                info!(completed = counters.completed_segments(), "Segmented download interrupted");
                return Ok(false);
            }

            let source = FragmentSource {
                kind: FragmentKind::Media(segment.index),
                url: &segment.url,
                byte_range: segment.byte_range,
                path: &segment.path,
            };
            match self
                .fetch_with_retry(source, format, control, counters, &limiter)
                .await
            {
                Ok(size) => {
                    segment.completed = true;
                    counters.add_downloaded(size);
                    let done = counters.complete_segment();
                    debug!(segment = segment.index, bytes = size, done, "Fragment downloaded");
                    reporter.tick();
                }
                Err(DownloadError::Cancelled) => {
                    info!(completed = counters.completed_segments(), "Segmented download interrupted");
                    return Ok(false);
                }
                Err(e) => {
                    warn!(
                        segment = segment.index,
                        completed = counters.completed_segments(),
                        error = %e,
                        "Fragment retries exhausted, keeping fragments for resume"
                    );
                    return Err(e);
                }
            }
        }

        let fragments: Vec<PathBuf> = plan.segments.iter().map(|s| s.path.clone()).collect();
        let head = init_path.as_deref().or(fragments.first().map(PathBuf::as_path));
        let final_path = match head {
            Some(head) => {
                let container = merge::sniff_file(head).await?;
                debug!(container = container.as_str(), "Detected fragment container");
                merged_output_path(output_path, container)
            }
            None => output_path.to_path_buf(),
        };

        let written = merge_fragments(init_path.as_deref(), &fragments, &final_path).await?;
        counters.set_downloaded(written);
        counters.set_total(written);
        counters.set_percent(100.0);
        reporter.publish();

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            warn!(dir = %dir.display(), error = %e, "Failed to remove fragment directory");
        }

        info!(bytes = written, path = %final_path.display(), "Segmented download finished");
        if final_path != output_path {
            task.set_output_path(final_path);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_dir_sits_next_to_output() {
        let dir = fragment_dir(Path::new("/videos/clip.mp4"), None);
        assert_eq!(dir, PathBuf::from("/videos/clip.mp4.part"));
    }

    #[test]
    fn fragment_dir_prefers_cache_dir() {
        let dir = fragment_dir(Path::new("/videos/clip.mp4"), Some(Path::new("/cache")));
        assert_eq!(dir, PathBuf::from("/cache/clip.mp4.part"));
    }

    #[test]
    fn playlist_extension_follows_the_container() {
        let out = Path::new("/videos/clip.m3u8");
        assert_eq!(merged_output_path(out, Container::Ts), PathBuf::from("/videos/clip.ts"));
        assert_eq!(merged_output_path(out, Container::Fmp4), PathBuf::from("/videos/clip.mp4"));

        let upper = Path::new("/videos/clip.M3U8");
        assert_eq!(merged_output_path(upper, Container::Ts), PathBuf::from("/videos/clip.ts"));
    }

    #[test]
    fn chosen_extension_is_kept() {
        let out = Path::new("/videos/clip.mkv");
        assert_eq!(merged_output_path(out, Container::Fmp4), out.to_path_buf());
        let bare = Path::new("/videos/clip");
        assert_eq!(merged_output_path(bare, Container::Ts), bare.to_path_buf());
    }

    #[test]
    fn init_failures_are_not_segment_zero() {
        let err = FragmentKind::Init.error("HTTP 404");
        assert!(matches!(err, DownloadError::InitSection { .. }));
        let err = FragmentKind::Media(0).error("HTTP 404");
        assert!(matches!(err, DownloadError::Segment { index: 0, .. }));
        assert_eq!(FragmentKind::Init.to_string(), "init");
        assert_eq!(FragmentKind::Media(7).to_string(), "7");
    }

    #[test]
    fn only_hls_formats_are_suitable() {
        crate::client::install_rustls_provider();
        let downloader = HlsDownloader::new(Client::new(), DownloaderConfig::default());
        let hls = Format::builder("https://cdn.example.com/a.m3u8").build();
        let mp4 = Format::builder("https://cdn.example.com/a.mp4").build();
        assert!(downloader.suitable(&hls));
        assert!(!downloader.suitable(&mp4));
    }
}
