//! Downloader contract and the bundled strategies.

pub mod hls;
pub mod http;

use std::path::Path;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use reqwest::header::{HeaderName, HeaderValue, REFERER};
use tracing::warn;
use vidfetch_extractor::{Format, MediaInfo};

use crate::error::DownloadError;
use crate::task::DownloadTask;

pub use hls::HlsDownloader;
pub use http::HttpDownloader;

/// Referer sent when the format url has no usable origin.
pub const FALLBACK_REFERER: &str = "https://www.google.com/";

/// A transfer strategy for one family of formats.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this downloader handles the format's protocol.
    fn suitable(&self, format: &Format) -> bool;

    /// Fetch `format` into `output_path`, updating the task's counters.
    ///
    /// `Ok(true)` means the file is complete. `Ok(false)` means a pause or
    /// cancel was observed at a checkpoint and partial work was kept. Errors
    /// are returned only after the retry ceiling is exhausted or on a fatal
    /// failure.
    async fn perform_download(
        &self,
        task: &mut DownloadTask,
        media_info: &MediaInfo,
        format: &Format,
        output_path: &Path,
    ) -> Result<bool, DownloadError>;
}

/// `scheme://host[:port]/` of `url`, or [`FALLBACK_REFERER`] if it has none.
pub fn referer_for(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) if parsed.has_host() => {
            let mut origin = parsed.origin().ascii_serialization();
            origin.push('/');
            origin
        }
        _ => FALLBACK_REFERER.to_string(),
    }
}

/// Attach the format's own headers and a referer derived from its url.
///
/// A format header named `Referer` wins over the derived one.
pub(crate) fn apply_format_headers(mut request: RequestBuilder, format: &Format) -> RequestBuilder {
    let has_referer = format
        .http_headers()
        .keys()
        .any(|name| name.eq_ignore_ascii_case(REFERER.as_str()));
    if !has_referer {
        request = request.header(REFERER, referer_for(format.url()));
    }
    for (name, value) in format.http_headers() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => request = request.header(name, value),
            _ => warn!(header = %name, "Skipping malformed format header"),
        }
    }
    request
}

/// Fail with a filesystem error carrying `path`.
pub(crate) fn fs_err(path: &Path) -> impl FnOnce(std::io::Error) -> DownloadError + '_ {
    move |source| DownloadError::filesystem(path, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://cdn.example.com/v/a.mp4?sig=1", "https://cdn.example.com/")]
    #[case("http://127.0.0.1:8080/a.mp4", "http://127.0.0.1:8080/")]
    #[case("not a url", FALLBACK_REFERER)]
    #[case("data:video/mp4;base64,AAAA", FALLBACK_REFERER)]
    fn derives_referer(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(referer_for(url), expected);
    }
}
