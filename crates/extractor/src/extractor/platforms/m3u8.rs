use std::sync::LazyLock;

use async_trait::async_trait;

use crate::extractor::error::ExtractorError;
use crate::extractor::info_extractor::InfoExtractor;
use crate::extractor::utils::{UrlPattern, url_hash_id};
use crate::media::{Format, MediaInfo, Protocol};

pub static URL_REGEX: LazyLock<UrlPattern> =
    LazyLock::new(|| UrlPattern::new(r"(?i).*\.m3u8.*").unwrap());

const TITLE: &str = "M3U8 Stream";

/// Catch-all for direct playlist urls.
///
/// Resolution is offline: the playlist itself is only fetched by the HLS
/// downloader, which also handles master playlists.
#[derive(Debug, Default, Clone, Copy)]
pub struct M3u8Extractor;

impl M3u8Extractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InfoExtractor for M3u8Extractor {
    fn name(&self) -> &'static str {
        "m3u8"
    }

    fn url_pattern(&self) -> &UrlPattern {
        &URL_REGEX
    }

    fn extract_id(&self, url: &str) -> Option<String> {
        Some(url_hash_id(url))
    }

    async fn resolve(&self, url: &str, id: Option<String>) -> Result<MediaInfo, ExtractorError> {
        let id = id.unwrap_or_else(|| url_hash_id(url));

        let format = Format::builder(url)
            .format_id("hls")
            .protocol(Protocol::Hls)
            .ext("m3u8")
            .codecs("unknown", "unknown")
            .preference(0)
            .build();

        Ok(MediaInfo::builder(id, TITLE)
            .webpage_url(url)
            .format(format)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_playlist_urls_only() {
        let extractor = M3u8Extractor::new();
        assert!(extractor.suitable("https://cdn.example.com/live/index.m3u8"));
        assert!(extractor.suitable("https://cdn.example.com/Master.M3U8?token=abc"));
        assert!(!extractor.suitable("https://cdn.example.com/video.mp4"));
    }

    #[tokio::test]
    async fn extract_builds_single_hls_format() {
        let url = "https://cdn.example.com/live/index.m3u8";
        let info = M3u8Extractor::new().extract(url).await.unwrap();

        assert_eq!(info.id, url_hash_id(url));
        assert_eq!(info.title, TITLE);
        assert_eq!(info.formats.len(), 1);

        let format = &info.formats[0];
        assert_eq!(format.format_id(), "hls");
        assert_eq!(format.protocol(), Protocol::Hls);
        assert_eq!(format.ext(), "m3u8");
        assert_eq!(format.url(), url);
        assert_eq!(format.preference(), 0);
    }
}
