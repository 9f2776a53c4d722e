use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::extractor::error::ExtractorError;
use crate::extractor::fetch::PageFetcher;
use crate::extractor::info_extractor::InfoExtractor;
use crate::extractor::utils::{UrlPattern, og_property, search_all, search_regex, unescape_url};
use crate::media::{Format, MediaInfo, Protocol};

pub static URL_REGEX: LazyLock<UrlPattern> = LazyLock::new(|| {
    UrlPattern::new(
        r"(?:https?://)?(?:www\.)?dailymotion\.com/(?:video|embed/video|embed)/([a-zA-Z0-9]+)(?:[/?#].*)?",
    )
    .unwrap()
});

static TITLE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<title>([^<]+)</title>").unwrap());

static TITLE_SUFFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[-|]\s*(?:video\s+)?Dailymotion.*$").unwrap());

// Ordered from most to least specific.
static PAGE_VIDEO_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#""video_url":"([^"]+)""#,
        r#""url":"([^"]+\.mp4[^"]*)""#,
        r#"src="([^"]+\.mp4[^"]*)""#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

#[derive(Debug, Deserialize)]
struct Metadata {
    title: Option<String>,
    description: Option<String>,
    duration: Option<u64>,
    owner: Option<Owner>,
    thumbnail_url: Option<String>,
    views_total: Option<u64>,
    /// Entries in document order, which is the discovery order of the formats.
    #[serde(default, deserialize_with = "ordered_qualities")]
    qualities: Vec<(String, Vec<QualitySource>)>,
    error: Option<ApiError>,
}

fn ordered_qualities<'de, D>(deserializer: D) -> Result<Vec<(String, Vec<QualitySource>)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Entries;

    impl<'de> Visitor<'de> for Entries {
        type Value = Vec<(String, Vec<QualitySource>)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of quality labels to sources")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(Entries)
}

#[derive(Debug, Deserialize)]
struct Owner {
    screenname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QualitySource {
    #[serde(rename = "type", default)]
    mime: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    title: Option<String>,
    message: Option<String>,
}

pub struct Dailymotion {
    fetcher: Arc<dyn PageFetcher>,
    headers: HeaderMap,
}

impl Dailymotion {
    const BASE_URL: &'static str = "https://www.dailymotion.com";
    const METADATA_URL: &'static str = "https://www.dailymotion.com/player/metadata/video";

    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::REFERER,
            HeaderValue::from_static("https://www.dailymotion.com/"),
        );
        headers.insert(
            reqwest::header::ORIGIN,
            HeaderValue::from_static(Self::BASE_URL),
        );
        Self { fetcher, headers }
    }

    /// Structured path: the player metadata document.
    pub(crate) fn parse_metadata(id: &str, body: &str) -> Result<MediaInfo, ExtractorError> {
        let metadata: Metadata = serde_json::from_str(body)?;

        if let Some(error) = metadata.error {
            let reason = error
                .message
                .or(error.title)
                .unwrap_or_else(|| "metadata error".to_string());
            return Err(ExtractorError::Other(reason));
        }

        let formats = metadata
            .qualities
            .iter()
            .flat_map(|(key, sources)| sources.iter().map(move |s| Self::quality_format(key, s)))
            .collect::<Vec<_>>();

        let mut builder = MediaInfo::builder(
            id,
            metadata
                .title
                .unwrap_or_else(|| format!("Dailymotion Video {id}")),
        )
        .webpage_url(format!("{}/video/{id}", Self::BASE_URL))
        .formats(formats);

        if let Some(description) = metadata.description {
            builder = builder.description(description);
        }
        if let Some(duration) = metadata.duration {
            builder = builder.duration(duration);
        }
        if let Some(uploader) = metadata.owner.and_then(|o| o.screenname) {
            builder = builder.uploader(uploader);
        }
        if let Some(thumbnail) = metadata.thumbnail_url {
            builder = builder.thumbnail(thumbnail);
        }
        if let Some(views) = metadata.views_total {
            builder = builder.view_count(views);
        }

        Ok(builder.build())
    }

    fn quality_format(key: &str, source: &QualitySource) -> Format {
        let url = unescape_url(&source.url);
        let is_hls = source.mime.eq_ignore_ascii_case("application/x-mpegURL")
            || url.to_ascii_lowercase().contains(".m3u8");

        let mut builder = Format::builder(url)
            .format_id(format!("{}-{key}", if is_hls { "hls" } else { "http" }))
            .header("Referer", format!("{}/", Self::BASE_URL))
            .preference(1);

        builder = if is_hls {
            builder.protocol(Protocol::Hls).ext("m3u8")
        } else {
            builder.ext("mp4")
        };

        // "auto" and other labels keep the tier classified from the url.
        if let Ok(quality) = key.parse::<i32>() {
            builder = builder.quality(quality);
        }

        builder.build()
    }

    /// Fallback path: a regex sweep over the watch page. Fields already known
    /// from `base` are kept; only the formats come from the sweep.
    pub(crate) fn sweep_page(id: &str, page: &str, base: Option<MediaInfo>) -> MediaInfo {
        let mut seen = HashSet::new();
        let formats = PAGE_VIDEO_REGEXES
            .iter()
            .flat_map(|regex| search_all(page, regex))
            .map(|url| unescape_url(&url))
            .filter(|url| seen.insert(url.clone()))
            .enumerate()
            .map(|(index, url)| {
                Format::builder(url)
                    .format_id(format!("page-{index}"))
                    .preference(1)
                    .build()
            })
            .collect::<Vec<_>>();

        let mut info = match base {
            Some(base) => base,
            None => {
                let title = search_regex(page, &TITLE_REGEX)
                    .map(|t| TITLE_SUFFIX_REGEX.replace(t.trim(), "").into_owned())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| format!("Dailymotion Video {id}"));

                let mut builder = MediaInfo::builder(id, title)
                    .webpage_url(format!("{}/video/{id}", Self::BASE_URL));
                if let Some(thumbnail) = og_property(page, "og:image") {
                    builder = builder.thumbnail(thumbnail);
                }
                if let Some(description) = og_property(page, "og:description") {
                    builder = builder.description(description);
                }
                builder.build()
            }
        };

        info.formats = formats;
        info
    }
}

#[async_trait]
impl InfoExtractor for Dailymotion {
    fn name(&self) -> &'static str {
        "dailymotion"
    }

    fn url_pattern(&self) -> &UrlPattern {
        &URL_REGEX
    }

    async fn resolve(&self, url: &str, id: Option<String>) -> Result<MediaInfo, ExtractorError> {
        let id = id.ok_or_else(|| ExtractorError::InvalidUrl(url.to_string()))?;

        let metadata_url = format!("{}/{id}", Self::METADATA_URL);
        let structured = match self.fetcher.fetch(&metadata_url, &self.headers).await {
            Ok(body) => match Self::parse_metadata(&id, &body) {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!(id = %id, error = %e, "Failed to parse metadata");
                    None
                }
            },
            Err(e) => {
                warn!(id = %id, error = %e, "Metadata request failed");
                None
            }
        };

        let base = match structured {
            Some(info) if info.has_formats() => {
                debug!(id = %id, formats = info.formats.len(), "Resolved formats from metadata");
                return Ok(info);
            }
            other => other,
        };

        debug!(id = %id, "No structured formats, sweeping watch page");
        let page_url = format!("{}/video/{id}", Self::BASE_URL);
        let page = self.fetcher.fetch(&page_url, &self.headers).await?;

        let info = Self::sweep_page(&id, &page, base);
        if !info.has_formats() {
            return Err(ExtractorError::NoFormatsFound);
        }
        Ok(info)
    }
}
