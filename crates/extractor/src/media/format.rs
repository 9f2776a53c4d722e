use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::quality::{classify_quality, resolution_label};

/// Transport used to fetch a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    /// Segmented HTTP Live Streaming playlist.
    Hls,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Hls => "hls",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "hls" | "m3u8" | "m3u8_native" => Some(Self::Hls),
            _ => None,
        }
    }

    /// Infer the protocol from a url. Playlist urls are HLS regardless of scheme.
    pub fn from_url(url: &str) -> Self {
        let lower = url.to_ascii_lowercase();
        if lower.contains(".m3u8") {
            Self::Hls
        } else if lower.starts_with("http://") {
            Self::Http
        } else {
            Self::Https
        }
    }

    pub fn is_segmented(&self) -> bool {
        matches!(self, Self::Hls)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container extension guessed from a url, `mp4` when nothing matches.
pub fn detect_ext(url: &str) -> &'static str {
    let lower = url.to_ascii_lowercase();
    if lower.contains(".m3u8") {
        "m3u8"
    } else if lower.contains(".mp4") {
        "mp4"
    } else if lower.contains(".webm") {
        "webm"
    } else if lower.contains(".flv") {
        "flv"
    } else {
        "mp4"
    }
}

fn codecs_for_ext(ext: &str) -> (&'static str, &'static str) {
    match ext {
        "mp4" => ("h264", "aac"),
        "webm" => ("vp8", "vorbis"),
        _ => ("unknown", "unknown"),
    }
}

/// One concrete fetchable representation of a source.
///
/// Formats are produced once by an extractor and never modified afterwards,
/// so all fields are private and only readable through accessors. Use
/// [`Format::builder`] to construct one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Format {
    format_id: String,
    url: String,
    protocol: Protocol,
    ext: String,
    vcodec: String,
    acodec: String,
    quality: i32,
    resolution: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    tbr: Option<f64>,
    filesize: Option<u64>,
    #[serde(default)]
    http_headers: FxHashMap<String, String>,
    preference: i32,
}

impl Format {
    /// Start a builder with protocol, extension, codecs and quality inferred
    /// from `url`.
    pub fn builder(url: impl Into<String>) -> FormatBuilder {
        FormatBuilder::new(url)
    }

    pub fn format_id(&self) -> &str {
        &self.format_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    pub fn vcodec(&self) -> &str {
        &self.vcodec
    }

    pub fn acodec(&self) -> &str {
        &self.acodec
    }

    pub fn quality(&self) -> i32 {
        self.quality
    }

    pub fn resolution(&self) -> Option<&str> {
        self.resolution.as_deref()
    }

    pub fn width(&self) -> Option<u32> {
        self.width
    }

    pub fn height(&self) -> Option<u32> {
        self.height
    }

    /// Total bitrate in kbit/s, when known.
    pub fn tbr(&self) -> Option<f64> {
        self.tbr
    }

    pub fn filesize(&self) -> Option<u64> {
        self.filesize
    }

    pub fn http_headers(&self) -> &FxHashMap<String, String> {
        &self.http_headers
    }

    pub fn preference(&self) -> i32 {
        self.preference
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} {} ({})",
            self.format_id,
            self.ext,
            self.resolution.as_deref().unwrap_or("unknown"),
            self.protocol
        )
    }
}

#[derive(Debug, Clone)]
pub struct FormatBuilder {
    format: Format,
}

impl FormatBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let ext = detect_ext(&url);
        let (vcodec, acodec) = codecs_for_ext(ext);
        let quality = classify_quality(&url);

        Self {
            format: Format {
                format_id: "default".to_string(),
                protocol: Protocol::from_url(&url),
                ext: ext.to_string(),
                vcodec: vcodec.to_string(),
                acodec: acodec.to_string(),
                quality,
                resolution: Some(resolution_label(quality)),
                width: None,
                height: None,
                tbr: None,
                filesize: None,
                http_headers: FxHashMap::default(),
                preference: 0,
                url,
            },
        }
    }

    pub fn format_id(mut self, format_id: impl Into<String>) -> Self {
        self.format.format_id = format_id.into();
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.format.protocol = protocol;
        self
    }

    /// Override the extension. Codecs are re-derived from it.
    pub fn ext(mut self, ext: impl Into<String>) -> Self {
        let ext = ext.into();
        let (vcodec, acodec) = codecs_for_ext(&ext);
        self.format.vcodec = vcodec.to_string();
        self.format.acodec = acodec.to_string();
        self.format.ext = ext;
        self
    }

    pub fn codecs(mut self, vcodec: impl Into<String>, acodec: impl Into<String>) -> Self {
        self.format.vcodec = vcodec.into();
        self.format.acodec = acodec.into();
        self
    }

    /// Set the quality tier and its matching `NNNp` label.
    pub fn quality(mut self, quality: i32) -> Self {
        self.format.quality = quality;
        self.format.resolution = Some(resolution_label(quality));
        self
    }

    pub fn resolution(mut self, resolution: Option<String>) -> Self {
        self.format.resolution = resolution;
        self
    }

    pub fn dimensions(mut self, width: u32, height: u32) -> Self {
        self.format.width = Some(width);
        self.format.height = Some(height);
        self
    }

    pub fn tbr(mut self, tbr: f64) -> Self {
        self.format.tbr = Some(tbr);
        self
    }

    pub fn filesize(mut self, filesize: u64) -> Self {
        self.format.filesize = Some(filesize);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.format.http_headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: FxHashMap<String, String>) -> Self {
        self.format.http_headers.extend(headers);
        self
    }

    pub fn preference(mut self, preference: i32) -> Self {
        self.format.preference = preference;
        self
    }

    pub fn build(self) -> Format {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_infers_from_mp4_url() {
        let format = Format::builder("https://cdn.example.com/v/clip_480p.mp4?token=1").build();
        assert_eq!(format.protocol(), Protocol::Https);
        assert_eq!(format.ext(), "mp4");
        assert_eq!(format.vcodec(), "h264");
        assert_eq!(format.acodec(), "aac");
        assert_eq!(format.quality(), 480);
        assert_eq!(format.resolution(), Some("480p"));
    }

    #[test]
    fn builder_marks_playlists_as_hls() {
        let format = Format::builder("http://cdn.example.com/live/index.M3U8").build();
        assert_eq!(format.protocol(), Protocol::Hls);
        assert_eq!(format.ext(), "m3u8");
        assert_eq!(format.vcodec(), "unknown");
    }

    #[test]
    fn ext_override_rederives_codecs() {
        let format = Format::builder("https://cdn.example.com/file")
            .ext("webm")
            .build();
        assert_eq!(format.vcodec(), "vp8");
        assert_eq!(format.acodec(), "vorbis");
    }

    #[test]
    fn protocol_parse_accepts_aliases() {
        assert_eq!(Protocol::parse("HLS"), Some(Protocol::Hls));
        assert_eq!(Protocol::parse("m3u8_native"), Some(Protocol::Hls));
        assert_eq!(Protocol::parse("https"), Some(Protocol::Https));
        assert_eq!(Protocol::parse("rtmp"), None);
    }

    #[test]
    fn headers_are_kept() {
        let format = Format::builder("https://cdn.example.com/a.mp4")
            .header("Referer", "https://example.com/")
            .build();
        assert_eq!(
            format.http_headers().get("Referer").map(String::as_str),
            Some("https://example.com/")
        );
    }
}
