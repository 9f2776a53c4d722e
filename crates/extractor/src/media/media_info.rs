use serde::{Deserialize, Serialize};

use super::format::Format;

/// Resolved metadata for one source url.
///
/// `formats` keeps discovery order; ranking is done separately by
/// [`crate::media::select_best`].
///
/// # Examples
///
/// ```rust
/// use vidfetch_extractor::media::{Format, MediaInfo};
///
/// let info = MediaInfo::builder("x1abc", "Sample clip")
///     .duration(42)
///     .uploader("someone")
///     .format(Format::builder("https://cdn.example.com/x1abc_720p.mp4").build())
///     .build();
///
/// assert_eq!(info.formats.len(), 1);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    /// Duration in seconds.
    pub duration: Option<u64>,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
    pub thumbnail: Option<String>,
    /// Page url the metadata was resolved from.
    pub webpage_url: Option<String>,
    pub formats: Vec<Format>,
}

#[derive(Debug, Clone)]
pub struct MediaInfoBuilder {
    info: MediaInfo,
}

impl MediaInfo {
    pub fn builder(id: impl Into<String>, title: impl Into<String>) -> MediaInfoBuilder {
        MediaInfoBuilder {
            info: MediaInfo {
                id: id.into(),
                title: title.into(),
                description: None,
                duration: None,
                uploader: None,
                view_count: None,
                thumbnail: None,
                webpage_url: None,
                formats: Vec::new(),
            },
        }
    }

    pub fn has_formats(&self) -> bool {
        !self.formats.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl MediaInfoBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.info.description = Some(description.into());
        self
    }

    pub fn duration(mut self, seconds: u64) -> Self {
        self.info.duration = Some(seconds);
        self
    }

    pub fn uploader(mut self, uploader: impl Into<String>) -> Self {
        self.info.uploader = Some(uploader.into());
        self
    }

    pub fn view_count(mut self, view_count: u64) -> Self {
        self.info.view_count = Some(view_count);
        self
    }

    pub fn thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.info.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn webpage_url(mut self, url: impl Into<String>) -> Self {
        self.info.webpage_url = Some(url.into());
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.info.formats.push(format);
        self
    }

    pub fn formats(mut self, formats: Vec<Format>) -> Self {
        self.info.formats.extend(formats);
        self
    }

    pub fn build(self) -> MediaInfo {
        self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_keeps_format_order() {
        let info = MediaInfo::builder("id1", "Title")
            .format(Format::builder("https://a.example.com/1_240p.mp4").build())
            .format(Format::builder("https://a.example.com/1_720p.mp4").build())
            .build();

        let parsed = MediaInfo::from_json(&info.to_json().unwrap()).unwrap();
        assert_eq!(parsed, info);
        assert_eq!(parsed.formats[0].quality(), 240);
        assert_eq!(parsed.formats[1].quality(), 720);
    }
}
