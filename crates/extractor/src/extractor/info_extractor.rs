use async_trait::async_trait;
use tracing::debug;

use super::error::ExtractorError;
use super::utils::UrlPattern;
use crate::media::MediaInfo;

/// Maps a source url to resolved metadata and its formats.
///
/// Implementors provide the url pattern, id extraction and the resolve step;
/// `suitable` and `extract` are shared so every extractor matches urls and
/// reports failures the same way.
#[async_trait]
pub trait InfoExtractor: Send + Sync {
    /// Short identifier used in logs and errors, e.g. `m3u8`.
    fn name(&self) -> &'static str;

    fn url_pattern(&self) -> &UrlPattern;

    /// Whether `url` matches this extractor's pattern in full.
    fn suitable(&self, url: &str) -> bool {
        self.url_pattern().matches(url)
    }

    /// Id embedded in the url, if any. By default the first capture group.
    fn extract_id(&self, url: &str) -> Option<String> {
        self.url_pattern()
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Produce metadata for `url`. `id` is whatever [`Self::extract_id`] found;
    /// implementations derive one themselves when it is `None`.
    async fn resolve(&self, url: &str, id: Option<String>) -> Result<MediaInfo, ExtractorError>;

    /// Extract metadata, wrapping any failure as an extraction error.
    async fn extract(&self, url: &str) -> Result<MediaInfo, ExtractorError> {
        let id = self.extract_id(url);
        debug!(extractor = self.name(), url, ?id, "Resolving media info");
        self.resolve(url, id)
            .await
            .map_err(|e| ExtractorError::wrap(self.name(), e))
    }
}
