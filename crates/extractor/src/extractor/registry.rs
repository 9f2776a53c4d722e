use std::sync::Arc;

use tracing::debug;

use super::error::ExtractorError;
use super::info_extractor::InfoExtractor;
use crate::media::MediaInfo;

/// Ordered list of extractors.
///
/// Lookup is first-match in registration order, not best-match: when two
/// patterns overlap, register the more specific one first.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn InfoExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an extractor. Later registrations only see urls no earlier
    /// extractor accepted.
    pub fn register(&mut self, extractor: Arc<dyn InfoExtractor>) -> &mut Self {
        debug!(extractor = extractor.name(), "Registered extractor");
        self.extractors.push(extractor);
        self
    }

    pub fn with(mut self, extractor: Arc<dyn InfoExtractor>) -> Self {
        self.register(extractor);
        self
    }

    /// First extractor whose pattern accepts `url`.
    pub fn resolve(&self, url: &str) -> Option<Arc<dyn InfoExtractor>> {
        self.extractors
            .iter()
            .find(|extractor| extractor.suitable(url))
            .cloned()
    }

    /// Resolve and run the extractor for `url`.
    pub async fn extract(&self, url: &str) -> Result<MediaInfo, ExtractorError> {
        let extractor = self
            .resolve(url)
            .ok_or_else(|| ExtractorError::UnsupportedExtractor(url.to_string()))?;
        debug!(extractor = extractor.name(), url, "Selected extractor");
        extractor.extract(url).await
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("extractors", &self.names())
            .finish()
    }
}
