use std::sync::Arc;

use reqwest::Client;

use super::fetch::{HttpPageFetcher, PageFetcher};
use super::platforms::{Dailymotion, M3u8Extractor};
use super::registry::ExtractorRegistry;

/// Registry with every bundled extractor, most specific first. The generic
/// playlist extractor goes last since it accepts any `.m3u8` url.
pub fn default_registry(fetcher: Arc<dyn PageFetcher>) -> ExtractorRegistry {
    let mut registry = ExtractorRegistry::new();
    registry
        .register(Arc::new(Dailymotion::new(fetcher)))
        .register(Arc::new(M3u8Extractor::new()));
    registry
}

/// [`default_registry`] fetching pages with `client`.
pub fn default_registry_with_client(client: Client) -> ExtractorRegistry {
    default_registry(Arc::new(HttpPageFetcher::new(client)))
}
