//! Webpage fetch primitive used by extractors.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;
use tracing::debug;

use super::error::ExtractorError;

/// Fetch a page body. Extractors depend on this trait rather than on a
/// concrete client so they can be driven from canned responses.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<String, ExtractorError>;
}

/// [`PageFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<String, ExtractorError> {
        let response = self.client.get(url).headers(headers.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractorError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        debug!(url, len = body.len(), "Fetched page");
        Ok(body)
    }
}
