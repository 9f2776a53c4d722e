#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;
use url::Url;
use vidfetch_engine::extractor::{
    ExtractorError, ExtractorRegistry, Format, InfoExtractor, MediaInfo, UrlPattern,
};
use vidfetch_engine::{
    DownloadEngine, Downloader, DownloaderConfig, HlsDownloader, HttpDownloader, create_client,
};

pub struct TestServer {
    base_url: Url,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn new(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let server = axum::serve(listener, router).with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        });

        tokio::spawn(async move {
            server.await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(100)).await;

        Self {
            base_url: Url::parse(&format!("http://{addr}")).unwrap(),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> Url {
        self.base_url.join(path).unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

/// Page url every test submits.
pub const PAGE_URL: &str = "https://clips.test/watch/1";

/// Resolves any `clips.test` page to a single format served by a [`TestServer`].
pub struct ServedExtractor {
    pattern: UrlPattern,
    media_url: String,
}

impl ServedExtractor {
    pub fn new(media_url: &Url) -> Self {
        Self {
            pattern: UrlPattern::new(r"^https://clips\.test/watch/(?P<id>\d+)$").unwrap(),
            media_url: media_url.to_string(),
        }
    }
}

#[async_trait]
impl InfoExtractor for ServedExtractor {
    fn name(&self) -> &'static str {
        "served"
    }

    fn url_pattern(&self) -> &UrlPattern {
        &self.pattern
    }

    async fn resolve(&self, url: &str, id: Option<String>) -> Result<MediaInfo, ExtractorError> {
        let id = id.unwrap_or_else(|| "1".to_string());
        let format = Format::builder(self.media_url.as_str())
            .format_id("main")
            .build();
        Ok(MediaInfo::builder(id, "Test Clip")
            .webpage_url(url)
            .format(format)
            .build())
    }
}

/// Engine with the real downloaders, resolving [`PAGE_URL`] to `media_url`.
pub fn engine_for(media_url: &Url, config: DownloaderConfig) -> DownloadEngine {
    let client = create_client(&config).unwrap();
    let registry = ExtractorRegistry::new().with(Arc::new(ServedExtractor::new(media_url)));
    let downloaders: Vec<Arc<dyn Downloader>> = vec![
        Arc::new(HlsDownloader::new(client.clone(), config.clone())),
        Arc::new(HttpDownloader::new(client, config.clone())),
    ];
    DownloadEngine::new(config, registry, downloaders)
}

/// Fast retries, no environment proxy, output into `dir`.
pub fn test_config(dir: &Path) -> DownloaderConfig {
    let mut config = DownloaderConfig::default()
        .with_output_dir(dir)
        .with_retry_base_delay(Duration::from_millis(10));
    config.use_system_proxy = false;
    config
}
