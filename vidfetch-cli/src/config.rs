//! Settings file support.
//!
//! Every key is optional. Command-line flags take precedence over the file,
//! and the file over the engine defaults.
//!
//! ```toml
//! output_template = "%(title)s [%(id)s].%(ext)s"
//! output_dir = "~/Videos"
//! rate_limit = "2M"
//! retries = 5
//! headers = ["Referer: https://example.com/"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;
use vidfetch_engine::{DownloaderConfig, ProxyConfig, parse_rate_limit};

use crate::cli::Args;

const CONFIG_DIR_NAME: &str = "vidfetch";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub output_template: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub rate_limit: Option<String>,
    pub retries: Option<u32>,
    pub fragment_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    pub headers: Vec<String>,
    pub proxy: Option<String>,
    pub use_system_proxy: Option<bool>,
    pub ignore_errors: Option<bool>,
}

impl AppConfig {
    /// Default location of the settings file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load `path`, or the default file when `path` is `None`.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Merge file values and flags over the engine defaults.
    pub fn into_downloader_config(self, args: &Args) -> Result<DownloaderConfig> {
        let mut config = DownloaderConfig::default();

        if let Some(template) = args.output_template.clone().or(self.output_template) {
            config = config.with_output_template(template);
        }
        if let Some(dir) = args.output_dir.clone().or(self.output_dir) {
            config = config.with_output_dir(dir);
        }
        if let Some(dir) = args.cache_dir.clone().or(self.cache_dir) {
            config = config.with_cache_dir(dir);
        }
        if let Some(rate) = args.rate_limit.as_deref().or(self.rate_limit.as_deref()) {
            config = config.with_rate_limit(parse_rate_limit(rate)?);
        }
        if let Some(retries) = args.retries.or(self.retries) {
            config = config.with_retries(retries);
        }
        if let Some(retries) = args.fragment_retries.or(self.fragment_retries) {
            config = config.with_fragment_retries(retries);
        }
        if let Some(ms) = self.retry_delay_ms {
            config = config.with_retry_base_delay(Duration::from_millis(ms));
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.read_timeout_secs {
            config.read_timeout = Duration::from_secs(secs);
        }
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }

        // File headers first so flags win on a name clash.
        config = config
            .with_header_lines(&self.headers)?
            .with_header_lines(&args.headers)?;

        if let Some(url) = args.proxy.as_deref().or(self.proxy.as_deref()) {
            let mut proxy = ProxyConfig::from_url(url)?;
            if let Some(proxy_type) = args.proxy_type {
                proxy.proxy_type = proxy_type;
            }
            config = config.with_proxy(proxy);
        }
        config.use_system_proxy = !args.no_system_proxy && self.use_system_proxy.unwrap_or(true);

        let ignore_errors = args.ignore_errors || self.ignore_errors.unwrap_or(false);
        Ok(config.with_ignore_errors(ignore_errors))
    }
}
