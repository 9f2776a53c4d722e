use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::DownloadError;
use crate::proxy::ProxyConfig;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

pub const DEFAULT_OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Options shared by every downloader
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Whole-file attempt ceiling for single stream downloads
    pub retries: u32,

    /// Attempt ceiling for each HLS fragment
    pub fragment_retries: u32,

    /// Unit of the linear backoff: attempt `n` waits `n * retry_base_delay`
    pub retry_base_delay: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Read timeout (maximum time between receiving data chunks)
    pub read_timeout: Duration,

    /// Byte-rate ceiling in bytes per second, `None` for unlimited
    pub rate_limit: Option<u64>,

    /// Size of the chunks written to disk. Cancellation and rate limiting
    /// are applied per chunk.
    pub chunk_size: usize,

    /// User agent string
    pub user_agent: String,

    /// Custom HTTP headers for requests
    pub headers: HeaderMap,

    /// Proxy configuration (optional)
    pub proxy: Option<ProxyConfig>,

    /// Whether to use system proxy settings if available
    pub use_system_proxy: bool,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// Output path template, see [`crate::output::render_template`]
    pub output_template: String,

    /// Directory receiving the final files
    pub output_dir: PathBuf,

    /// Where HLS fragment directories are kept. Defaults to the output directory.
    pub cache_dir: Option<PathBuf>,

    /// Keep processing the remaining urls when one fails
    pub ignore_errors: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            fragment_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            rate_limit: None,
            chunk_size: 8192,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: DownloaderConfig::get_default_headers(),
            proxy: None,
            use_system_proxy: true,
            follow_redirects: true,
            output_template: DEFAULT_OUTPUT_TEMPLATE.to_owned(),
            output_dir: PathBuf::from("."),
            cache_dir: None,
            ignore_errors: false,
        }
    }
}

impl DownloaderConfig {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_fragment_retries(mut self, retries: u32) -> Self {
        self.fragment_retries = retries.max(1);
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_rate_limit(mut self, bytes_per_second: Option<u64>) -> Self {
        self.rate_limit = bytes_per_second.filter(|rate| *rate > 0);
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_output_template(mut self, template: impl Into<String>) -> Self {
        self.output_template = template.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    /// Merge custom headers over the current ones. Custom values win.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Parse `Name: value` lines and merge them as custom headers.
    pub fn with_header_lines<I, S>(self, lines: I) -> Result<Self, DownloadError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let headers = parse_header_lines(lines)?;
        Ok(self.with_headers(headers))
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate"),
        );

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

        default_headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        default_headers
    }
}

/// Parse a rate limit such as `500k`, `2M` or `1048576` into bytes per second.
///
/// Suffixes are binary (`k` = 1024). An empty string means unlimited.
pub fn parse_rate_limit(input: &str) -> Result<Option<u64>, DownloadError> {
    let trimmed = input.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let (digits, multiplier) = match trimmed.chars().last() {
        Some('k') => (&trimmed[..trimmed.len() - 1], 1024),
        Some('m') => (&trimmed[..trimmed.len() - 1], 1024 * 1024),
        Some('g') => (&trimmed[..trimmed.len() - 1], 1024 * 1024 * 1024),
        _ => (trimmed.as_str(), 1),
    };

    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| DownloadError::configuration(format!("invalid rate limit `{input}`")))?;

    let bytes = value
        .checked_mul(multiplier)
        .ok_or_else(|| DownloadError::configuration(format!("rate limit `{input}` overflows")))?;

    Ok((bytes > 0).then_some(bytes))
}

/// Parse `Name: value` lines into a header map.
pub fn parse_header_lines<I, S>(lines: I) -> Result<HeaderMap, DownloadError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut headers = HeaderMap::new();
    for line in lines {
        let line = line.as_ref();
        let Some((name, value)) = line.split_once(':') else {
            return Err(DownloadError::configuration(format!(
                "header `{line}` is not in `Name: value` form"
            )));
        };
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| DownloadError::configuration(format!("invalid header name: {e}")))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|e| DownloadError::configuration(format!("invalid header value: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}
