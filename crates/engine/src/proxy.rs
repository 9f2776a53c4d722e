use reqwest::Proxy;

use crate::error::DownloadError;

/// Proxy configuration types
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ProxyType {
    Http,
    Https,
    Socks5,
}

#[derive(Debug, Clone)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy server URL (e.g., "http://proxy.example.com:8080")
    pub url: String,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

impl ProxyConfig {
    /// Build a config from a proxy url, taking the type from its scheme and
    /// credentials from its userinfo part.
    pub fn from_url(input: &str) -> Result<Self, DownloadError> {
        let parsed = url::Url::parse(input)
            .map_err(|e| DownloadError::invalid_url(input, e.to_string()))?;

        let proxy_type = match parsed.scheme() {
            "http" => ProxyType::Http,
            "https" => ProxyType::Https,
            "socks5" | "socks5h" => ProxyType::Socks5,
            other => {
                return Err(DownloadError::ProxyConfiguration {
                    reason: format!("unsupported proxy scheme `{other}`"),
                });
            }
        };

        let auth = (!parsed.username().is_empty()).then(|| ProxyAuth {
            username: parsed.username().to_string(),
            password: parsed.password().unwrap_or_default().to_string(),
        });

        let mut url = parsed.clone();
        // Credentials travel through basic auth, not the url.
        let _ = url.set_username("");
        let _ = url.set_password(None);

        Ok(Self {
            url: url.to_string(),
            proxy_type,
            auth,
        })
    }
}

/// Build a reqwest Proxy object from our proxy configuration
pub fn build_proxy_from_config(config: &ProxyConfig) -> Result<Proxy, DownloadError> {
    let proxy_url = &config.url;
    let invalid = |kind: &str, e: reqwest::Error| DownloadError::ProxyConfiguration {
        reason: format!("Invalid {kind} proxy URL: {e}"),
    };

    let mut proxy = match config.proxy_type {
        ProxyType::Http => Proxy::http(proxy_url).map_err(|e| invalid("HTTP", e))?,
        ProxyType::Https => Proxy::https(proxy_url).map_err(|e| invalid("HTTPS", e))?,
        ProxyType::Socks5 => {
            let url = if proxy_url.starts_with("socks5://") || proxy_url.starts_with("socks5h://") {
                proxy_url.to_string()
            } else {
                format!("socks5://{proxy_url}")
            };

            Proxy::all(&url).map_err(|e| invalid("SOCKS5", e))?
        }
    };

    if let Some(auth) = &config.auth {
        proxy = proxy.basic_auth(&auth.username, &auth.password);
    }

    Ok(proxy)
}
