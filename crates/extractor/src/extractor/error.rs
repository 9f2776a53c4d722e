use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("request to {url} failed with HTTP {status}")]
    HttpStatus { status: u16, url: String },
    #[error("no suitable extractor for {0}")]
    UnsupportedExtractor(String),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("no formats found")]
    NoFormatsFound,
    #[error("Failed to extract video info ({extractor}): {reason}")]
    Extraction {
        extractor: &'static str,
        reason: String,
    },
    #[error("other: {0}")]
    Other(String),
}

impl ExtractorError {
    /// Wrap any lower level failure as an extraction failure of `extractor`.
    ///
    /// Already wrapped errors and registry misses pass through unchanged.
    pub fn wrap(extractor: &'static str, err: ExtractorError) -> Self {
        match err {
            Self::Extraction { .. } | Self::UnsupportedExtractor(_) => err,
            other => Self::Extraction {
                extractor,
                reason: other.to_string(),
            },
        }
    }
}
