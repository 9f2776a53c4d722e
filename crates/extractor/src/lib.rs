//! Source url resolution: the extractor contract, an ordered extractor
//! registry and the format model extractors produce.

pub mod extractor;
pub mod media;

pub use extractor::{
    ExtractorError, ExtractorRegistry, InfoExtractor, PageFetcher, UrlPattern, default_registry,
};
pub use media::{Format, MediaInfo, Protocol};
