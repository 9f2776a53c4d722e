pub mod error;
pub mod fetch;
pub mod info_extractor;
pub mod platforms;
pub mod registry;
pub mod utils;
mod default;

pub use default::{default_registry, default_registry_with_client};
pub use error::ExtractorError;
pub use fetch::{HttpPageFetcher, PageFetcher};
pub use info_extractor::InfoExtractor;
pub use registry::ExtractorRegistry;
pub use utils::UrlPattern;
