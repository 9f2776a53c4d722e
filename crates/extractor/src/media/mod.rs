pub mod format;
pub mod media_info;
pub mod quality;
pub mod selection;

pub use format::{Format, FormatBuilder, Protocol, detect_ext};
pub use media_info::{MediaInfo, MediaInfoBuilder};
pub use quality::{DEFAULT_QUALITY, classify_quality};
pub use selection::{select_best, select_by_id, select_worst, sort_formats};
