pub mod dailymotion;
pub mod m3u8;

pub use dailymotion::Dailymotion;
pub use m3u8::M3u8Extractor;
