//! Quality tier classification from raw url or label hints.

/// Tier used when no marker is present in the hint.
pub const DEFAULT_QUALITY: i32 = 720;

/// Ordered markers, evaluated top to bottom. Explicit resolutions must stay
/// ahead of the coarse `hd`/`sd` words.
const QUALITY_MARKERS: &[(&str, i32)] = &[
    ("720p", 720),
    ("480p", 480),
    ("360p", 360),
    ("240p", 240),
    ("hd", 720),
    ("sd", 480),
];

/// Classify a hint (usually a format url) into a quality tier.
///
/// Matching is a case-insensitive substring search and the first marker
/// found wins, so `"clip_480p_hd.mp4"` is 480.
pub fn classify_quality(hint: &str) -> i32 {
    let hint = hint.to_ascii_lowercase();
    QUALITY_MARKERS
        .iter()
        .find(|(marker, _)| hint.contains(marker))
        .map(|(_, quality)| *quality)
        .unwrap_or(DEFAULT_QUALITY)
}

/// Human readable label for a tier, e.g. `720p`.
pub fn resolution_label(quality: i32) -> String {
    format!("{quality}p")
}
