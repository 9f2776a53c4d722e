use std::path::Path;

use m3u8_rs::{MasterPlaylist, MediaPlaylist, Playlist, VariantStream};
use url::Url;

use super::segment::{ByteSpan, Segment, fragment_ext, fragment_name};
use crate::error::DownloadError;

/// Parse an HLS playlist from a string
pub fn parse_playlist(content: &str) -> Result<Playlist, DownloadError> {
    let (_, playlist) = m3u8_rs::parse_playlist(content.trim().as_bytes())
        .map_err(|e| DownloadError::playlist(format!("unparsable playlist: {e}")))?;
    Ok(playlist)
}

/// Resolve a playlist entry against the playlist's own url.
pub fn resolve_uri(base: &Url, uri: &str) -> Result<Url, DownloadError> {
    base.join(uri.trim())
        .map_err(|e| DownloadError::invalid_url(uri, e.to_string()))
}

/// Highest-bandwidth variant, ignoring I-frame-only streams.
/// The first one wins a bandwidth tie.
pub fn select_variant(master: &MasterPlaylist) -> Option<&VariantStream> {
    master
        .variants
        .iter()
        .filter(|variant| !variant.is_i_frame)
        .fold(None, |best: Option<&VariantStream>, variant| match best {
            Some(current) if current.bandwidth >= variant.bandwidth => Some(current),
            _ => Some(variant),
        })
}

/// Ordered fragments of one media playlist plus its initialization section.
#[derive(Debug, Clone)]
pub struct SegmentPlan {
    pub segments: Vec<Segment>,
    pub init: Option<InitSection>,
    /// Sum of byte-range lengths when every segment declares one.
    pub estimated_bytes: Option<u64>,
}

/// `EXT-X-MAP` target, fetched once and written ahead of the fragments.
#[derive(Debug, Clone)]
pub struct InitSection {
    pub url: Url,
    pub byte_range: Option<ByteSpan>,
}

impl SegmentPlan {
    pub fn build(
        playlist_url: &Url,
        media: &MediaPlaylist,
        fragment_dir: &Path,
    ) -> Result<Self, DownloadError> {
        if media.segments.is_empty() {
            return Err(DownloadError::playlist("media playlist has no segments"));
        }

        let mut segments = Vec::with_capacity(media.segments.len());
        let mut init = None;
        let mut previous_end: Option<(String, u64)> = None;
        let mut estimated: Option<u64> = Some(0);

        for (index, entry) in media.segments.iter().enumerate() {
            let url = resolve_uri(playlist_url, &entry.uri)?;

            if init.is_none()
                && let Some(map) = &entry.map
            {
                init = Some(InitSection {
                    url: resolve_uri(playlist_url, &map.uri)?,
                    byte_range: map
                        .byte_range
                        .as_ref()
                        .map(|range| ByteSpan::new(range.offset.unwrap_or(0), range.length)),
                });
            }

            // A range without offset continues where the previous range of the
            // same resource ended.
            let byte_range = entry.byte_range.as_ref().map(|range| {
                let start = range.offset.unwrap_or_else(|| match &previous_end {
                    Some((uri, end)) if *uri == entry.uri => *end,
                    _ => 0,
                });
                ByteSpan::new(start, range.length)
            });
            previous_end = byte_range.map(|span| (entry.uri.clone(), span.end_exclusive()));

            estimated = match (estimated, byte_range) {
                (Some(sum), Some(span)) => Some(sum + span.length),
                _ => None,
            };

            let path = fragment_dir.join(fragment_name(index, fragment_ext(&url)));
            segments.push(Segment::new(index, url, path, byte_range));
        }

        Ok(Self {
            segments,
            init,
            estimated_bytes: estimated.filter(|bytes| *bytes > 0),
        })
    }
}
