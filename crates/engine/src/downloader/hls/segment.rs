use std::path::{Path, PathBuf};

use url::Url;

/// Name of the file holding fragment `index`.
pub fn fragment_name(index: usize, ext: &str) -> String {
    format!("segment_{index:06}.{ext}")
}

/// Fragment extension guessed from the segment url: `m4s`, `mp4` or `ts`.
pub fn fragment_ext(url: &Url) -> &'static str {
    let path = url.path().to_ascii_lowercase();
    if path.ends_with(".m4s") {
        "m4s"
    } else if path.ends_with(".mp4") {
        "mp4"
    } else {
        "ts"
    }
}

/// Inclusive-start byte window inside a larger resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSpan {
    pub start: u64,
    pub length: u64,
}

impl ByteSpan {
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    pub fn end_exclusive(&self) -> u64 {
        self.start + self.length
    }

    /// Value of the `Range` header selecting this span.
    pub fn range_header(&self) -> String {
        format!(
            "bytes={}-{}",
            self.start,
            self.end_exclusive().saturating_sub(1)
        )
    }
}

/// One fragment of a segmented stream.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Position in playlist order, starting at 0
    pub index: usize,
    pub url: Url,
    /// Final location of the fragment file
    pub path: PathBuf,
    pub byte_range: Option<ByteSpan>,
    pub completed: bool,
}

impl Segment {
    pub fn new(index: usize, url: Url, path: PathBuf, byte_range: Option<ByteSpan>) -> Self {
        Self {
            index,
            url,
            path,
            byte_range,
            completed: false,
        }
    }

    /// Mark the segment completed if its file exists and is non-empty.
    /// Returns the file size in that case.
    pub async fn check_on_disk(&mut self) -> Option<u64> {
        let size = existing_size(&self.path).await;
        self.completed = size.is_some();
        size
    }
}

/// Where a fragment is written before being renamed into place, so an
/// interrupted write never looks complete.
pub(crate) fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Size of a non-empty regular file at `path`.
pub(crate) async fn existing_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Some(meta.len()),
        _ => None,
    }
}
