use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::downloader::fs_err;
use crate::error::DownloadError;

/// Container family of the fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// Fragmented MP4 (CMAF)
    Fmp4,
    /// MPEG transport stream
    Ts,
}

impl Container {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fmp4 => "fmp4",
            Self::Ts => "ts",
        }
    }

    /// File extension of a merged download in this container.
    pub fn ext(&self) -> &'static str {
        match self {
            Self::Fmp4 => "mp4",
            Self::Ts => "ts",
        }
    }
}

const MP4_BOX_TYPES: [&[u8; 4]; 5] = [b"ftyp", b"styp", b"moof", b"mdat", b"sidx"];

/// Classify a fragment from its first 8 bytes: a recognized ISO-BMFF box
/// type at offset 4 means fMP4, anything else is treated as TS.
pub fn sniff_container(head: &[u8]) -> Container {
    match head.get(4..8) {
        Some(box_type) if MP4_BOX_TYPES.iter().any(|t| t.as_slice() == box_type) => {
            Container::Fmp4
        }
        _ => Container::Ts,
    }
}

/// Read the first bytes of `path` and classify them.
pub async fn sniff_file(path: &Path) -> Result<Container, DownloadError> {
    let mut file = File::open(path).await.map_err(fs_err(path))?;
    let mut head = [0u8; 8];
    let mut filled = 0;
    while filled < head.len() {
        let n = file
            .read(&mut head[filled..])
            .await
            .map_err(fs_err(path))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(sniff_container(&head[..filled]))
}

/// Concatenate `init` (if any) and `fragments` in order into `output`.
///
/// Returns the number of bytes written.
pub async fn merge_fragments(
    init: Option<&Path>,
    fragments: &[PathBuf],
    output: &Path,
) -> Result<u64, DownloadError> {
    let mut out = File::create(output).await.map_err(fs_err(output))?;
    let mut written = 0u64;

    for path in init.into_iter().chain(fragments.iter().map(PathBuf::as_path)) {
        let mut input = File::open(path).await.map_err(fs_err(path))?;
        written += tokio::io::copy(&mut input, &mut out)
            .await
            .map_err(fs_err(output))?;
    }

    out.flush().await.map_err(fs_err(output))?;
    debug!(
        fragments = fragments.len(),
        init = init.is_some(),
        bytes = written,
        path = %output.display(),
        "Fragments merged"
    );
    Ok(written)
}
