//! Progress reporting for downloads

use std::sync::Arc;

/// Progress callback for download operations
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Events emitted while a download is streamed to disk
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    DownloadStarted {
        url: String,
        total_size: Option<u64>,
    },
    /// Only emitted when the server announced the body size
    DownloadProgress {
        url: String,
        downloaded: u64,
        total: u64,
        percent: u8,
    },
    DownloadComplete {
        url: String,
        final_size: u64,
    },
}

/// Percent complete, or `None` when the total is unknown
///
/// An unknown or zero total never produces a number; the caller shows an
/// indeterminate state instead.
pub fn percent_complete(downloaded: u64, total: Option<u64>) -> Option<u8> {
    match total {
        Some(total) if total > 0 => {
            let percent = downloaded.min(total).saturating_mul(100) / total;
            Some(percent as u8)
        }
        _ => None,
    }
}
