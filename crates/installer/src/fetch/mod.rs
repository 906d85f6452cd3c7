//! Remote asset fetcher
//!
//! Streams remote files to disk with progress reporting and performs
//! conditional text fetches using entity-tag validators. The fetcher never
//! retries on its own; callers decide whether a failure is worth another
//! attempt using [`FetchError::is_recoverable`].

pub mod checksum;
pub mod error;
pub mod progress;

pub use error::FetchError;
pub use progress::{ProgressCallback, ProgressEvent, percent_complete};

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::config::FetchConfig;

/// Outcome of a conditional text fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFetch {
    /// Body text; `None` when the server answered "not modified"
    pub content: Option<String>,
    /// Validator to send with the next request for the same URL
    pub validator: Option<String>,
    pub not_modified: bool,
}

/// HTTP client for mod archives and catalogue documents
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    chunk_size: usize,
}

impl Fetcher {
    /// Create a new fetcher from configuration
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| FetchError::Client { reason: e.to_string() })?;

        Ok(Self {
            client,
            chunk_size: config.chunk_size.max(4096),
        })
    }

    /// Download `url` into `dest_path`, returning the number of bytes written
    ///
    /// The body is streamed into a `.part` sibling and renamed into place once
    /// complete, so `dest_path` never holds a truncated file. After a failure
    /// the caller is responsible for removing [`partial_path`] before retrying.
    pub async fn download_to_file(
        &self,
        url: &str,
        dest_path: &Path,
        on_progress: Option<ProgressCallback>,
    ) -> Result<u64, FetchError> {
        debug!("Stream downloading: {} to {}", url, dest_path.display());

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::io(parent, e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))?;
        check_status(url, response.status())?;

        let total_size = response.content_length();
        debug!("Content length: {:?}", total_size);

        if let Some(ref callback) = on_progress {
            callback(ProgressEvent::DownloadStarted {
                url: url.to_string(),
                total_size,
            });
        }

        let temp_path = partial_path(dest_path);
        let file = fs::File::create(&temp_path)
            .await
            .map_err(|e| FetchError::io(&temp_path, e))?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);

        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;
        let mut last_percent = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::network(url, e))?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| FetchError::io(&temp_path, e))?;
            downloaded += chunk.len() as u64;

            // Report only on percent changes, and never without a known total
            let percent = percent_complete(downloaded, total_size);
            if percent.is_some() && percent != last_percent {
                last_percent = percent;
                if let (Some(callback), Some(total), Some(percent)) = (&on_progress, total_size, percent) {
                    callback(ProgressEvent::DownloadProgress {
                        url: url.to_string(),
                        downloaded,
                        total,
                        percent,
                    });
                }
            }
        }

        writer.flush().await.map_err(|e| FetchError::io(&temp_path, e))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(|e| FetchError::io(&temp_path, e))?;

        fs::rename(&temp_path, dest_path)
            .await
            .map_err(|e| FetchError::io(dest_path, e))?;

        if let Some(ref callback) = on_progress {
            callback(ProgressEvent::DownloadComplete {
                url: url.to_string(),
                final_size: downloaded,
            });
        }

        debug!("Stream download completed: {} bytes", downloaded);
        Ok(downloaded)
    }

    /// Fetch `url` as text, sending `validator` as `If-None-Match` when given
    ///
    /// A "not modified" answer returns no content; the caller falls back to
    /// its own last-known-good copy.
    pub async fn download_text(&self, url: &str, validator: Option<&str>) -> Result<TextFetch, FetchError> {
        let mut request = self.client.get(url);
        if let Some(validator) = validator {
            request = request.header(IF_NONE_MATCH, validator);
        }

        let response = request.send().await.map_err(|e| FetchError::network(url, e))?;

        if response.status() == StatusCode::NOT_MODIFIED {
            debug!("{} not modified since last fetch", url);
            return Ok(TextFetch {
                content: None,
                validator: validator.map(str::to_string),
                not_modified: true,
            });
        }
        check_status(url, response.status())?;

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content = response.text().await.map_err(|e| FetchError::network(url, e))?;

        Ok(TextFetch {
            content: Some(content),
            validator: etag,
            not_modified: false,
        })
    }
}

/// Path used for the in-flight body of a download to `dest_path`
pub fn partial_path(dest_path: &Path) -> PathBuf {
    let mut name = dest_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest_path.with_file_name(name)
}

/// File name a URL would be saved under, from its last path segment
pub fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() {
        None
    } else {
        Some(last.to_string())
    }
}

fn check_status(url: &str, status: StatusCode) -> Result<(), FetchError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited { url: url.to_string() }),
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(FetchError::NotFound { url: url.to_string() }),
        s => Err(FetchError::NetworkFailure {
            url: url.to_string(),
            status: Some(s.as_u16()),
            reason: format!("server answered {}", s),
            source: None,
        }),
    }
}
