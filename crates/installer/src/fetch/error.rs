//! Error types for remote asset fetching

use std::path::PathBuf;
use thiserror::Error;

/// Failures while fetching a remote asset
///
/// Rate limiting is kept apart from generic network failures so callers can
/// fall back to cached data instead of failing hard.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to '{url}' failed: {reason}")]
    NetworkFailure {
        url: String,
        status: Option<u16>,
        reason: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request to '{url}' was rate limited by the server")]
    RateLimited { url: String },

    #[error("Nothing found at '{url}'")]
    NotFound { url: String },

    #[error("Writing download to '{path}' failed")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP client could not be created: {reason}")]
    Client { reason: String },
}

impl FetchError {
    pub(crate) fn network(url: &str, source: reqwest::Error) -> Self {
        let reason = if source.is_timeout() {
            "timed out".to_string()
        } else if source.is_connect() {
            "could not connect".to_string()
        } else {
            source.to_string()
        };
        FetchError::NetworkFailure {
            url: url.to_string(),
            status: source.status().map(|s| s.as_u16()),
            reason,
            source: Some(source),
        }
    }

    pub(crate) fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        FetchError::Io { path: path.into(), source }
    }

    /// Check if a later attempt could reasonably succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            FetchError::NetworkFailure { status, .. } => {
                // Client errors other than throttling will not fix themselves
                status.is_none_or(|s| s >= 500 || s == 408)
            }
            FetchError::RateLimited { .. } => true,
            FetchError::NotFound { .. } => false,
            FetchError::Io { .. } => false,
            FetchError::Client { .. } => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            FetchError::NetworkFailure { .. } => "network_failure",
            FetchError::RateLimited { .. } => "rate_limited",
            FetchError::NotFound { .. } => "not_found",
            FetchError::Io { .. } => "file_system",
            FetchError::Client { .. } => "client",
        }
    }

    /// Get user-friendly suggestion for resolving the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            FetchError::NetworkFailure { .. } => Some("Check your internet connection and try again"),
            FetchError::RateLimited { .. } => Some("The server is throttling requests; wait a few minutes before retrying"),
            FetchError::NotFound { .. } => Some("The download link may have been removed; refresh the mod list"),
            FetchError::Io { .. } => Some("Check free disk space and folder permissions"),
            FetchError::Client { .. } => None,
        }
    }
}
