//! Archive extraction error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while inspecting or extracting an archive
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Archive is empty or not a valid archive: {reason}")]
    EmptyOrInvalidArchive { reason: String },

    #[error("Archive entry '{entry}' could not be decompressed: {reason}")]
    CorruptEntry { entry: String, reason: String },

    #[error("Could not write extracted file '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    pub(crate) fn empty<S: Into<String>>(reason: S) -> Self {
        ExtractError::EmptyOrInvalidArchive { reason: reason.into() }
    }

    pub(crate) fn corrupt<E: std::fmt::Display>(entry: &str, reason: E) -> Self {
        ExtractError::CorruptEntry {
            entry: entry.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        ExtractError::Io { path: path.into(), source }
    }
}
