//! Installation error types

use std::path::PathBuf;
use thiserror::Error;

use crate::archive::ExtractError;
use crate::catalogue::{DepotPin, ModId};
use crate::fetch::FetchError;
use crate::fsops::CleanupWarning;
use crate::resolve::ResolveError;

/// Failures while preparing or overlaying a depot copy
#[derive(Debug, Error)]
pub enum DepotError {
    #[error("Base build {pin} is not available: {reason}")]
    BaseBuildUnavailable { pin: DepotPin, reason: String },

    #[error("Copying the base build into '{path}' failed")]
    CopyFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Overlaying files from '{from}' onto the depot copy failed")]
    OverlayFailed {
        from: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid overlay order: {reason}")]
    InvalidOverlayOrder { reason: String },

    #[error("Waiting for base build {pin} was cancelled")]
    Cancelled { pin: DepotPin },

    #[error("Resetting the shared cache at '{path}' failed")]
    CacheReset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{cause}; {warning}")]
    CleanupIncomplete {
        #[source]
        cause: Box<DepotError>,
        warning: CleanupWarning,
    },
}

impl DepotError {
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DepotError::BaseBuildUnavailable { .. } | DepotError::Cancelled { .. }
        )
    }

    /// Attach a failed cleanup to this error, if there was one
    pub(crate) fn with_cleanup(self, warning: Option<CleanupWarning>) -> Self {
        match warning {
            Some(warning) => DepotError::CleanupIncomplete { cause: Box::new(self), warning },
            None => self,
        }
    }
}

/// Errors surfaced by the installation pipeline
///
/// Every variant names the mod it concerns, so a caller can render one
/// message without further context.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Another installation is already in progress")]
    AlreadyInProgress,

    #[error("'{mod_id}' cannot be used together with '{conflict}'")]
    IncompatibleWithSelection { mod_id: ModId, conflict: ModId },

    #[error("Dependency '{id}' failed to install: {cause}")]
    DependencyInstallFailed {
        id: ModId,
        #[source]
        cause: Box<InstallError>,
    },

    #[error("'{mod_id}' is still required by {}", join_ids(.dependents))]
    HasDependents { mod_id: ModId, dependents: Vec<ModId> },

    #[error("'{mod_id}' is not installed")]
    NotInstalled { mod_id: ModId },

    #[error("'{mod_id}' is not in the mod catalogue")]
    UnknownMod { mod_id: ModId },

    #[error("'{mod_id}' has no version '{version}'")]
    UnknownVersion { mod_id: ModId, version: String },

    #[error("Selection cannot be launched: {reason}")]
    UnsupportedSelection { reason: String },

    #[error("Download of '{mod_id}' is damaged: expected checksum {expected}, got {actual}")]
    ChecksumMismatch {
        mod_id: ModId,
        expected: String,
        actual: String,
    },

    #[error("Downloading '{mod_id}' failed: {source}")]
    Fetch {
        mod_id: ModId,
        #[source]
        source: FetchError,
    },

    #[error("Extracting '{mod_id}' failed: {source}")]
    Extract {
        mod_id: ModId,
        #[source]
        source: ExtractError,
    },

    #[error("Resolving dependencies of '{mod_id}' failed: {source}")]
    Resolve {
        mod_id: ModId,
        #[source]
        source: ResolveError,
    },

    #[error("Preparing the depot copy for '{mod_id}' failed: {source}")]
    Depot {
        mod_id: ModId,
        #[source]
        source: DepotError,
    },

    #[error("Installation state at '{path}' is unusable: {reason}")]
    State { path: PathBuf, reason: String },

    #[error("File operation on '{path}' failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Launching the game failed: {reason}")]
    Launch { reason: String },

    #[error("{cause}; {warning}")]
    CleanupIncomplete {
        #[source]
        cause: Box<InstallError>,
        warning: CleanupWarning,
    },
}

fn join_ids(ids: &[ModId]) -> String {
    ids.iter()
        .map(|id| format!("'{}'", id))
        .collect::<Vec<_>>()
        .join(", ")
}

impl InstallError {
    pub(crate) fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        InstallError::Io { path: path.into(), source }
    }

    /// Attach a failed cleanup to this error, if there was one
    pub(crate) fn with_cleanup(self, warning: Option<CleanupWarning>) -> Self {
        match warning {
            Some(warning) => InstallError::CleanupIncomplete { cause: Box::new(self), warning },
            None => self,
        }
    }

    /// Check if retrying the same operation could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            InstallError::AlreadyInProgress => true,
            InstallError::Fetch { source, .. } => source.is_recoverable(),
            InstallError::Depot { source, .. } => source.is_recoverable(),
            InstallError::DependencyInstallFailed { cause, .. } => cause.is_recoverable(),
            InstallError::ChecksumMismatch { .. } => true,
            InstallError::Io { .. } => true,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            InstallError::AlreadyInProgress => "busy",
            InstallError::IncompatibleWithSelection { .. } => "conflict",
            InstallError::DependencyInstallFailed { .. } => "dependency",
            InstallError::HasDependents { .. } => "has_dependents",
            InstallError::NotInstalled { .. }
            | InstallError::UnknownMod { .. }
            | InstallError::UnknownVersion { .. } => "lookup",
            InstallError::UnsupportedSelection { .. } => "unsupported",
            InstallError::ChecksumMismatch { .. } => "validation",
            InstallError::Fetch { .. } => "network",
            InstallError::Extract { .. } => "extraction",
            InstallError::Resolve { .. } => "resolution",
            InstallError::Depot { .. } => "depot",
            InstallError::State { .. } => "state",
            InstallError::Io { .. } => "file_system",
            InstallError::Launch { .. } => "launch",
            InstallError::CleanupIncomplete { cause, .. } => cause.category(),
        }
    }

    /// Get user-friendly suggestion for resolving the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            InstallError::AlreadyInProgress => Some("Wait for the current installation to finish"),
            InstallError::IncompatibleWithSelection { .. } => Some("Deselect the conflicting mod first"),
            InstallError::DependencyInstallFailed { cause, .. } => cause.suggestion(),
            InstallError::HasDependents { .. } => Some("Uninstall the mods that depend on it first"),
            InstallError::Fetch { source, .. } => source.suggestion(),
            InstallError::Extract { .. } => Some("The download appears to be damaged; try again later or report it to the mod author"),
            InstallError::ChecksumMismatch { .. } => Some("Try the download again"),
            InstallError::Resolve { .. } => Some("The mod's dependency list is broken; refresh the mod list"),
            InstallError::Depot { source: DepotError::BaseBuildUnavailable { .. }, .. } => {
                Some("Make sure the game client is running and signed in, then try again")
            }
            InstallError::Io { .. } => Some("Close the game and check folder permissions"),
            InstallError::CleanupIncomplete { .. } => {
                Some("Close the game and remove the leftover folder before trying again")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_failure_inherits_recoverability() {
        let network = InstallError::DependencyInstallFailed {
            id: "B".into(),
            cause: Box::new(InstallError::Fetch {
                mod_id: "B".into(),
                source: FetchError::RateLimited { url: "https://x/b.zip".into() },
            }),
        };
        assert!(network.is_recoverable());
        assert_eq!(network.category(), "dependency");

        let corrupt = InstallError::DependencyInstallFailed {
            id: "B".into(),
            cause: Box::new(InstallError::Extract {
                mod_id: "B".into(),
                source: ExtractError::CorruptEntry { entry: "B.dll".into(), reason: "bad crc".into() },
            }),
        };
        assert!(!corrupt.is_recoverable());
    }

    #[test]
    fn test_messages_name_the_mod() {
        let err = InstallError::HasDependents {
            mod_id: "B".into(),
            dependents: vec!["A".into(), "C".into()],
        };
        assert_eq!(err.to_string(), "'B' is still required by 'A', 'C'");

        let err = InstallError::Extract {
            mod_id: "Cool".into(),
            source: ExtractError::EmptyOrInvalidArchive { reason: "archive has zero bytes".into() },
        };
        assert!(err.to_string().contains("'Cool'"));
        assert!(err.to_string().contains("zero bytes"));
    }

    #[test]
    fn test_failed_cleanup_travels_with_the_error() {
        let warning = CleanupWarning {
            path: PathBuf::from("Mods/Cool"),
            message: "Directory not empty".into(),
        };
        let extract = || InstallError::Extract {
            mod_id: "Cool".into(),
            source: ExtractError::CorruptEntry { entry: "Cool.dll".into(), reason: "bad crc".into() },
        };

        assert!(matches!(extract().with_cleanup(None), InstallError::Extract { .. }));

        let err = extract().with_cleanup(Some(warning.clone()));
        match &err {
            InstallError::CleanupIncomplete { cause, warning: attached } => {
                assert!(matches!(**cause, InstallError::Extract { .. }));
                assert_eq!(attached, &warning);
            }
            other => panic!("Expected CleanupIncomplete, got {:?}", other),
        }
        assert_eq!(err.category(), "extraction");
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("Mods/Cool"));

        let depot = DepotError::Cancelled {
            pin: DepotPin { manifest_id: "1".into(), version: "v1".into() },
        }
        .with_cleanup(Some(warning));
        assert!(matches!(depot, DepotError::CleanupIncomplete { .. }));
        assert!(!depot.is_recoverable());
    }
}
