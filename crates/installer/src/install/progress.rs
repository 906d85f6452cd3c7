//! Status reporting for long-running operations

use std::sync::Arc;

use crate::catalogue::ModId;
use crate::fetch::{ProgressCallback, ProgressEvent};

/// Status callback type for pipeline updates
///
/// Invoked on whatever task runs the pipeline; marshalling onto a UI thread is
/// the receiver's job.
pub type StatusCallback = Arc<dyn Fn(InstallProgress) + Send + Sync>;

/// Pipeline phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Resolving,
    Downloading,
    Verifying,
    Extracting,
    Recording,
    Uninstalling,
    PreparingDepot,
    Deploying,
    Launching,
    Complete,
}

/// One status update
#[derive(Debug, Clone, PartialEq)]
pub struct InstallProgress {
    pub phase: InstallPhase,
    pub mod_id: Option<ModId>,
    pub message: String,
    /// Only set when the phase can measure it, e.g. a download with a known size
    pub percent: Option<u8>,
}

#[derive(Clone, Default)]
pub(crate) struct StatusReporter {
    callback: Option<StatusCallback>,
}

impl StatusReporter {
    pub(crate) fn new(callback: Option<StatusCallback>) -> Self {
        Self { callback }
    }

    pub(crate) fn emit<S: Into<String>>(&self, phase: InstallPhase, mod_id: Option<&ModId>, message: S) {
        if let Some(callback) = &self.callback {
            callback(InstallProgress {
                phase,
                mod_id: mod_id.cloned(),
                message: message.into(),
                percent: None,
            });
        }
    }

    /// Fetch progress forwarder that turns byte counts into download percentages
    pub(crate) fn download_forwarder(&self, mod_id: &ModId, label: &str) -> Option<ProgressCallback> {
        let callback = self.callback.clone()?;
        let mod_id = mod_id.clone();
        let label = label.to_string();
        Some(Arc::new(move |event| {
            if let ProgressEvent::DownloadProgress { percent, .. } = event {
                callback(InstallProgress {
                    phase: InstallPhase::Downloading,
                    mod_id: Some(mod_id.clone()),
                    message: format!("Downloading {}... {}%", label, percent),
                    percent: Some(percent),
                });
            }
        }))
    }
}
