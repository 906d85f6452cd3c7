//! Installation module
//!
//! Standard and depot installers, plugin-load deployment, the persisted
//! installation state and the orchestrator tying them together.

pub mod deploy;
pub mod depot;
pub mod error;
pub mod launch;
pub mod lock;
pub mod orchestrator;
pub mod progress;
pub mod standard;
pub mod state;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use deploy::{DEPLOYMENT_MANIFEST, Deployer, DeploymentReport, ModStructure};
pub use depot::{BaseBuildProvider, CacheAction, DepotInstaller, DepotOutcome, DepotStage, OverlayPlan};
pub use error::{DepotError, InstallError};
pub use launch::{HostLauncher, LaunchRequest, ProcessLauncher};
pub use lock::{InstallGuard, InstallLock};
pub use orchestrator::{LaunchReport, Orchestrator, PreparedTarget, UninstallReport, UpdateOutcome};
pub use progress::{InstallPhase, InstallProgress, StatusCallback};
pub use standard::{InstallReport, StandardInstaller};
pub use state::InstallationState;
