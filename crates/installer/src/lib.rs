//! Mod Installer Library
//!
//! This library installs game mods for a plugin-framework based host: it
//! resolves dependencies from a read-only catalogue, fetches and unpacks mod
//! archives into per-mod storage, keeps a persisted record of what is
//! installed, and prepares either the primary game tree or a depot copy of
//! an older game build before launching.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mod_installer::{Catalogue, InstallProgress, InstallerConfig, ModId, Orchestrator};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = InstallerConfig::from_env()?;
//! let catalogue = Catalogue::from_json(&std::fs::read_to_string("catalogue.json")?)?;
//!
//! let orchestrator = Orchestrator::new(config, catalogue)?
//!     .with_status(Arc::new(|progress: InstallProgress| {
//!         println!("[{:?}] {}", progress.phase, progress.message);
//!     }));
//!
//! orchestrator.load_state().await?;
//! orchestrator.install_mod(&ModId::from("LethalLib"), None, &[]).await?;
//! orchestrator.launch_with_mods(&[ModId::from("LethalLib")]).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Dependency resolution**: dependencies first, cycles reported with their path
//! - **Archive layouts**: bare plugins, wrapped folders and nested framework trees
//! - **Integrity**: optional xxHash64 checksum verification before extraction
//! - **Depot builds**: working copies of older game builds with mod overlays
//! - **Single writer**: one mutating operation at a time, others rejected

pub mod archive;
pub mod catalogue;
pub mod config;
pub mod fetch;
pub mod fsops;
pub mod install;
pub mod logging;
pub mod resolve;

// Re-export commonly used types for convenience
pub use archive::{ExtractError, PackageLayout};
pub use catalogue::{Catalogue, CatalogueError, Dependency, DepotPin, LayoutHint, ModDescriptor, ModId, ModVersion};
pub use config::{ConfigError, DepotConfig, FetchConfig, InstallerConfig};
pub use fetch::{FetchError, Fetcher};
pub use install::{
    BaseBuildProvider, DepotError, HostLauncher, InstallError, InstallPhase, InstallProgress, InstallReport,
    LaunchReport, Orchestrator, PreparedTarget, UninstallReport, UpdateOutcome,
};
pub use resolve::{ResolveError, ResolvedDependency, Resolver};
