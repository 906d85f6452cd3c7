//! Installation orchestrator
//!
//! The public entry point of the pipeline. It owns the install lock, the
//! persisted state and the catalogue. Mods pinned to an older game build get
//! their depot copy rebuilt whenever they are installed or updated, and a
//! launch picks between the primary tree and that copy.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mod_installer::{Catalogue, InstallProgress, InstallerConfig, ModId, Orchestrator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = InstallerConfig::from_env()?;
//! let catalogue = Catalogue::from_json(&std::fs::read_to_string("mods.json")?)?;
//!
//! let orchestrator = Orchestrator::new(config, catalogue)?
//!     .with_status(Arc::new(|progress: InstallProgress| {
//!         println!("{:?}: {}", progress.phase, progress.message)
//!     }));
//! orchestrator.load_state().await?;
//!
//! let report = orchestrator.install_mod(&ModId::from("LethalLib"), None, &[]).await?;
//! println!("Installed {:?}", report.installed);
//!
//! orchestrator.launch_with_mods(&[ModId::from("LethalLib")]).await?;
//! # Ok(())
//! # }
//! ```

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::deploy::{Deployer, DeploymentReport};
use super::depot::{BaseBuildProvider, CacheAction, DepotInstaller, DepotOutcome, OverlayPlan};
use super::error::InstallError;
use super::launch::{HostLauncher, LaunchRequest, ProcessLauncher};
use super::lock::InstallLock;
use super::progress::{InstallPhase, StatusCallback, StatusReporter};
use super::standard::{InstallReport, StandardInstaller};
use super::state::InstallationState;
use crate::catalogue::{Catalogue, DepotPin, ModDescriptor, ModId, ModVersion};
use crate::config::InstallerConfig;
use crate::fetch::{FetchError, Fetcher};
use crate::fsops::{CleanupWarning, remove_dir_observed};
use crate::resolve::{ResolvedDependency, Resolver, find_conflict, installed_dependents};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated {
        from: String,
        to: String,
        report: InstallReport,
    },
    UpToDate { version: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallReport {
    pub removed: ModId,
    pub warnings: Vec<CleanupWarning>,
}

/// Tree a launch was prepared in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedTarget {
    Primary(DeploymentReport),
    Depot {
        outcome: DepotOutcome,
        cache: Vec<CacheAction>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    pub request: LaunchRequest,
    pub target: PreparedTarget,
}

pub struct Orchestrator {
    config: InstallerConfig,
    catalogue: Catalogue,
    fetcher: Fetcher,
    lock: InstallLock,
    state: Mutex<InstallationState>,
    status: StatusReporter,
    provider: Option<Arc<dyn BaseBuildProvider>>,
    launcher: Arc<dyn HostLauncher>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator with an empty state; call [`Orchestrator::load_state`] next
    pub fn new(config: InstallerConfig, catalogue: Catalogue) -> Result<Self, FetchError> {
        let fetcher = Fetcher::new(&config.fetch)?;
        Ok(Self {
            config,
            catalogue,
            fetcher,
            lock: InstallLock::new(),
            state: Mutex::new(InstallationState::default()),
            status: StatusReporter::default(),
            provider: None,
            launcher: Arc::new(ProcessLauncher),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_status(mut self, callback: StatusCallback) -> Self {
        self.status = StatusReporter::new(Some(callback));
        self
    }

    pub fn with_base_build_provider(mut self, provider: Arc<dyn BaseBuildProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn HostLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Share an install lock with other orchestrators in the process
    pub fn with_lock(mut self, lock: InstallLock) -> Self {
        self.lock = lock;
        self
    }

    /// Set a cancellation token for depot waits
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    /// Swap in a freshly fetched catalogue
    pub fn replace_catalogue(&mut self, catalogue: Catalogue) {
        self.catalogue = catalogue;
    }

    pub async fn state(&self) -> InstallationState {
        self.state.lock().await.clone()
    }

    /// Load persisted state, forgetting mods whose files are gone
    ///
    /// Returns the identifiers that were forgotten.
    pub async fn load_state(&self) -> Result<Vec<ModId>, InstallError> {
        let _guard = self.lock.try_acquire()?;
        let mut loaded = InstallationState::load(&self.config.state_file).await?;

        let pruned = loaded.prune_missing(&self.config.mods_root);
        if !pruned.is_empty() {
            loaded.save(&self.config.state_file).await?;
        }

        info!("Loaded installation state: {} mods installed", loaded.len());
        *self.state.lock().await = loaded;
        Ok(pruned)
    }

    /// Install a mod, and whatever it depends on, into the primary storage tree
    ///
    /// `version` picks a release by label; `None` means the newest stable
    /// release. `selection` is the caller's active mod set, checked for
    /// conflicts before anything is written.
    pub async fn install_mod(
        &self,
        id: &ModId,
        version: Option<&str>,
        selection: &[ModId],
    ) -> Result<InstallReport, InstallError> {
        let _guard = self.lock.try_acquire()?;
        let mut state = self.state.lock().await;
        let catalogue = self.current_catalogue(&state);

        let descriptor = lookup(&catalogue, id)?;
        let chosen = match version {
            Some(label) => descriptor.version(label).ok_or_else(|| InstallError::UnknownVersion {
                mod_id: descriptor.id.clone(),
                version: label.to_string(),
            })?,
            None => latest(descriptor)?,
        };

        let selected: Vec<&ModDescriptor> = selection.iter().filter_map(|s| catalogue.get(s)).collect();
        if let Some(conflict) = find_conflict(descriptor, selected.iter().copied()) {
            return Err(InstallError::IncompatibleWithSelection {
                mod_id: descriptor.id.clone(),
                conflict,
            });
        }

        info!("Installing {} {}", descriptor.id, chosen.label());
        let result = self.install_with_strategy(&catalogue, descriptor, chosen, &mut state).await;
        self.finish(&descriptor.id, "Installed", result)
    }

    /// Install the newest release of an installed mod, if it is not already current
    pub async fn update_mod(&self, id: &ModId) -> Result<UpdateOutcome, InstallError> {
        let _guard = self.lock.try_acquire()?;
        let mut state = self.state.lock().await;
        let catalogue = self.current_catalogue(&state);

        let descriptor = lookup(&catalogue, id)?;
        let current = state
            .version_of(&descriptor.id)
            .map(str::to_string)
            .ok_or_else(|| InstallError::NotInstalled { mod_id: descriptor.id.clone() })?;
        let newest = latest(descriptor)?;

        if newest.label().eq_ignore_ascii_case(&current) {
            self.status.emit(
                InstallPhase::Complete,
                Some(&descriptor.id),
                format!("{} is up to date ({})", descriptor.name, current),
            );
            return Ok(UpdateOutcome::UpToDate { version: current });
        }

        info!("Updating {} from {} to {}", descriptor.id, current, newest.label());
        let result = self.install_with_strategy(&catalogue, descriptor, newest, &mut state).await;
        let report = self.finish(&descriptor.id, "Updated", result)?;

        Ok(UpdateOutcome::Updated {
            from: current,
            to: newest.label().to_string(),
            report,
        })
    }

    /// Remove an installed mod's files and forget it
    ///
    /// Refused while another installed mod depends on it.
    pub async fn uninstall_mod(&self, id: &ModId) -> Result<UninstallReport, InstallError> {
        let _guard = self.lock.try_acquire()?;
        let mut state = self.state.lock().await;

        let recorded = state
            .recorded_id(id)
            .cloned()
            .ok_or_else(|| InstallError::NotInstalled { mod_id: id.clone() })?;

        let dependents = installed_dependents(&self.catalogue, &recorded, |d| state.is_installed(d));
        if !dependents.is_empty() {
            return Err(InstallError::HasDependents {
                mod_id: recorded,
                dependents,
            });
        }

        self.status.emit(InstallPhase::Uninstalling, Some(&recorded), format!("Removing {}", recorded));
        let storage = self.config.storage_dir(recorded.as_str());
        if let Some(warning) = remove_dir_observed(&storage) {
            return Err(InstallError::io(&storage, io::Error::other(warning.message)));
        }

        let mut warnings = Vec::new();
        if self.catalogue.get(&recorded).is_some_and(ModDescriptor::requires_depot) {
            warnings.extend(remove_dir_observed(&self.config.depot.working_dir(recorded.as_str())));
        }

        state.remove(&recorded);
        state.save(&self.config.state_file).await?;

        info!("Uninstalled {}", recorded);
        self.status.emit(InstallPhase::Complete, Some(&recorded), format!("Removed {}", recorded));
        Ok(UninstallReport {
            removed: recorded,
            warnings,
        })
    }

    /// Prepare the right tree for `selection` and start the game
    ///
    /// Every selected mod must be installed and free of conflicts. Mods pinned
    /// to a game build launch from a depot copy; they cannot be mixed with
    /// unpinned mods or with mods pinned to a different build.
    pub async fn launch_with_mods(&self, selection: &[ModId]) -> Result<LaunchReport, InstallError> {
        let _guard = self.lock.try_acquire()?;
        let state = self.state.lock().await;
        let catalogue = self.current_catalogue(&state);

        let mut chosen: Vec<&ModDescriptor> = Vec::new();
        for id in selection {
            let descriptor = lookup(&catalogue, id)?;
            if !state.is_installed(&descriptor.id) {
                return Err(InstallError::NotInstalled { mod_id: descriptor.id.clone() });
            }
            if chosen.iter().any(|c| c.id == descriptor.id) {
                continue;
            }
            if let Some(conflict) = find_conflict(descriptor, chosen.iter().copied()) {
                return Err(InstallError::IncompatibleWithSelection {
                    mod_id: descriptor.id.clone(),
                    conflict,
                });
            }
            chosen.push(descriptor);
        }

        let pin = depot_pin(&chosen)?;
        let order = self.launch_order(&catalogue, &state, &chosen)?;

        let (root, target) = match (pin, chosen.first()) {
            (Some(pin), Some(primary)) => self.prepare_depot(primary, pin, &order).await?,
            _ => self.prepare_primary(&order).await?,
        };

        let request = LaunchRequest {
            executable: root.join(&self.config.host_executable),
            working_dir: root,
            mods: order.iter().map(|(id, _)| id.clone()).collect(),
            depot: pin.cloned(),
        };

        self.status.emit(InstallPhase::Launching, None, "Starting the game");
        self.launcher
            .launch(&request)
            .await
            .map_err(|e| InstallError::Launch { reason: format!("{:#}", e) })?;

        info!("Launched with {} mods", request.mods.len());
        self.status.emit(InstallPhase::Complete, None, "Game started");
        Ok(LaunchReport { request, target })
    }

    /// Mods to activate, with their storage directories, dependencies first
    fn launch_order(
        &self,
        catalogue: &Catalogue,
        state: &InstallationState,
        chosen: &[&ModDescriptor],
    ) -> Result<Vec<(ModId, PathBuf)>, InstallError> {
        let mut order: Vec<(ModId, PathBuf)> = Vec::new();
        let mut add = |id: ModId, dir: PathBuf| {
            if !order.iter().any(|(existing, _)| *existing == id) {
                order.push((id, dir));
            }
        };

        for descriptor in chosen {
            let steps = Resolver::new(catalogue)
                .resolve(descriptor)
                .map_err(|source| InstallError::Resolve {
                    mod_id: descriptor.id.clone(),
                    source,
                })?;

            for step in steps {
                match step {
                    ResolvedDependency::Catalogued { descriptor: dependency, .. } => {
                        if !state.is_installed(&dependency.id) {
                            return Err(InstallError::NotInstalled { mod_id: dependency.id.clone() });
                        }
                        add(dependency.id.clone(), self.config.storage_dir(dependency.id.as_str()));
                    }
                    ResolvedDependency::Direct { file_name, .. } => {
                        let stem = std::path::Path::new(&file_name)
                            .file_stem()
                            .and_then(|s| s.to_str())
                            .unwrap_or(&file_name)
                            .to_string();
                        let dir = self.config.mods_root.join(&stem);
                        if !dir.join(&file_name).exists() {
                            return Err(InstallError::NotInstalled { mod_id: ModId::new(file_name) });
                        }
                        add(ModId::new(stem), dir);
                    }
                }
            }
            add(descriptor.id.clone(), self.config.storage_dir(descriptor.id.as_str()));
        }
        Ok(order)
    }

    async fn prepare_primary(&self, order: &[(ModId, PathBuf)]) -> Result<(PathBuf, PreparedTarget), InstallError> {
        self.status.emit(
            InstallPhase::Deploying,
            None,
            format!("Deploying {} mods", order.len()),
        );
        let root = self.config.game_root.clone();
        let deployer = Deployer::new(&root, &self.config);
        let mods = order.to_vec();

        let report = tokio::task::spawn_blocking(move || deployer.deploy(&mods))
            .await
            .map_err(|e| InstallError::io(&root, io::Error::other(e)))?
            .map_err(|e| InstallError::io(&root, e))?;

        for warning in &report.warnings {
            warn!("Deployment cleanup: {}", warning);
        }
        Ok((root, PreparedTarget::Primary(report)))
    }

    async fn prepare_depot(
        &self,
        primary: &ModDescriptor,
        pin: &DepotPin,
        order: &[(ModId, PathBuf)],
    ) -> Result<(PathBuf, PreparedTarget), InstallError> {
        let (installer, outcome) = self.build_depot_copy(primary, pin, order).await?;
        let cache = installer
            .prepare_first_launch(&outcome.path)
            .await
            .map_err(|source| InstallError::Depot {
                mod_id: primary.id.clone(),
                source,
            })?;

        Ok((outcome.path.clone(), PreparedTarget::Depot { outcome, cache }))
    }

    /// Bring the working copy for `primary` to ready, overlaying the rest of `order`
    async fn build_depot_copy(
        &self,
        primary: &ModDescriptor,
        pin: &DepotPin,
        order: &[(ModId, PathBuf)],
    ) -> Result<(DepotInstaller<'_>, DepotOutcome), InstallError> {
        let provider = self.provider.as_deref().ok_or_else(|| InstallError::UnsupportedSelection {
            reason: format!("'{}' needs game build {} but no depot source is configured", primary.id, pin),
        })?;

        let mut plan = OverlayPlan::new();
        for (id, dir) in order.iter().filter(|(id, _)| *id != primary.id) {
            plan.push(id.clone(), dir.clone());
        }

        self.status.emit(
            InstallPhase::PreparingDepot,
            Some(&primary.id),
            format!("Preparing game build {} for {}", pin, primary.name),
        );
        let depot_error = |source| InstallError::Depot {
            mod_id: primary.id.clone(),
            source,
        };
        let installer = DepotInstaller::new(&self.config.depot, provider).with_cancellation_token(self.cancel.clone());
        let storage = self.config.storage_dir(primary.id.as_str());

        let outcome = installer
            .install(&primary.id, pin, &storage, &plan)
            .await
            .map_err(depot_error)?;
        Ok((installer, outcome))
    }

    /// Standard install, followed by a depot rebuild for pinned mods
    ///
    /// The depot step runs without a configured provider only as a warning;
    /// the copy is then built at launch time, where a missing provider is an
    /// error.
    async fn install_with_strategy(
        &self,
        catalogue: &Catalogue,
        descriptor: &ModDescriptor,
        version: &ModVersion,
        state: &mut InstallationState,
    ) -> Result<InstallReport, InstallError> {
        let mut report = self.standard().install(catalogue, descriptor, version, state).await?;

        let Some(pin) = descriptor.depot.as_ref() else {
            return Ok(report);
        };
        if self.provider.is_none() {
            warn!("{} needs game build {} but no depot source is configured", descriptor.id, pin);
            return Ok(report);
        }

        let catalogue = self.current_catalogue(state);
        let order = self.launch_order(&catalogue, state, &[descriptor])?;
        let (_, outcome) = self.build_depot_copy(descriptor, pin, &order).await?;
        report.depot = Some(outcome);
        Ok(report)
    }

    fn standard(&self) -> StandardInstaller<'_> {
        StandardInstaller::new(&self.config, &self.fetcher).with_status(self.status.clone())
    }

    fn current_catalogue(&self, state: &InstallationState) -> Catalogue {
        self.catalogue
            .with_installed_versions(|id| state.version_of(id).map(str::to_string))
    }

    fn finish(
        &self,
        id: &ModId,
        verb: &str,
        result: Result<InstallReport, InstallError>,
    ) -> Result<InstallReport, InstallError> {
        match &result {
            Ok(report) => {
                self.status.emit(
                    InstallPhase::Complete,
                    Some(id),
                    format!("{} {} ({} mods)", verb, id, report.installed.len()),
                );
            }
            Err(e) => warn!("{} failed [{}]: {}", id, e.category(), e),
        }
        result
    }
}

fn lookup<'c>(catalogue: &'c Catalogue, id: &ModId) -> Result<&'c ModDescriptor, InstallError> {
    catalogue
        .get(id)
        .ok_or_else(|| InstallError::UnknownMod { mod_id: id.clone() })
}

fn latest(descriptor: &ModDescriptor) -> Result<&ModVersion, InstallError> {
    descriptor.latest().ok_or_else(|| InstallError::UnknownVersion {
        mod_id: descriptor.id.clone(),
        version: "latest".to_string(),
    })
}

/// The single game build a selection needs, if any
fn depot_pin<'a>(chosen: &[&'a ModDescriptor]) -> Result<Option<&'a DepotPin>, InstallError> {
    let Some(pinned) = chosen.iter().find(|d| d.requires_depot()) else {
        return Ok(None);
    };
    let Some(pin) = pinned.depot.as_ref() else {
        return Ok(None);
    };

    if let Some(unpinned) = chosen.iter().find(|d| !d.requires_depot()) {
        return Err(InstallError::UnsupportedSelection {
            reason: format!(
                "'{}' needs game build {} and cannot run together with '{}'",
                pinned.id, pin, unpinned.id
            ),
        });
    }
    if let Some(other) = chosen.iter().find(|d| d.depot.as_ref().is_some_and(|p| p != pin)) {
        return Err(InstallError::UnsupportedSelection {
            reason: format!(
                "'{}' and '{}' need different game builds",
                pinned.id, other.id
            ),
        });
    }
    Ok(Some(pin))
}
