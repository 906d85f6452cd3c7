//! Standard installer
//!
//! Installs a mod and its missing dependencies into the primary storage tree,
//! one `Mods/<modId>/` directory per mod. Each mod is installed clean: the
//! storage directory is deleted first, then fetched and extracted afresh, and
//! deleted again if anything goes wrong.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, info};

use super::depot::DepotOutcome;
use super::error::InstallError;
use super::progress::{InstallPhase, StatusReporter};
use super::state::InstallationState;
use crate::archive::{self, ExtractOptions, LayoutRules};
use crate::catalogue::{Catalogue, ModDescriptor, ModId, ModVersion};
use crate::config::InstallerConfig;
use crate::fetch::{Fetcher, checksum, file_name_from_url};
use crate::fsops::remove_dir_observed;
use crate::resolve::{ResolvedDependency, Resolver};

/// What a successful installation did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Catalogued mods installed by this call, dependencies first
    pub installed: Vec<ModId>,
    /// Files fetched for direct-locator dependencies
    pub fetched_files: Vec<PathBuf>,
    /// Working copy rebuilt for a mod pinned to an older game build
    pub depot: Option<DepotOutcome>,
}

pub struct StandardInstaller<'a> {
    config: &'a InstallerConfig,
    fetcher: &'a Fetcher,
    status: StatusReporter,
}

impl<'a> StandardInstaller<'a> {
    pub fn new(config: &'a InstallerConfig, fetcher: &'a Fetcher) -> Self {
        Self {
            config,
            fetcher,
            status: StatusReporter::default(),
        }
    }

    pub(crate) fn with_status(mut self, status: StatusReporter) -> Self {
        self.status = status;
        self
    }

    /// Install `descriptor` at `version`, preceded by every dependency it is missing
    ///
    /// `catalogue` must carry current installed flags. Each mod is recorded in
    /// `state` (and the state saved) right after its own files are in place, so
    /// a failure part-way leaves the state matching the disk. A dependency
    /// failure aborts before the requested mod is touched.
    pub async fn install(
        &self,
        catalogue: &Catalogue,
        descriptor: &ModDescriptor,
        version: &ModVersion,
        state: &mut InstallationState,
    ) -> Result<InstallReport, InstallError> {
        self.status.emit(
            InstallPhase::Resolving,
            Some(&descriptor.id),
            format!("Resolving dependencies of {}", descriptor.name),
        );
        let plan = Resolver::new(catalogue)
            .resolve(descriptor)
            .map_err(|source| InstallError::Resolve {
                mod_id: descriptor.id.clone(),
                source,
            })?;

        let mut report = InstallReport::default();

        for step in plan.iter().filter(|s| s.needs_install()) {
            match step {
                ResolvedDependency::Catalogued { descriptor: dependency, version_hint, .. } => {
                    info!("Installing dependency {} for {}", dependency.id, descriptor.id);
                    let version = dependency
                        .pick_version(version_hint.as_deref())
                        .ok_or_else(|| InstallError::UnknownVersion {
                            mod_id: dependency.id.clone(),
                            version: version_hint.clone().unwrap_or_else(|| "latest".to_string()),
                        })
                        .map_err(|cause| dependency_failed(&dependency.id, cause))?;

                    self.install_files(dependency, version)
                        .await
                        .map_err(|cause| dependency_failed(&dependency.id, cause))?;
                    self.record(state, &dependency.id, version.label()).await?;
                    report.installed.push(dependency.id.clone());
                }
                ResolvedDependency::Direct { url, file_name, required_by } => {
                    debug!("Fetching {} for {}", file_name, required_by);
                    let fetched = self
                        .install_direct(url, file_name)
                        .await
                        .map_err(|cause| dependency_failed(&ModId::new(file_name.as_str()), cause))?;
                    report.fetched_files.extend(fetched);
                }
            }
        }

        self.install_files(descriptor, version).await?;
        self.record(state, &descriptor.id, version.label()).await?;
        report.installed.push(descriptor.id.clone());

        info!(
            "Installed {} {} ({} mods in total)",
            descriptor.id,
            version.label(),
            report.installed.len()
        );
        Ok(report)
    }

    /// Clean-install one mod's files into its storage directory
    pub async fn install_files(&self, descriptor: &ModDescriptor, version: &ModVersion) -> Result<(), InstallError> {
        let storage = self.config.storage_dir(descriptor.id.as_str());

        if let Some(warning) = remove_dir_observed(&storage) {
            return Err(InstallError::io(&storage, io::Error::other(warning.message)));
        }

        match self.populate(descriptor, version, &storage).await {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!("Removing partial install of {} after: {}", descriptor.id, e);
                Err(e.with_cleanup(remove_dir_observed(&storage)))
            }
        }
    }

    async fn populate(&self, descriptor: &ModDescriptor, version: &ModVersion, storage: &Path) -> Result<(), InstallError> {
        let id = &descriptor.id;
        let url = version.download_url();
        let file_name = file_name_from_url(url).unwrap_or_else(|| format!("{}.zip", id));

        let scratch = self.scratch_dir()?;
        let download = scratch.path().join(&file_name);

        self.status.emit(
            InstallPhase::Downloading,
            Some(id),
            format!("Downloading {} {}", descriptor.name, version.label()),
        );
        self.fetcher
            .download_to_file(url, &download, self.status.download_forwarder(id, &descriptor.name))
            .await
            .map_err(|source| InstallError::Fetch { mod_id: id.clone(), source })?;

        if let Some(expected) = version.checksum() {
            self.verify(id, &download, expected).await?;
        }

        fs::create_dir_all(storage)
            .await
            .map_err(|e| InstallError::io(storage, e))?;

        if self.is_bare_plugin(&file_name) {
            debug!("{} is a bare plugin file, copying without extraction", file_name);
            let target = storage.join(&file_name);
            fs::copy(&download, &target)
                .await
                .map_err(|e| InstallError::io(&target, e))?;
            return Ok(());
        }

        self.status.emit(InstallPhase::Extracting, Some(id), format!("Extracting {}", descriptor.name));
        let archive = fs::read(&download)
            .await
            .map_err(|e| InstallError::io(&download, e))?;

        let destination = storage.to_path_buf();
        let hint = descriptor.layout;
        let exclude = descriptor.exclude.clone();
        let extension = self.config.plugin_extension.clone();
        let framework = self.config.framework_folder.clone();

        let extracted = tokio::task::spawn_blocking(move || {
            let options = ExtractOptions {
                hint,
                exclude: &exclude,
                rules: LayoutRules {
                    plugin_extension: &extension,
                    framework_folder: &framework,
                },
            };
            archive::extract(&archive, &destination, &options)
        })
        .await
        .map_err(|e| InstallError::io(storage, io::Error::other(e)))?;

        let report = extracted.map_err(|source| InstallError::Extract { mod_id: id.clone(), source })?;
        debug!(
            "{} extracted as {:?}: {} files, {} excluded",
            id,
            report.layout,
            report.written.len(),
            report.excluded
        );
        Ok(())
    }

    /// Fetch a direct-locator file into `Mods/<stem>/<file_name>`, unless already there
    async fn install_direct(&self, url: &str, file_name: &str) -> Result<Option<PathBuf>, InstallError> {
        // Only the final component is trusted as a file name
        let file_name = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(file_name);
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name);
        let id = ModId::new(stem);
        let directory = self.config.mods_root.join(stem);
        let target = directory.join(file_name);

        if target.exists() {
            debug!("{} already present at {}", file_name, target.display());
            return Ok(None);
        }
        let existed = directory.exists();

        let fetched = async {
            let scratch = self.scratch_dir()?;
            let download = scratch.path().join(file_name);
            self.fetcher
                .download_to_file(url, &download, self.status.download_forwarder(&id, file_name))
                .await
                .map_err(|source| InstallError::Fetch { mod_id: id.clone(), source })?;
            fs::create_dir_all(&directory)
                .await
                .map_err(|e| InstallError::io(&directory, e))?;
            fs::copy(&download, &target)
                .await
                .map_err(|e| InstallError::io(&target, e))?;
            Ok::<(), InstallError>(())
        }
        .await;

        if let Err(e) = fetched {
            let cleanup = if existed { None } else { remove_dir_observed(&directory) };
            return Err(e.with_cleanup(cleanup));
        }
        Ok(Some(target))
    }

    async fn verify(&self, id: &ModId, download: &Path, expected: &str) -> Result<(), InstallError> {
        self.status.emit(InstallPhase::Verifying, Some(id), format!("Verifying {}", id));
        let actual = checksum::xxhash64_base64(download)
            .await
            .map_err(|e| InstallError::io(download, e))?;

        if actual != expected {
            return Err(InstallError::ChecksumMismatch {
                mod_id: id.clone(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    async fn record(&self, state: &mut InstallationState, id: &ModId, version: &str) -> Result<(), InstallError> {
        self.status.emit(InstallPhase::Recording, Some(id), format!("Recording {} {}", id, version));
        state.record(id, version);
        state.save(&self.config.state_file).await
    }

    fn is_bare_plugin(&self, file_name: &str) -> bool {
        let suffix = format!(".{}", self.config.plugin_extension.to_ascii_lowercase());
        file_name.to_ascii_lowercase().ends_with(&suffix)
    }

    fn scratch_dir(&self) -> Result<TempDir, InstallError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("mod-installer-");
        match &self.config.temp_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| InstallError::io(dir, e))?;
                builder.tempdir_in(dir).map_err(|e| InstallError::io(dir, e))
            }
            None => builder.tempdir().map_err(|e| InstallError::io(std::env::temp_dir(), e)),
        }
    }
}

fn dependency_failed(id: &ModId, cause: InstallError) -> InstallError {
    InstallError::DependencyInstallFailed {
        id: id.clone(),
        cause: Box::new(cause),
    }
}
