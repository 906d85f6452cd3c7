//! Depot installer
//!
//! Some mods only work against an older build of the game. For those, the
//! installer keeps a separate working copy of that build per mod, copied from
//! a base build that an external provider downloads, with the mod's files
//! overlaid on top.
//!
//! A working copy moves through [`DepotStage`]s. Once a copy holds a valid
//! base build it is never copied again; later runs only re-apply overlays.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::DepotError;
use crate::catalogue::{DepotPin, ModId};
use crate::config::DepotConfig;
use crate::fsops::{Overwrite, copy_tree_blocking, remove_dir_observed};

/// Marker inside a working copy naming the manifest its base build came from
pub const BASE_MARKER: &str = ".depot-base";
/// Marker inside a working copy written once it has been launched
pub const LAUNCH_MARKER: &str = ".depot-launched";

/// Source of version-pinned base builds
///
/// Acquisition itself (package distributor, credentials, download) lives
/// outside this crate; the installer only needs to ask for a build and learn
/// when it is complete.
#[async_trait]
pub trait BaseBuildProvider: Send + Sync {
    /// Ask for `pin` to be acquired; returns once the request is accepted
    async fn request(&self, pin: &DepotPin) -> anyhow::Result<()>;

    /// Directory holding the complete base build, or `None` while still in progress
    async fn poll_ready(&self, pin: &DepotPin) -> anyhow::Result<Option<PathBuf>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepotStage {
    NoBaseBuild,
    BaseBuildReady,
    ModCopyReady,
    ModOverlaid,
    Ready,
}

/// Supporting mods to overlay after the target mod, in order
///
/// Later entries win on file collisions.
#[derive(Debug, Clone, Default)]
pub struct OverlayPlan {
    layers: Vec<(ModId, PathBuf)>,
}

impl OverlayPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then<P: Into<PathBuf>>(mut self, id: ModId, files: P) -> Self {
        self.layers.push((id, files.into()));
        self
    }

    pub fn push<P: Into<PathBuf>>(&mut self, id: ModId, files: P) {
        self.layers.push((id, files.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> impl Iterator<Item = (&ModId, &Path)> {
        self.layers.iter().map(|(id, dir)| (id, dir.as_path()))
    }

    /// Reject duplicates, the target mod itself and missing source directories
    pub fn validate(&self, target: &ModId) -> Result<(), DepotError> {
        for (index, (id, dir)) in self.layers.iter().enumerate() {
            if id == target {
                return Err(DepotError::InvalidOverlayOrder {
                    reason: format!("'{}' cannot be overlaid onto its own depot copy", id),
                });
            }
            if self.layers[..index].iter().any(|(earlier, _)| earlier == id) {
                return Err(DepotError::InvalidOverlayOrder {
                    reason: format!("'{}' appears more than once", id),
                });
            }
            if !dir.is_dir() {
                return Err(DepotError::InvalidOverlayOrder {
                    reason: format!("files for '{}' are missing at {}", id, dir.display()),
                });
            }
        }
        Ok(())
    }
}

/// A prepared working copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepotOutcome {
    pub path: PathBuf,
    /// Stages passed through on this run, in order
    pub stages: Vec<DepotStage>,
    /// The base build was already in place and was not copied again
    pub reused_copy: bool,
}

/// Steps taken on the shared cache before a first launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheAction {
    BackedUp { from: PathBuf, to: PathBuf },
    Deleted { path: PathBuf },
}

pub struct DepotInstaller<'a> {
    config: &'a DepotConfig,
    provider: &'a dyn BaseBuildProvider,
    cancel: CancellationToken,
}

impl<'a> DepotInstaller<'a> {
    pub fn new(config: &'a DepotConfig, provider: &'a dyn BaseBuildProvider) -> Self {
        Self {
            config,
            provider,
            cancel: CancellationToken::new(),
        }
    }

    /// Set a cancellation token for the base build wait
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Bring the working copy for `mod_id` to [`DepotStage::Ready`]
    ///
    /// `mod_files` is the mod's storage directory. If the working copy did not
    /// exist before this call, any failure removes what was created; an
    /// existing copy is never deleted.
    pub async fn install(
        &self,
        mod_id: &ModId,
        pin: &DepotPin,
        mod_files: &Path,
        plan: &OverlayPlan,
    ) -> Result<DepotOutcome, DepotError> {
        plan.validate(mod_id)?;

        let working = self.config.working_dir(mod_id.as_str());
        let existed_before = working.exists();

        match self.prepare(mod_id, pin, &working, mod_files, plan).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if existed_before {
                    return Err(e);
                }
                debug!("Removing partial depot copy at {}", working.display());
                Err(e.with_cleanup(remove_dir_observed(&working)))
            }
        }
    }

    async fn prepare(
        &self,
        mod_id: &ModId,
        pin: &DepotPin,
        working: &Path,
        mod_files: &Path,
        plan: &OverlayPlan,
    ) -> Result<DepotOutcome, DepotError> {
        let mut stages = Vec::new();
        let reused_copy = has_base_build(working, pin).await;

        if reused_copy {
            debug!("Depot copy for {} already holds {}", mod_id, pin);
        } else {
            stages.push(DepotStage::NoBaseBuild);
            let base = self.wait_for_base_build(pin).await?;
            stages.push(DepotStage::BaseBuildReady);

            info!("Copying base build {} to {}", pin, working.display());
            copy_tree_blocking(base, working.to_path_buf(), Overwrite::Always)
                .await
                .map_err(|source| DepotError::CopyFailed { path: working.to_path_buf(), source })?;

            let marker = working.join(BASE_MARKER);
            if let Err(source) = fs::write(&marker, pin.manifest_id.as_bytes()).await {
                return Err(DepotError::CopyFailed { path: marker, source });
            }
        }
        stages.push(DepotStage::ModCopyReady);

        overlay(mod_files, working).await?;
        stages.push(DepotStage::ModOverlaid);

        for (id, files) in plan.layers() {
            debug!("Overlaying supporting mod {} onto {}", id, mod_id);
            overlay(files, working).await?;
        }
        stages.push(DepotStage::Ready);

        Ok(DepotOutcome {
            path: working.to_path_buf(),
            stages,
            reused_copy,
        })
    }

    async fn wait_for_base_build(&self, pin: &DepotPin) -> Result<PathBuf, DepotError> {
        let unavailable = |reason: String| DepotError::BaseBuildUnavailable { pin: pin.clone(), reason };

        if let Some(dir) = self.provider.poll_ready(pin).await.map_err(|e| unavailable(format!("{:#}", e)))? {
            return Ok(dir);
        }

        info!("Requesting base build {}", pin);
        self.provider
            .request(pin)
            .await
            .map_err(|e| unavailable(format!("{:#}", e)))?;

        let deadline = Instant::now() + self.config.wait_timeout;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    warn!("Wait for base build {} cancelled", pin);
                    return Err(DepotError::Cancelled { pin: pin.clone() });
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            if let Some(dir) = self.provider.poll_ready(pin).await.map_err(|e| unavailable(format!("{:#}", e)))? {
                return Ok(dir);
            }
            if Instant::now() >= deadline {
                return Err(unavailable(format!(
                    "not ready after {}",
                    describe(self.config.wait_timeout)
                )));
            }
        }
    }

    /// Reset the shared cache before the first launch from `working_copy`
    ///
    /// The cache is copied to the backup location the first time (an existing
    /// backup is never replaced) and then deleted. Later launches from the
    /// same copy leave the cache alone.
    pub async fn prepare_first_launch(&self, working_copy: &Path) -> Result<Vec<CacheAction>, DepotError> {
        let marker = working_copy.join(LAUNCH_MARKER);
        if fs::try_exists(&marker).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let cache = &self.config.cache_dir;
        let backup = &self.config.cache_backup_dir;
        let reset = |path: &Path, source: std::io::Error| DepotError::CacheReset { path: path.to_path_buf(), source };
        let mut actions = Vec::new();

        if cache.is_dir() {
            if !backup.exists() {
                info!("Backing up {} to {}", cache.display(), backup.display());
                back_up(cache, backup).await?;
                actions.push(CacheAction::BackedUp { from: cache.clone(), to: backup.clone() });
            }

            info!("Deleting {} before first depot launch", cache.display());
            fs::remove_dir_all(cache).await.map_err(|e| reset(cache.as_path(), e))?;
            actions.push(CacheAction::Deleted { path: cache.clone() });
        }

        fs::write(&marker, b"").await.map_err(|e| reset(marker.as_path(), e))?;
        Ok(actions)
    }
}

/// Copy `cache` to `backup` through a staging sibling
///
/// `backup` only appears once the copy is complete, so a failed attempt never
/// looks like an existing backup.
async fn back_up(cache: &Path, backup: &Path) -> Result<(), DepotError> {
    let staging = staging_path(backup);
    let reset = |path: &Path, source: std::io::Error| DepotError::CacheReset { path: path.to_path_buf(), source };

    // Leftover from an interrupted attempt
    if let Some(warning) = remove_dir_observed(&staging) {
        return Err(reset(staging.as_path(), std::io::Error::other(warning.message)));
    }

    if let Err(e) = copy_tree_blocking(cache.to_path_buf(), staging.clone(), Overwrite::SkipExisting).await {
        return Err(reset(backup, e).with_cleanup(remove_dir_observed(&staging)));
    }
    if let Err(e) = fs::rename(&staging, backup).await {
        return Err(reset(backup, e).with_cleanup(remove_dir_observed(&staging)));
    }
    Ok(())
}

fn staging_path(backup: &Path) -> PathBuf {
    let mut name = backup.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    backup.with_file_name(name)
}

async fn has_base_build(working: &Path, pin: &DepotPin) -> bool {
    match fs::read_to_string(working.join(BASE_MARKER)).await {
        Ok(recorded) => recorded.trim() == pin.manifest_id,
        Err(_) => false,
    }
}

async fn overlay(files: &Path, working: &Path) -> Result<(), DepotError> {
    let stats = copy_tree_blocking(files.to_path_buf(), working.to_path_buf(), Overwrite::Always)
        .await
        .map_err(|source| DepotError::OverlayFailed { from: files.to_path_buf(), source })?;
    debug!("Overlaid {} files from {}", stats.files_copied, files.display());
    Ok(())
}

fn describe(duration: Duration) -> String {
    if duration.as_secs() > 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
