//! Plugin-load deployment
//!
//! Before a launch from the primary tree, the selected mods' files are placed
//! where the plugin framework loads them from. Everything a deployment writes
//! is listed in a manifest next to the plugins, and the next deployment
//! removes exactly those files before writing its own.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalogue::ModId;
use crate::config::InstallerConfig;
use crate::fsops::{CleanupWarning, CopyOptions, copy_tree, remove_file_observed};

/// Manifest file name, stored inside the plugin-load directory
pub const DEPLOYMENT_MANIFEST: &str = ".deployed.json";

/// How a mod's storage directory is deployed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModStructure {
    /// Storage holds the framework folder; copied wholesale onto the root
    FullStructure,
    /// Only top-level plugin files are deployed into the plugin directory
    PluginOnly,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DeploymentManifest {
    mods: Vec<ModId>,
    /// Root-relative paths of every file written
    files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentReport {
    pub deployed: Vec<(ModId, ModStructure)>,
    /// Root-relative paths written by this deployment
    pub files: Vec<PathBuf>,
    /// Files of the previous deployment that were removed
    pub removed: usize,
    pub warnings: Vec<CleanupWarning>,
}

#[derive(Debug, Clone)]
pub struct Deployer {
    root: PathBuf,
    plugin_dir: PathBuf,
    framework_folder: String,
    plugin_extension: String,
}

impl Deployer {
    pub fn new<P: Into<PathBuf>>(root: P, config: &InstallerConfig) -> Self {
        Self {
            root: root.into(),
            plugin_dir: config.plugin_dir.clone(),
            framework_folder: config.framework_folder.clone(),
            plugin_extension: config.plugin_extension.clone(),
        }
    }

    pub fn detect_structure(&self, storage: &Path) -> ModStructure {
        let has_framework = fs::read_dir(storage)
            .map(|entries| {
                entries.filter_map(Result::ok).any(|entry| {
                    entry.file_type().is_ok_and(|t| t.is_dir())
                        && entry
                            .file_name()
                            .to_str()
                            .is_some_and(|name| name.eq_ignore_ascii_case(&self.framework_folder))
                })
            })
            .unwrap_or(false);

        if has_framework {
            ModStructure::FullStructure
        } else {
            ModStructure::PluginOnly
        }
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(&self.plugin_dir).join(DEPLOYMENT_MANIFEST)
    }

    /// Remove everything the previous deployment wrote
    pub fn clear(&self) -> io::Result<(usize, Vec<CleanupWarning>)> {
        let manifest_path = self.manifest_path();
        let raw = match fs::read_to_string(&manifest_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((0, Vec::new())),
            Err(e) => return Err(e),
        };
        let manifest: DeploymentManifest =
            serde_json::from_str(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut removed = 0;
        let mut warnings = Vec::new();
        for relative in &manifest.files {
            let path = self.root.join(relative);
            if !path.exists() {
                continue;
            }
            match remove_file_observed(&path) {
                None => removed += 1,
                Some(warning) => warnings.push(warning),
            }
        }
        warnings.extend(remove_file_observed(&manifest_path));

        debug!(
            "Cleared previous deployment of {} mods: {} files removed",
            manifest.mods.len(),
            removed
        );
        Ok((removed, warnings))
    }

    /// Replace the current deployment with `mods`, deployed in the given order
    ///
    /// Each entry is a mod identifier and its storage directory. Later mods
    /// overwrite earlier ones on collisions.
    pub fn deploy(&self, mods: &[(ModId, PathBuf)]) -> io::Result<DeploymentReport> {
        let (removed, warnings) = self.clear()?;
        let mut report = DeploymentReport {
            removed,
            warnings,
            ..Default::default()
        };

        let plugin_dir = self.root.join(&self.plugin_dir);
        fs::create_dir_all(&plugin_dir)?;

        for (id, storage) in mods {
            let structure = self.detect_structure(storage);
            match structure {
                ModStructure::FullStructure => {
                    let stats = copy_tree(storage, &self.root, &CopyOptions::default())?;
                    report.files.extend(stats.written);
                }
                ModStructure::PluginOnly => {
                    for file in self.top_level_plugins(storage)? {
                        let Some(name) = file.file_name() else { continue };
                        fs::copy(&file, plugin_dir.join(name))?;
                        report.files.push(self.plugin_dir.join(name));
                    }
                }
            }
            debug!("Deployed {} as {:?}", id, structure);
            report.deployed.push((id.clone(), structure));
        }

        report.files.sort();
        report.files.dedup();

        let manifest = DeploymentManifest {
            mods: report.deployed.iter().map(|(id, _)| id.clone()).collect(),
            files: report.files.clone(),
        };
        let json = serde_json::to_string_pretty(&manifest).map_err(io::Error::other)?;
        fs::write(self.manifest_path(), json)?;

        info!(
            "Deployed {} mods ({} files) into {}",
            report.deployed.len(),
            report.files.len(),
            self.root.display()
        );
        Ok(report)
    }

    fn top_level_plugins(&self, storage: &Path) -> io::Result<Vec<PathBuf>> {
        let mut plugins = Vec::new();
        for entry in fs::read_dir(storage)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let is_plugin = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(&self.plugin_extension));
            if is_plugin {
                plugins.push(path);
            }
        }
        plugins.sort();
        Ok(plugins)
    }
}
