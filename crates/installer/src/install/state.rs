//! Persisted installation state
//!
//! The only durable record the pipeline writes: which mod is installed at
//! which version. Saved atomically (temporary sibling, then rename).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use super::error::InstallError;
use crate::catalogue::ModId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationState {
    #[serde(default)]
    installed: BTreeMap<ModId, String>,
}

impl InstallationState {
    /// Load state from `path`; a missing file is an empty state
    pub async fn load(path: &Path) -> Result<Self, InstallError> {
        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No installation state at {}, starting empty", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(InstallError::io(path, e)),
        };

        serde_json::from_str(&raw).map_err(|e| InstallError::State {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub async fn save(&self, path: &Path) -> Result<(), InstallError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| InstallError::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| InstallError::State {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let temp = temp_path(path);
        fs::write(&temp, json).await.map_err(|e| InstallError::io(&temp, e))?;
        fs::rename(&temp, path).await.map_err(|e| InstallError::io(path, e))?;
        Ok(())
    }

    pub fn record<V: Into<String>>(&mut self, id: &ModId, version: V) {
        self.installed.insert(id.clone(), version.into());
    }

    pub fn remove(&mut self, id: &ModId) -> Option<String> {
        self.installed.remove(id)
    }

    pub fn version_of(&self, id: &ModId) -> Option<&str> {
        self.installed.get(id).map(String::as_str)
    }

    /// Identifier as it was recorded, keeping its original spelling
    pub fn recorded_id(&self, id: &ModId) -> Option<&ModId> {
        self.installed.get_key_value(id).map(|(key, _)| key)
    }

    pub fn is_installed(&self, id: &ModId) -> bool {
        self.installed.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModId, &str)> {
        self.installed.iter().map(|(id, v)| (id, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.installed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }

    /// Drop entries whose storage directory under `mods_root` no longer exists
    ///
    /// Identifiers that cannot name a folder under `mods_root` are dropped too.
    pub fn prune_missing(&mut self, mods_root: &Path) -> Vec<ModId> {
        let missing: Vec<ModId> = self
            .installed
            .keys()
            .filter(|id| !id.is_path_safe() || !mods_root.join(id.as_str()).is_dir())
            .cloned()
            .collect();

        for id in &missing {
            info!("{} is recorded as installed but its files are gone; forgetting it", id);
            self.installed.remove(id);
        }
        missing
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
