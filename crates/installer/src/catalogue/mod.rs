//! Read-only mod catalogue types
//!
//! The catalogue is fetched once per session by the host and handed to the
//! pipeline as an immutable input. Nothing in here touches the filesystem.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Case-insensitive mod identifier
///
/// The original spelling is kept for display and storage paths; equality,
/// hashing and ordering ignore ASCII case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModId(String);

impl ModId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier can name a single directory under a storage root
    pub fn is_path_safe(&self) -> bool {
        is_single_segment(&self.0)
    }

    fn folded(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.bytes().map(|b| b.to_ascii_lowercase())
    }
}

impl PartialEq for ModId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for ModId {}

impl Hash for ModId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.folded() {
            state.write_u8(b);
        }
        state.write_u8(0xff);
    }
}

impl PartialOrd for ModId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.folded().cmp(other.folded())
    }
}

impl fmt::Display for ModId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ModId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// How the extractor should look for a plugin-framework folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutHint {
    #[default]
    Auto,
    Nested,
}

/// Host application build a mod is pinned to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepotPin {
    pub manifest_id: String,
    pub version: String,
}

impl fmt::Display for DepotPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (manifest {})", self.version, self.manifest_id)
    }
}

/// One downloadable release of a mod
///
/// Immutable once built; a refreshed catalogue produces new instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModVersion {
    label: String,
    #[serde(default)]
    game_build: Option<String>,
    download_url: String,
    /// Release time, seconds since the Unix epoch
    #[serde(default)]
    released_at: u64,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    installed: bool,
    /// xxHash64 of the download, base64 of the little-endian bytes
    #[serde(default)]
    checksum: Option<String>,
}

impl ModVersion {
    pub fn new<L: Into<String>, U: Into<String>>(label: L, download_url: U) -> Self {
        Self {
            label: label.into(),
            game_build: None,
            download_url: download_url.into(),
            released_at: 0,
            prerelease: false,
            installed: false,
            checksum: None,
        }
    }

    pub fn with_game_build<S: Into<String>>(mut self, build: S) -> Self {
        self.game_build = Some(build.into());
        self
    }

    pub fn with_released_at(mut self, released_at: u64) -> Self {
        self.released_at = released_at;
        self
    }

    pub fn with_prerelease(mut self, prerelease: bool) -> Self {
        self.prerelease = prerelease;
        self
    }

    pub fn with_installed(mut self, installed: bool) -> Self {
        self.installed = installed;
        self
    }

    pub fn with_checksum<S: Into<String>>(mut self, checksum: S) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn game_build(&self) -> Option<&str> {
        self.game_build.as_deref()
    }

    pub fn download_url(&self) -> &str {
        &self.download_url
    }

    pub fn released_at(&self) -> u64 {
        self.released_at
    }

    pub fn is_prerelease(&self) -> bool {
        self.prerelease
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }
}

/// Non-empty, not `.` or `..`, and free of path and drive separators
fn is_single_segment(name: &str) -> bool {
    !name.trim().is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', ':'])
}

/// Direct files are stored under a folder named after their stem, so both must be plain
fn is_plain_file_name(name: &str) -> bool {
    let stem = std::path::Path::new(name).file_stem().and_then(|s| s.to_str());
    is_single_segment(name) && stem.is_some_and(is_single_segment)
}

/// A declared requirement of one mod on another artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dependency {
    /// Another catalogue entry, optionally at a preferred version
    ByModId {
        id: ModId,
        #[serde(default)]
        version_hint: Option<String>,
    },
    /// A file fetched straight from a URL and stored under `file_name`
    ByDirectLocator { url: String, file_name: String },
}

impl Dependency {
    pub fn on<I: Into<ModId>>(id: I) -> Self {
        Dependency::ByModId { id: id.into(), version_hint: None }
    }

    pub fn on_version<I: Into<ModId>, V: Into<String>>(id: I, version: V) -> Self {
        Dependency::ByModId { id: id.into(), version_hint: Some(version.into()) }
    }

    pub fn direct<U: Into<String>, F: Into<String>>(url: U, file_name: F) -> Self {
        Dependency::ByDirectLocator { url: url.into(), file_name: file_name.into() }
    }
}

/// Catalogue entry for one mod
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModDescriptor {
    pub id: ModId,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub incompatible: Vec<ModId>,
    #[serde(default)]
    pub versions: Vec<ModVersion>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub layout: LayoutHint,
    /// File or top-level folder names never extracted from this mod's archives
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub depot: Option<DepotPin>,
}

impl ModDescriptor {
    pub fn new<I: Into<ModId>, N: Into<String>>(id: I, name: N) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: String::new(),
            incompatible: Vec::new(),
            versions: Vec::new(),
            dependencies: Vec::new(),
            layout: LayoutHint::Auto,
            exclude: Vec::new(),
            depot: None,
        }
    }

    pub fn with_version(mut self, version: ModVersion) -> Self {
        self.versions.push(version);
        self
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_incompatible<I: Into<ModId>>(mut self, id: I) -> Self {
        self.incompatible.push(id.into());
        self
    }

    pub fn with_layout(mut self, layout: LayoutHint) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_exclude<S: Into<String>>(mut self, name: S) -> Self {
        self.exclude.push(name.into());
        self
    }

    pub fn with_depot(mut self, pin: DepotPin) -> Self {
        self.depot = Some(pin);
        self
    }

    pub fn is_installed(&self) -> bool {
        self.versions.iter().any(ModVersion::is_installed)
    }

    pub fn installed_version(&self) -> Option<&ModVersion> {
        self.versions.iter().find(|v| v.is_installed())
    }

    pub fn version(&self, label: &str) -> Option<&ModVersion> {
        self.versions.iter().find(|v| v.label().eq_ignore_ascii_case(label))
    }

    /// Newest stable release, or the newest pre-release when no stable one exists
    pub fn latest(&self) -> Option<&ModVersion> {
        newest(self.versions.iter().filter(|v| !v.is_prerelease()))
            .or_else(|| newest(self.versions.iter()))
    }

    /// Version matching `hint` when it names one, otherwise [`ModDescriptor::latest`]
    pub fn pick_version(&self, hint: Option<&str>) -> Option<&ModVersion> {
        hint.and_then(|h| self.version(h)).or_else(|| self.latest())
    }

    pub fn declares_incompatible(&self, other: &ModId) -> bool {
        self.incompatible.iter().any(|id| id == other)
    }

    pub fn requires_depot(&self) -> bool {
        self.depot.is_some()
    }

    /// Catalogued dependency identifiers, in declaration order
    pub fn dependency_ids(&self) -> impl Iterator<Item = &ModId> {
        self.dependencies.iter().filter_map(|d| match d {
            Dependency::ByModId { id, .. } => Some(id),
            Dependency::ByDirectLocator { .. } => None,
        })
    }
}

/// Ties go to the entry listed first
fn newest<'a, I: Iterator<Item = &'a ModVersion>>(versions: I) -> Option<&'a ModVersion> {
    versions.fold(None, |best: Option<&ModVersion>, v| match best {
        Some(b) if b.released_at() >= v.released_at() => Some(b),
        _ => Some(v),
    })
}

#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("Mod identifier '{id}' appears more than once in the catalogue")]
    DuplicateId { id: ModId },

    #[error("Mod identifier '{id}' cannot be used as a folder name")]
    InvalidId { id: ModId },

    #[error("Dependency file name '{file_name}' of '{required_by}' cannot be used as a file name")]
    InvalidFileName { file_name: String, required_by: ModId },

    #[error("Catalogue JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// In-memory catalogue indexed by case-insensitive identifier
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    mods: Vec<ModDescriptor>,
    index: HashMap<ModId, usize>,
}

impl Catalogue {
    pub fn new(mods: Vec<ModDescriptor>) -> Result<Self, CatalogueError> {
        let mut index = HashMap::with_capacity(mods.len());
        for (i, descriptor) in mods.iter().enumerate() {
            if !descriptor.id.is_path_safe() {
                return Err(CatalogueError::InvalidId { id: descriptor.id.clone() });
            }
            let unsafe_file = descriptor.dependencies.iter().find_map(|d| match d {
                Dependency::ByDirectLocator { file_name, .. } if !is_plain_file_name(file_name) => Some(file_name),
                _ => None,
            });
            if let Some(file_name) = unsafe_file {
                return Err(CatalogueError::InvalidFileName {
                    file_name: file_name.clone(),
                    required_by: descriptor.id.clone(),
                });
            }
            if index.insert(descriptor.id.clone(), i).is_some() {
                return Err(CatalogueError::DuplicateId { id: descriptor.id.clone() });
            }
        }
        Ok(Self { mods, index })
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogueError> {
        let mods: Vec<ModDescriptor> = serde_json::from_str(json)?;
        Self::new(mods)
    }

    pub fn get(&self, id: &ModId) -> Option<&ModDescriptor> {
        self.index.get(id).map(|&i| &self.mods[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModDescriptor> {
        self.mods.iter()
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    /// Rebuild the catalogue with installed flags taken from `installed_version`
    ///
    /// Versions are recreated rather than mutated; a mod counts as installed at
    /// the version whose label matches the recorded one.
    pub fn with_installed_versions<F>(&self, installed_version: F) -> Self
    where
        F: Fn(&ModId) -> Option<String>,
    {
        let mods = self
            .mods
            .iter()
            .map(|descriptor| {
                let recorded = installed_version(&descriptor.id);
                let mut rebuilt = descriptor.clone();
                rebuilt.versions = descriptor
                    .versions
                    .iter()
                    .map(|v| {
                        let installed = recorded
                            .as_deref()
                            .is_some_and(|label| v.label().eq_ignore_ascii_case(label));
                        v.clone().with_installed(installed)
                    })
                    .collect();
                rebuilt
            })
            .collect();
        Self { mods, index: self.index.clone() }
    }
}
