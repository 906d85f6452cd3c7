//! Configuration types for the installation pipeline

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::Level;

/// Prefix shared by every environment variable the installer reads
pub const ENV_PREFIX: &str = "MODINSTALLER_";

/// Errors raised while building configuration from the environment
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting {name}")]
    MissingVar { name: String },

    #[error("Invalid value '{value}' for {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

/// Configuration for the remote asset fetcher
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Total time allowed for a single request, body included
    pub timeout: Duration,
    pub user_agent: String,
    /// Write buffer size used while streaming a body to disk
    pub chunk_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            user_agent: concat!("mod-installer/", env!("CARGO_PKG_VERSION")).to_string(),
            chunk_size: 81_920,
        }
    }
}

/// Configuration for version-pinned depot copies
#[derive(Debug, Clone)]
pub struct DepotConfig {
    /// Directory holding one working copy per depot-requiring mod
    pub root: PathBuf,
    /// Host application's shared user-data cache
    pub cache_dir: PathBuf,
    /// One-time backup location for `cache_dir`
    pub cache_backup_dir: PathBuf,
    /// Upper bound on waiting for the base build to become ready
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
}

impl DepotConfig {
    pub fn new<P: Into<PathBuf>, C: Into<PathBuf>>(root: P, cache_dir: C) -> Self {
        let cache_dir = cache_dir.into();
        let cache_backup_dir = backup_path_for(&cache_dir);
        Self {
            root: root.into(),
            cache_dir,
            cache_backup_dir,
            wait_timeout: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Working copy directory for a mod
    pub fn working_dir(&self, mod_id: &str) -> PathBuf {
        self.root.join(mod_id.to_lowercase())
    }
}

fn backup_path_for(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cache".to_string());
    dir.with_file_name(format!("{}.backup", name))
}

/// Top-level configuration for the installer
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Primary installation tree of the host application
    pub game_root: PathBuf,
    /// Storage root following the `Mods/<modId>/` convention
    pub mods_root: PathBuf,
    /// Persisted installation state
    pub state_file: PathBuf,
    /// Scratch space for downloads; system temp dir when unset
    pub temp_dir: Option<PathBuf>,
    /// Plugin file extension without the dot
    pub plugin_extension: String,
    /// Plugin-framework root folder name
    pub framework_folder: String,
    /// Plugin-load directory, relative to an installation root
    pub plugin_dir: PathBuf,
    /// Host executable, relative to an installation root
    pub host_executable: PathBuf,
    pub log_level: Level,
    pub fetch: FetchConfig,
    pub depot: DepotConfig,
}

impl InstallerConfig {
    /// Build a configuration with the conventional layout under `game_root`
    pub fn new<P: Into<PathBuf>>(game_root: P) -> Self {
        let game_root = game_root.into();
        let mods_root = game_root.join("Mods");
        Self {
            state_file: mods_root.join("installed.json"),
            mods_root,
            temp_dir: None,
            plugin_extension: "dll".to_string(),
            framework_folder: "BepInEx".to_string(),
            plugin_dir: PathBuf::from("BepInEx").join("plugins"),
            host_executable: PathBuf::from(default_executable()),
            log_level: Level::INFO,
            fetch: FetchConfig::default(),
            depot: DepotConfig::new(game_root.join("Depots"), game_root.join("UserCache")),
            game_root,
        }
    }

    /// Storage directory for a mod
    pub fn storage_dir(&self, mod_id: &str) -> PathBuf {
        self.mods_root.join(mod_id)
    }

    /// Plugin-load directory inside the given installation root
    pub fn plugin_load_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.plugin_dir)
    }

    /// Load configuration from a `.env` file (if present) and the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Keys are the full variable names, e.g. `MODINSTALLER_GAME_ROOT`.
    /// Only the game root is required; everything else falls back to the
    /// layout produced by [`InstallerConfig::new`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            let name = format!("{}{}", ENV_PREFIX, suffix);
            lookup(&name).filter(|v| !v.trim().is_empty()).map(|v| (name, v))
        };

        let (_, game_root) = get("GAME_ROOT").ok_or_else(|| ConfigError::MissingVar {
            name: format!("{}GAME_ROOT", ENV_PREFIX),
        })?;
        let mut config = Self::new(game_root);

        if let Some((_, mods_root)) = get("MODS_ROOT") {
            config.mods_root = PathBuf::from(mods_root);
            config.state_file = config.mods_root.join("installed.json");
        }
        if let Some((_, state_file)) = get("STATE_FILE") {
            config.state_file = PathBuf::from(state_file);
        }
        if let Some((_, temp_dir)) = get("TEMP_DIR") {
            config.temp_dir = Some(PathBuf::from(temp_dir));
        }
        if let Some((_, executable)) = get("HOST_EXECUTABLE") {
            config.host_executable = PathBuf::from(executable);
        }
        if let Some((_, folder)) = get("FRAMEWORK_FOLDER") {
            config.framework_folder = folder;
        }
        if let Some((name, level)) = get("LOG_LEVEL") {
            config.log_level = level.parse().map_err(|_| ConfigError::InvalidValue {
                name,
                value: level.clone(),
                reason: "expected one of trace, debug, info, warn, error".to_string(),
            })?;
        }
        if let Some((name, secs)) = get("TIMEOUT_SECS") {
            config.fetch.timeout = Duration::from_secs(parse_number(&name, &secs)?);
        }
        if let Some((_, root)) = get("DEPOT_ROOT") {
            config.depot.root = PathBuf::from(root);
        }
        if let Some((_, cache_dir)) = get("CACHE_DIR") {
            config.depot.cache_dir = PathBuf::from(cache_dir);
            config.depot.cache_backup_dir = backup_path_for(&config.depot.cache_dir);
        }
        if let Some((_, backup)) = get("CACHE_BACKUP_DIR") {
            config.depot.cache_backup_dir = PathBuf::from(backup);
        }
        if let Some((name, secs)) = get("DEPOT_WAIT_SECS") {
            config.depot.wait_timeout = Duration::from_secs(parse_number(&name, &secs)?);
        }
        if let Some((name, millis)) = get("DEPOT_POLL_MS") {
            let millis = parse_number(&name, &millis)?;
            if millis == 0 {
                return Err(ConfigError::InvalidValue {
                    name,
                    value: millis.to_string(),
                    reason: "poll interval must be positive".to_string(),
                });
            }
            config.depot.poll_interval = Duration::from_millis(millis);
        }

        Ok(config)
    }
}

fn parse_number(name: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn default_executable() -> &'static str {
    if cfg!(windows) { "Game.exe" } else { "Game.x86_64" }
}
