//! Filesystem helpers shared by the extractor and both installers
//!
//! Every recursive copy in the crate goes through [`copy_tree`], and every
//! cleanup goes through [`remove_dir_observed`] so failures end up in the log
//! and in the caller's outcome instead of vanishing.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

/// What to do when a destination file already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overwrite {
    Always,
    SkipExisting,
}

/// Options for [`copy_tree`]
pub struct CopyOptions<'a> {
    /// Returns `true` for source paths (relative to the source root) to leave out
    pub exclude: &'a dyn Fn(&Path) -> bool,
    pub overwrite: Overwrite,
}

fn exclude_nothing(_: &Path) -> bool {
    false
}

impl Default for CopyOptions<'_> {
    fn default() -> Self {
        Self {
            exclude: &exclude_nothing,
            overwrite: Overwrite::Always,
        }
    }
}

/// Totals reported by [`copy_tree`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CopyStats {
    pub files_copied: usize,
    pub files_skipped: usize,
    pub bytes_copied: u64,
    /// Destination paths of copied files, relative to the destination root
    pub written: Vec<PathBuf>,
}

/// Recursively copy `source` onto `target`
///
/// Directories are merged. Existing files follow `options.overwrite`; read-only
/// destinations are made writable first. An excluded directory prunes its
/// whole subtree. Symlinks are not followed.
pub fn copy_tree(source: &Path, target: &Path, options: &CopyOptions<'_>) -> io::Result<CopyStats> {
    let mut stats = CopyStats::default();
    fs::create_dir_all(target)?;

    let mut walker = WalkDir::new(source).follow_links(false).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?
            .to_path_buf();

        if (options.exclude)(&relative) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            stats.files_skipped += 1;
            continue;
        }

        let destination = target.join(&relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)?;
            continue;
        }

        if destination.exists() {
            if options.overwrite == Overwrite::SkipExisting {
                stats.files_skipped += 1;
                continue;
            }
            clear_readonly(&destination)?;
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        stats.bytes_copied += fs::copy(entry.path(), &destination)?;
        stats.files_copied += 1;
        stats.written.push(relative);
    }

    debug!(
        "Copied {} files ({} bytes) from {} to {}",
        stats.files_copied,
        stats.bytes_copied,
        source.display(),
        target.display()
    );
    Ok(stats)
}

/// [`copy_tree`] without exclusions, run on the blocking thread pool
pub async fn copy_tree_blocking(source: PathBuf, target: PathBuf, overwrite: Overwrite) -> io::Result<CopyStats> {
    tokio::task::spawn_blocking(move || {
        copy_tree(&source, &target, &CopyOptions { overwrite, ..Default::default() })
    })
    .await
    .map_err(io::Error::other)?
}

/// Make an existing file writable so it can be replaced or removed
#[allow(clippy::permissions_set_readonly_false)]
pub fn clear_readonly(path: &Path) -> io::Result<()> {
    let metadata = fs::metadata(path)?;
    let mut permissions = metadata.permissions();
    if permissions.readonly() {
        permissions.set_readonly(false);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

/// A cleanup step that did not complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not remove '{}': {}", self.path.display(), self.message)
    }
}

/// Remove a directory tree, returning a warning instead of an error on failure
///
/// A missing directory counts as success. Read-only files are made writable
/// and the removal is tried once more before giving up.
pub fn remove_dir_observed(path: &Path) -> Option<CleanupWarning> {
    if !path.exists() {
        return None;
    }

    let first = match fs::remove_dir_all(path) {
        Ok(()) => return None,
        Err(e) => e,
    };

    // Read-only leftovers are the common culprit; clear them and retry once
    for entry in WalkDir::new(path).into_iter().filter_map(Result::ok) {
        if entry.file_type().is_file() {
            let _ = clear_readonly(entry.path());
        }
    }
    match fs::remove_dir_all(path) {
        Ok(()) => None,
        Err(second) => {
            warn!(
                "Failed to remove {}: {} (first attempt: {})",
                path.display(),
                second,
                first
            );
            Some(CleanupWarning {
                path: path.to_path_buf(),
                message: second.to_string(),
            })
        }
    }
}

/// Remove a single file, returning a warning on failure
pub fn remove_file_observed(path: &Path) -> Option<CleanupWarning> {
    match fs::remove_file(path) {
        Ok(()) => None,
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Failed to remove {}: {}", path.display(), e);
            Some(CleanupWarning {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        }
    }
}
