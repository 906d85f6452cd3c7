//! Archive inspector and extractor
//!
//! Mod archives come in every shape: a bare plugin file, a flat set of files,
//! a single wrapping folder, or a full plugin-framework tree buried a few
//! folders deep. [`extract`] classifies the archive first (see [`layout`]) and
//! then writes each entry with the chosen prefix removed.
//!
//! Extraction is synchronous; async callers run it on a blocking thread.

pub mod error;
pub mod layout;

pub use error::ExtractError;
pub use layout::{ArchiveEntry, LayoutRules, PackageLayout, classify};

use std::fs;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use zip::ZipArchive;

use crate::catalogue::LayoutHint;
use crate::fsops::clear_readonly;

/// Inputs for [`extract`] besides the archive and destination
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions<'a> {
    pub hint: LayoutHint,
    /// File names or top-level folder names to leave out, compared ignoring case
    pub exclude: &'a [String],
    pub rules: LayoutRules<'a>,
}

/// Summary of a finished extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    pub layout: PackageLayout,
    /// Written files, relative to the destination
    pub written: Vec<PathBuf>,
    pub excluded: usize,
}

/// List the entries of a zip archive held in memory
pub fn inspect(archive: &[u8]) -> Result<Vec<ArchiveEntry>, ExtractError> {
    let mut zip = open(archive)?;
    read_entries(&mut zip)
}

/// Extract `archive` into `destination`
///
/// Fails with [`ExtractError::EmptyOrInvalidArchive`] for zero bytes, an
/// unreadable container or zero entries, and with [`ExtractError::CorruptEntry`]
/// as soon as any entry fails to decompress. Files written before a failure
/// are left in place; the caller owns cleanup of `destination`.
pub fn extract(archive: &[u8], destination: &Path, options: &ExtractOptions<'_>) -> Result<ExtractReport, ExtractError> {
    let mut zip = open(archive)?;
    let entries = read_entries(&mut zip)?;

    let layout = classify(&entries, options.hint, &options.rules);
    debug!("Archive layout for {}: {:?}", destination.display(), layout);

    fs::create_dir_all(destination).map_err(|e| ExtractError::io(destination, e))?;

    let mut written = Vec::new();
    let mut excluded = 0;

    for (index, entry) in entries.iter().enumerate() {
        if entry.is_dir {
            continue;
        }
        let Some(relative) = layout.relative_path(entry) else {
            continue;
        };
        let Some(relative) = sanitize(relative) else {
            warn!("Skipping unsafe archive path: {}", entry.path);
            continue;
        };
        if is_excluded(&relative, options.exclude) {
            debug!("Excluded archive entry: {}", entry.path);
            excluded += 1;
            continue;
        }

        let mut data = Vec::new();
        zip.by_index(index)
            .map_err(|e| ExtractError::corrupt(&entry.path, e))?
            .read_to_end(&mut data)
            .map_err(|e| ExtractError::corrupt(&entry.path, e))?;

        let target = destination.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| ExtractError::io(parent, e))?;
        }
        if target.exists() {
            clear_readonly(&target).map_err(|e| ExtractError::io(&target, e))?;
        }
        fs::write(&target, &data).map_err(|e| ExtractError::io(&target, e))?;
        written.push(relative);
    }

    debug!("Extracted {} files ({} excluded)", written.len(), excluded);
    Ok(ExtractReport { layout, written, excluded })
}

fn open(archive: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>, ExtractError> {
    if archive.is_empty() {
        return Err(ExtractError::empty("archive has zero bytes"));
    }
    let zip = ZipArchive::new(Cursor::new(archive)).map_err(|e| ExtractError::empty(e.to_string()))?;
    if zip.len() == 0 {
        return Err(ExtractError::empty("archive has no entries"));
    }
    Ok(zip)
}

fn read_entries(zip: &mut ZipArchive<Cursor<&[u8]>>) -> Result<Vec<ArchiveEntry>, ExtractError> {
    (0..zip.len())
        .map(|i| -> Result<ArchiveEntry, ExtractError> {
            let file = zip
                .by_index_raw(i)
                .map_err(|e| ExtractError::corrupt(&format!("#{}", i), e))?;
            Ok(ArchiveEntry::from_raw(file.name(), file.is_dir()))
        })
        .collect()
}

/// Reject absolute paths and parent traversal
fn sanitize(relative: &str) -> Option<PathBuf> {
    let path = Path::new(relative);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}

fn is_excluded(relative: &Path, exclude: &[String]) -> bool {
    if exclude.is_empty() {
        return false;
    }
    let matches = |name: Option<&std::ffi::OsStr>| {
        name.and_then(|n| n.to_str())
            .is_some_and(|n| exclude.iter().any(|x| x.eq_ignore_ascii_case(n)))
    };

    let leaf = relative.file_name();
    let mut components = relative.components();
    let top = components.next().map(|c| c.as_os_str());
    // Only a directory counts as a top-level folder match
    let top_is_dir = components.next().is_some();

    matches(leaf) || (top_is_dir && matches(top))
}
