//! Package layout classification
//!
//! Decides which path prefix, if any, to strip from every entry so that the
//! mod's files land at the right depth under the destination. The rules are
//! tried in order and the first match wins.

use crate::catalogue::LayoutHint;

/// One entry of an archive's table of contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path with `/` separators and no trailing slash
    pub path: String,
    pub is_dir: bool,
}

impl ArchiveEntry {
    /// Build an entry from a raw archive name, normalising separators
    pub fn from_raw(name: &str, is_dir: bool) -> Self {
        let normalized = name.replace('\\', "/");
        let is_dir = is_dir || normalized.ends_with('/');
        Self {
            path: normalized.trim_matches('/').to_string(),
            is_dir,
        }
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }

    pub fn leaf(&self) -> &str {
        self.segments().last().unwrap_or("")
    }
}

/// Names that drive classification
#[derive(Debug, Clone, Copy)]
pub struct LayoutRules<'a> {
    /// Plugin file extension without the dot, e.g. `dll`
    pub plugin_extension: &'a str,
    /// Plugin-framework root folder, e.g. `BepInEx`
    pub framework_folder: &'a str,
}

/// Derived classification of an archive's contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageLayout {
    /// A lone plugin file, extracted straight into the destination
    SingleFile { entry: String },
    FlatFiles,
    /// Every entry sits under one top-level folder
    RootedFolder { prefix: String },
    /// The framework folder sits under `prefix` in every entry that has it
    NestedFrameworkFolder { prefix: String },
}

impl PackageLayout {
    /// Prefix removed from entry paths during extraction
    pub fn strip_prefix(&self) -> &str {
        match self {
            PackageLayout::RootedFolder { prefix } | PackageLayout::NestedFrameworkFolder { prefix } => prefix,
            PackageLayout::SingleFile { .. } | PackageLayout::FlatFiles => "",
        }
    }

    /// Destination-relative path for an entry, `None` if it maps to nothing
    pub fn relative_path<'e>(&self, entry: &'e ArchiveEntry) -> Option<&'e str> {
        let relative = match self {
            PackageLayout::SingleFile { .. } => entry.leaf(),
            _ => {
                let prefix = self.strip_prefix();
                if !prefix.is_empty() && entry.path == prefix.trim_end_matches('/') {
                    ""
                } else {
                    entry.path.strip_prefix(prefix).unwrap_or(&entry.path)
                }
            }
        };
        let relative = relative.trim_start_matches('/');
        (!relative.is_empty()).then_some(relative)
    }
}

/// Classify an archive from its entry list
pub fn classify(entries: &[ArchiveEntry], hint: LayoutHint, rules: &LayoutRules<'_>) -> PackageLayout {
    if let Some(entry) = single_plugin_file(entries, rules) {
        return PackageLayout::SingleFile { entry };
    }

    if hint == LayoutHint::Nested {
        if let Some(prefix) = nested_framework_prefix(entries, rules.framework_folder) {
            return PackageLayout::NestedFrameworkFolder { prefix };
        }
    }

    if let Some(prefix) = single_root_folder(entries, rules.framework_folder) {
        return PackageLayout::RootedFolder { prefix };
    }

    PackageLayout::FlatFiles
}

fn has_segment(entry: &ArchiveEntry, name: &str) -> bool {
    entry.segments().any(|s| s.eq_ignore_ascii_case(name))
}

fn single_plugin_file(entries: &[ArchiveEntry], rules: &LayoutRules<'_>) -> Option<String> {
    let mut files = entries.iter().filter(|e| !e.is_dir);
    let only = files.next()?;
    if files.next().is_some() {
        return None;
    }

    let suffix = format!(".{}", rules.plugin_extension.to_ascii_lowercase());
    if !only.leaf().to_ascii_lowercase().ends_with(&suffix) {
        return None;
    }

    // An empty framework directory entry still disqualifies the shortcut
    if entries.iter().any(|e| has_segment(e, rules.framework_folder)) {
        return None;
    }
    Some(only.path.clone())
}

/// Prefix preceding the framework folder, trusted only if every occurrence agrees
fn nested_framework_prefix(entries: &[ArchiveEntry], framework_folder: &str) -> Option<String> {
    let mut prefix: Option<String> = None;

    for entry in entries {
        let segments: Vec<&str> = entry.segments().collect();
        let Some(index) = segments.iter().position(|s| s.eq_ignore_ascii_case(framework_folder)) else {
            continue;
        };

        let candidate = if index == 0 {
            String::new()
        } else {
            format!("{}/", segments[..index].join("/"))
        };

        match &prefix {
            None => prefix = Some(candidate),
            Some(existing) if *existing == candidate => {}
            Some(_) => return None,
        }
    }

    prefix
}

/// Shared top-level folder, as `name/`, when no file sits at the archive root
fn single_root_folder(entries: &[ArchiveEntry], framework_folder: &str) -> Option<String> {
    let mut root: Option<&str> = None;

    for entry in entries {
        let mut segments = entry.segments();
        let first = segments.next()?;
        let is_root_file = !entry.is_dir && segments.next().is_none();
        if is_root_file {
            return None;
        }

        match root {
            None => root = Some(first),
            Some(existing) if existing == first => {}
            Some(_) => return None,
        }
    }

    // Stripping the framework folder itself would flatten the structure it signals
    let root = root?;
    if root.eq_ignore_ascii_case(framework_folder) {
        return None;
    }
    Some(format!("{}/", root))
}
