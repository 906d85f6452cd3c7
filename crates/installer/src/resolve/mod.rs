//! Dependency resolution
//!
//! Turns a mod's declared dependencies into an installation order in which
//! every dependency precedes the mods that need it. Cycles and missing
//! catalogue entries are errors; no edge is ever dropped to make a graph fit.

pub mod conflict;

pub use conflict::find_conflict;

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

use crate::catalogue::{Catalogue, Dependency, ModDescriptor, ModId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Dependency cycle detected: {}", join_path(.path))]
    Cycle { path: Vec<ModId> },

    #[error("'{id}' is required by '{required_by}' but is not in the catalogue")]
    MissingDependency { id: ModId, required_by: ModId },
}

fn join_path(path: &[ModId]) -> String {
    path.iter().map(ModId::as_str).collect::<Vec<_>>().join(" -> ")
}

/// One step of an installation order
#[derive(Debug, Clone)]
pub enum ResolvedDependency<'c> {
    Catalogued {
        descriptor: &'c ModDescriptor,
        version_hint: Option<String>,
        /// Already present; listed for completeness, nothing to install
        already_installed: bool,
    },
    Direct {
        url: String,
        file_name: String,
        required_by: ModId,
    },
}

impl ResolvedDependency<'_> {
    /// Short label for progress messages
    pub fn label(&self) -> &str {
        match self {
            ResolvedDependency::Catalogued { descriptor, .. } => &descriptor.name,
            ResolvedDependency::Direct { file_name, .. } => file_name,
        }
    }

    pub fn needs_install(&self) -> bool {
        match self {
            ResolvedDependency::Catalogued { already_installed, .. } => !already_installed,
            ResolvedDependency::Direct { .. } => true,
        }
    }
}

#[derive(Default)]
struct Walk<'c> {
    /// Identifiers on the current path, root first
    path: Vec<ModId>,
    visiting: HashSet<ModId>,
    visited: HashSet<ModId>,
    seen_urls: HashSet<String>,
    order: Vec<ResolvedDependency<'c>>,
}

/// Depth-first resolver over a catalogue
pub struct Resolver<'c> {
    catalogue: &'c Catalogue,
}

impl<'c> Resolver<'c> {
    pub fn new(catalogue: &'c Catalogue) -> Self {
        Self { catalogue }
    }

    /// Installation-ordered dependencies of `root`, excluding `root` itself
    ///
    /// Installed dependencies are listed but not descended into.
    pub fn resolve(&self, root: &ModDescriptor) -> Result<Vec<ResolvedDependency<'c>>, ResolveError> {
        let mut walk = Walk::default();
        walk.path.push(root.id.clone());
        walk.visiting.insert(root.id.clone());
        walk.visited.insert(root.id.clone());

        for dependency in &root.dependencies {
            self.visit(dependency, &root.id, &mut walk)?;
        }

        debug!(
            "Resolved {} dependencies for {}: [{}]",
            walk.order.len(),
            root.id,
            walk.order.iter().map(|d| d.label()).collect::<Vec<_>>().join(", ")
        );
        Ok(walk.order)
    }

    fn visit(&self, dependency: &Dependency, required_by: &ModId, walk: &mut Walk<'c>) -> Result<(), ResolveError> {
        let (id, version_hint) = match dependency {
            Dependency::ByDirectLocator { url, file_name } => {
                if walk.seen_urls.insert(url.clone()) {
                    walk.order.push(ResolvedDependency::Direct {
                        url: url.clone(),
                        file_name: file_name.clone(),
                        required_by: required_by.clone(),
                    });
                }
                return Ok(());
            }
            Dependency::ByModId { id, version_hint } => (id, version_hint),
        };

        if walk.visiting.contains(id) {
            let start = walk.path.iter().position(|p| p == id).unwrap_or(0);
            let mut cycle = walk.path[start..].to_vec();
            cycle.push(id.clone());
            return Err(ResolveError::Cycle { path: cycle });
        }
        if walk.visited.contains(id) {
            return Ok(());
        }

        let descriptor = self.catalogue.get(id).ok_or_else(|| ResolveError::MissingDependency {
            id: id.clone(),
            required_by: required_by.clone(),
        })?;

        if descriptor.is_installed() {
            walk.visited.insert(descriptor.id.clone());
            walk.order.push(ResolvedDependency::Catalogued {
                descriptor,
                version_hint: version_hint.clone(),
                already_installed: true,
            });
            return Ok(());
        }

        walk.visiting.insert(descriptor.id.clone());
        walk.path.push(descriptor.id.clone());

        for nested in &descriptor.dependencies {
            self.visit(nested, &descriptor.id, walk)?;
        }

        walk.path.pop();
        walk.visiting.remove(&descriptor.id);
        walk.visited.insert(descriptor.id.clone());
        walk.order.push(ResolvedDependency::Catalogued {
            descriptor,
            version_hint: version_hint.clone(),
            already_installed: false,
        });
        Ok(())
    }
}

/// Installed mods that declare `target` as a direct dependency, in catalogue order
///
/// `is_installed` decides what counts as installed, so the check can follow
/// recorded state even for versions the catalogue no longer lists.
pub fn installed_dependents<F>(catalogue: &Catalogue, target: &ModId, is_installed: F) -> Vec<ModId>
where
    F: Fn(&ModId) -> bool,
{
    catalogue
        .iter()
        .filter(|d| d.id != *target && is_installed(&d.id))
        .filter(|d| d.dependency_ids().any(|id| id == target))
        .map(|d| d.id.clone())
        .collect()
}
