//! Transitive dependency resolution.
//!
//! Resolution is an iterative closure over non-optional dependencies using
//! an explicit FIFO work-list, so deep module graphs never hit recursion
//! limits. The resolved set keeps insertion order (requested modules first,
//! then dependencies in discovery order) which makes downstream ordering
//! deterministic.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::catalog::ModuleCatalog;
use crate::error::{RegistryError, Result};
use crate::module::{Dependency, Module};

/// The transitive closure of a requested module set.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSet {
    modules: Vec<Arc<Module>>,
    ids: HashSet<String>,
}

impl ResolvedSet {
    /// Modules in resolution order.
    pub fn modules(&self) -> &[Arc<Module>] {
        &self.modules
    }

    /// Whether a module id is part of the set.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Look up a resolved module by id.
    pub fn get(&self, id: &str) -> Option<&Arc<Module>> {
        self.modules.iter().find(|m| m.id == id)
    }

    /// Number of resolved modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether nothing was resolved.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Consume the set, returning modules in resolution order.
    pub fn into_modules(self) -> Vec<Arc<Module>> {
        self.modules
    }

    fn insert(&mut self, module: Arc<Module>) -> bool {
        if self.ids.insert(module.id.clone()) {
            self.modules.push(module);
            true
        } else {
            false
        }
    }
}

/// Find the catalog entry satisfying a dependency.
///
/// A pinned version matches only that exact registered version; an
/// unpinned dependency takes the catalog's latest module for the id.
pub fn lookup_dependency(catalog: &ModuleCatalog, dep: &Dependency) -> Option<Arc<Module>> {
    match dep.version.as_deref() {
        Some(version) => catalog.get_version(&dep.module_id, version),
        None => catalog.get(&dep.module_id),
    }
}

/// Resolve the transitive closure of `requested` against `catalog`.
///
/// Optional dependencies are never pulled in. A non-optional dependency
/// absent from the catalog, or pinned to an unregistered version, fails with
/// [`RegistryError::MissingDependency`].
/// When two paths reach the same id, the first one discovered wins.
pub fn resolve(requested: &[Arc<Module>], catalog: &ModuleCatalog) -> Result<ResolvedSet> {
    let mut resolved = ResolvedSet::default();
    let mut work: VecDeque<Arc<Module>> = VecDeque::new();

    for module in requested {
        if resolved.insert(module.clone()) {
            work.push_back(module.clone());
        }
    }

    while let Some(module) = work.pop_front() {
        for dep in module.required_dependencies() {
            if resolved.contains(&dep.module_id) {
                continue;
            }
            let found = lookup_dependency(catalog, dep).ok_or_else(|| RegistryError::MissingDependency {
                dependency: dep.module_id.clone(),
                version: dep.version.clone(),
                required_by: module.id.clone(),
            })?;
            debug!(dependency = %found.id, version = %found.version(), required_by = %module.id, "resolved dependency");
            resolved.insert(found.clone());
            work.push_back(found);
        }
    }

    Ok(resolved)
}
