//! In-memory module catalog.
//!
//! Every registered module is stored once under its composite
//! `(id, version)` key. A separate pointer map records which version is
//! "latest" for each id, according to the catalog's [`LatestPolicy`].

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RegistryError, Result};
use crate::events::{EventBus, LifecycleEvent};
use crate::module::Module;
use crate::version;

/// Composite catalog key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleKey {
    /// Module id.
    pub id: String,
    /// Exact version string.
    pub version: String,
}

impl ModuleKey {
    /// Build a key from id and version.
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        ModuleKey {
            id: id.into(),
            version: version.into(),
        }
    }
}

/// How the catalog picks the "latest" module for an id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LatestPolicy {
    /// The most recently registered version wins.
    #[default]
    LastRegistered,
    /// The highest version (by [`version::compare`]) wins.
    HighestVersion,
}

/// A catalog shared between composing readers and registering writers.
pub type SharedCatalog = Arc<RwLock<ModuleCatalog>>;

/// In-memory store of modules keyed by id and by `(id, version)`.
#[derive(Default)]
pub struct ModuleCatalog {
    modules: HashMap<ModuleKey, Arc<Module>>,
    latest: HashMap<String, String>,
    policy: LatestPolicy,
    events: EventBus,
}

impl ModuleCatalog {
    /// Create an empty catalog with the default latest policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty catalog with the given latest policy.
    pub fn with_policy(policy: LatestPolicy) -> Self {
        ModuleCatalog {
            policy,
            ..Self::default()
        }
    }

    /// Attach an event bus that receives registration notifications.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Wrap this catalog for shared readers–writer access.
    pub fn shared(self) -> SharedCatalog {
        Arc::new(RwLock::new(self))
    }

    /// The active latest policy.
    pub fn policy(&self) -> LatestPolicy {
        self.policy
    }

    /// Register a module.
    ///
    /// Rejects invalid metadata, self-dependencies, and an `(id, version)`
    /// pair that is already present.
    pub fn register(&mut self, module: Module) -> Result<()> {
        module.validate()?;

        let key = ModuleKey::new(&module.id, module.version());
        if self.modules.contains_key(&key) {
            return Err(RegistryError::DuplicateModule {
                id: key.id,
                version: key.version,
            });
        }

        let promote = match (self.policy, self.latest.get(&key.id)) {
            (_, None) | (LatestPolicy::LastRegistered, Some(_)) => true,
            (LatestPolicy::HighestVersion, Some(current)) => {
                version::compare(&key.version, current) == Ordering::Greater
            }
        };
        if promote {
            self.latest.insert(key.id.clone(), key.version.clone());
        }

        debug!(id = %key.id, version = %key.version, latest = promote, "registered module");
        self.events.emit(&LifecycleEvent::ModuleRegistered {
            id: key.id.clone(),
            version: key.version.clone(),
        });
        self.modules.insert(key, Arc::new(module));
        Ok(())
    }

    /// Register several modules, stopping at the first rejection.
    pub fn register_all(&mut self, modules: impl IntoIterator<Item = Module>) -> Result<usize> {
        let mut count = 0;
        for module in modules {
            self.register(module)?;
            count += 1;
        }
        Ok(count)
    }

    /// The latest module for `id`.
    pub fn get(&self, id: &str) -> Option<Arc<Module>> {
        let version = self.latest.get(id)?;
        self.get_version(id, version)
    }

    /// The module registered at exactly `(id, version)`.
    pub fn get_version(&self, id: &str, version: &str) -> Option<Arc<Module>> {
        self.modules.get(&ModuleKey::new(id, version)).cloned()
    }

    /// Whether any version of `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.latest.contains_key(id)
    }

    /// All registered versions of `id`, ascending.
    pub fn versions(&self, id: &str) -> Vec<String> {
        let mut versions: Vec<String> = self
            .modules
            .keys()
            .filter(|k| k.id == id)
            .map(|k| k.version.clone())
            .collect();
        versions.sort_by(|a, b| version::compare(a, b));
        versions
    }

    /// All module ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.latest.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Case-insensitive search over the latest version of each module.
    ///
    /// Matches id, name, description, and keywords. Results are sorted by id.
    pub fn search(&self, query: &str) -> Vec<Arc<Module>> {
        let query = query.to_lowercase();
        let mut results: Vec<Arc<Module>> = self
            .latest
            .keys()
            .filter_map(|id| self.get(id))
            .filter(|m| {
                m.id.to_lowercase().contains(&query)
                    || m.metadata.name.to_lowercase().contains(&query)
                    || m.metadata.description.to_lowercase().contains(&query)
                    || m.metadata
                        .keywords
                        .iter()
                        .any(|k| k.to_lowercase().contains(&query))
            })
            .collect();
        results.sort_by(|a, b| a.id.cmp(&b.id));
        results
    }

    /// Number of registered `(id, version)` records.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Remove every module.
    pub fn clear(&mut self) {
        info!(modules = self.modules.len(), "clearing module catalog");
        self.modules.clear();
        self.latest.clear();
        self.events.emit(&LifecycleEvent::CatalogCleared);
    }
}
