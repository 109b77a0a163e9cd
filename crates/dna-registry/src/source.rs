//! Module sources: where catalog entries come from.
//!
//! The `ModuleSource` trait abstracts over places that can produce module
//! definitions. `LocalSource` reads TOML manifests from the filesystem:
//!
//! ```text
//! <root>/
//!   auth.toml
//!   payments.toml
//!   core.toml
//! ```
//!
//! Sources only produce modules; registering them is left to the caller so
//! that catalog writes stay behind a single exclusive lock.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RegistryError, Result};
use crate::module::Module;

/// Something that can produce module definitions.
pub trait ModuleSource: Send + Sync {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> String;

    /// Load every module this source provides.
    fn load(&self) -> Result<Vec<Module>>;
}

/// Where a set of module definitions lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "location")]
pub enum SourceDescriptor {
    /// A manifest file or a directory of manifests.
    Local(PathBuf),
    /// A remote registry URL.
    Remote(String),
    /// A package-manager package name.
    Package(String),
}

impl SourceDescriptor {
    /// Build a loadable source for this descriptor.
    ///
    /// Only local sources can be opened; remote and package sources report
    /// a [`RegistryError::Source`].
    pub fn open(&self) -> Result<Box<dyn ModuleSource>> {
        match self {
            SourceDescriptor::Local(path) => Ok(Box::new(LocalSource::new(path.clone()))),
            SourceDescriptor::Remote(url) => Err(RegistryError::Source {
                source_name: url.clone(),
                detail: "remote sources are not supported".to_string(),
            }),
            SourceDescriptor::Package(name) => Err(RegistryError::Source {
                source_name: name.clone(),
                detail: "package sources are not supported".to_string(),
            }),
        }
    }
}

/// Manifests on the local filesystem.
///
/// `path` may name a single manifest file or a directory whose `*.toml`
/// files are each one manifest. Subdirectories are not descended into.
#[derive(Debug, Clone)]
pub struct LocalSource {
    path: PathBuf,
}

impl LocalSource {
    /// Create a source rooted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LocalSource { path: path.into() }
    }

    /// The root path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn manifest_paths(&self) -> Result<Vec<PathBuf>> {
        if self.path.is_file() {
            return Ok(vec![self.path.clone()]);
        }
        if !self.path.is_dir() {
            return Err(self.error(format!("'{}' does not exist", self.path.display())));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn error(&self, detail: String) -> RegistryError {
        RegistryError::Source {
            source_name: self.name(),
            detail,
        }
    }
}

impl ModuleSource for LocalSource {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Vec<Module>> {
        let mut modules = Vec::new();
        for path in self.manifest_paths()? {
            let module = Module::load(&path).map_err(|e| self.error(format!("{}: {e}", path.display())))?;
            debug!(id = %module.id, version = %module.version(), path = %path.display(), "loaded manifest");
            modules.push(module);
        }
        Ok(modules)
    }
}

/// Load several independent sources in parallel.
///
/// Results come back in the same order as `sources`; the first failing
/// source aborts the whole load.
pub fn load_all(sources: &[Box<dyn ModuleSource>]) -> Result<Vec<Module>> {
    let results: Vec<Result<Vec<Module>>> = std::thread::scope(|scope| {
        let handles: Vec<_> = sources
            .iter()
            .map(|source| scope.spawn(move || source.load()))
            .collect();

        handles
            .into_iter()
            .zip(sources)
            .map(|(handle, source)| {
                handle.join().unwrap_or_else(|_| {
                    Err(RegistryError::Source {
                        source_name: source.name(),
                        detail: "loader thread panicked".to_string(),
                    })
                })
            })
            .collect()
    });

    let mut modules = Vec::new();
    for result in results {
        modules.extend(result?);
    }
    info!(sources = sources.len(), modules = modules.len(), "loaded module sources");
    Ok(modules)
}
