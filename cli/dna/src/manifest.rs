//! `dna.toml` manifest parsing and project configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dna_migrate::ExecutorConfig;
use dna_registry::{CompositionPolicy, LatestPolicy, ModuleRequest};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The top-level manifest structure for a DNA project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnaManifest {
    /// Project metadata (required).
    pub project: ProjectConfig,
    /// Where module manifests are loaded from.
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Composition policy.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Modules composed by default.
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
    /// Settings seeded at the top level of the merged config.
    #[serde(default)]
    pub global: Map<String, Value>,
    /// Migration step files and timeouts.
    #[serde(default)]
    pub migrations: MigrationsConfig,
    /// Log filter.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Project metadata section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (required).
    pub name: String,
    /// Target framework, e.g. `flutter`.
    #[serde(default)]
    pub framework: Option<String>,
    /// Project template type.
    #[serde(default = "default_template")]
    pub template: String,
}

fn default_template() -> String {
    "default".to_string()
}

/// Catalog section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Manifest files or directories, relative to the project directory.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

/// Policy section.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PolicyConfig {
    #[serde(default)]
    pub latest: LatestPolicy,
    #[serde(flatten)]
    pub composition: CompositionPolicy,
}

/// One `[[modules]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl ModuleEntry {
    pub fn to_request(&self) -> ModuleRequest {
        ModuleRequest {
            module_id: self.id.clone(),
            version: self.version.clone(),
            config_override: self.config.clone(),
        }
    }
}

/// Migrations section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MigrationsConfig {
    /// Migration step files, relative to the project directory.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    #[serde(default = "default_script_timeout")]
    pub script_timeout_secs: u64,
    #[serde(default = "default_backup_timeout")]
    pub backup_timeout_secs: u64,
}

fn default_script_timeout() -> u64 {
    300
}

fn default_backup_timeout() -> u64 {
    600
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        MigrationsConfig {
            paths: Vec::new(),
            script_timeout_secs: default_script_timeout(),
            backup_timeout_secs: default_backup_timeout(),
        }
    }
}

impl MigrationsConfig {
    /// Executor timeouts from this section.
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            script_timeout: Duration::from_secs(self.script_timeout_secs),
            backup_timeout: Duration::from_secs(self.backup_timeout_secs),
        }
    }
}

/// Logging section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `"dna_registry=debug"`.
    #[serde(default)]
    pub filter: Option<String>,
}

impl DnaManifest {
    /// Search upward from `start_dir` for a `dna.toml` file, parse and return it
    /// along with the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join("dna.toml");
            if candidate.is_file() {
                let content = std::fs::read_to_string(&candidate)
                    .with_context(|| format!("reading {}", candidate.display()))?;
                let manifest: DnaManifest = toml::from_str(&content)
                    .with_context(|| format!("parsing {}", candidate.display()))?;
                return Ok(Some((manifest, dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// Parse a manifest from a TOML string.
    #[cfg(test)]
    pub fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing dna.toml")
    }

    /// Catalog paths resolved against the project directory.
    pub fn catalog_paths(&self, project_dir: &Path) -> Vec<PathBuf> {
        self.catalog.paths.iter().map(|p| project_dir.join(p)).collect()
    }

    /// Migration file paths resolved against the project directory.
    pub fn migration_paths(&self, project_dir: &Path) -> Vec<PathBuf> {
        self.migrations.paths.iter().map(|p| project_dir.join(p)).collect()
    }

    /// The `[[modules]]` entry for `id`, if any.
    pub fn module(&self, id: &str) -> Option<&ModuleEntry> {
        self.modules.iter().find(|m| m.id == id)
    }
}
