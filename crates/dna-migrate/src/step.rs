//! Migration step definitions and their registry.
//!
//! Steps are stored per `(module id, target version)` and are usually
//! loaded from a TOML file of `[[migration]]` entries:
//!
//! ```toml
//! [[migration]]
//! module = "auth"
//! version = "2.0.0"
//! description = "Move sessions to the token store"
//! breaking = true
//! automated = true
//! script = "./scripts/migrate-sessions.sh"
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MigrateError, Result};

/// One upgrade action. `version` is the version the step upgrades *to*.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub version: String,
    pub description: String,
    /// A failing breaking step halts the run.
    #[serde(default)]
    pub breaking: bool,
    /// Run `script` instead of handing `instructions` to a human.
    #[serde(default)]
    pub automated: bool,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
}

impl MigrationStep {
    /// An automated step running `script`.
    pub fn automated(version: impl Into<String>, description: impl Into<String>, script: impl Into<String>) -> Self {
        MigrationStep {
            version: version.into(),
            description: description.into(),
            breaking: false,
            automated: true,
            script: Some(script.into()),
            instructions: Vec::new(),
        }
    }

    /// A manual step carrying instructions for a human.
    pub fn manual<I, S>(version: impl Into<String>, description: impl Into<String>, instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MigrationStep {
            version: version.into(),
            description: description.into(),
            breaking: false,
            automated: false,
            script: None,
            instructions: instructions.into_iter().map(Into::into).collect(),
        }
    }

    /// Mark the step as breaking.
    pub fn breaking(mut self) -> Self {
        self.breaking = true;
        self
    }
}

/// Composite registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StepKey {
    module_id: String,
    version: String,
}

#[derive(Debug, Deserialize)]
struct MigrationFile {
    #[serde(default)]
    migration: Vec<MigrationEntry>,
}

#[derive(Debug, Deserialize)]
struct MigrationEntry {
    module: String,
    #[serde(flatten)]
    step: MigrationStep,
}

/// Registered migration steps for every module.
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    steps: HashMap<StepKey, Vec<MigrationStep>>,
}

impl MigrationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step for `module_id`.
    ///
    /// Several steps may share a version; they run in registration order.
    pub fn register_step(&mut self, module_id: &str, step: MigrationStep) -> Result<()> {
        let invalid = |detail: String| MigrateError::InvalidStep {
            module_id: module_id.to_string(),
            detail,
        };
        if module_id.trim().is_empty() {
            return Err(invalid("module id must not be empty".to_string()));
        }
        dna_registry::version::validate(&step.version).map_err(invalid)?;
        if step.automated && step.script.as_deref().map_or(true, |s| s.trim().is_empty()) {
            return Err(invalid(format!("automated step {} has no script", step.version)));
        }

        debug!(module = module_id, version = %step.version, breaking = step.breaking, "registered migration step");
        self.steps
            .entry(StepKey {
                module_id: module_id.to_string(),
                version: step.version.clone(),
            })
            .or_default()
            .push(step);
        Ok(())
    }

    /// Register every `[[migration]]` entry in a TOML document.
    pub fn load_toml(&mut self, input: &str) -> Result<usize> {
        let file: MigrationFile = toml::from_str(input)?;
        let count = file.migration.len();
        for entry in file.migration {
            self.register_step(&entry.module, entry.step)?;
        }
        Ok(count)
    }

    /// Register the steps in a TOML file.
    pub fn load(&mut self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)?;
        self.load_toml(&content)
    }

    /// `(version, steps)` pairs registered for one module, unordered.
    pub fn module_steps<'a>(&'a self, module_id: &'a str) -> impl Iterator<Item = (&'a str, &'a [MigrationStep])> + 'a {
        self.steps
            .iter()
            .filter(move |(key, _)| key.module_id == module_id)
            .map(|(key, steps)| (key.version.as_str(), steps.as_slice()))
    }

    /// Total number of registered steps.
    pub fn len(&self) -> usize {
        self.steps.values().map(Vec::len).sum()
    }

    /// Whether no steps are registered.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
