//! DNA module definitions and manifest parsing.
//!
//! A module is an immutable record: publishing a new version creates a new
//! `Module` value rather than mutating an existing one. Modules are usually
//! read from TOML manifests:
//!
//! ```toml
//! [module]
//! id = "auth"
//! name = "Authentication"
//! version = "1.0.0"
//! category = "authentication"
//!
//! [[dependencies]]
//! module = "core"
//!
//! [[frameworks]]
//! framework = "flutter"
//! supported = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ModuleConfig;
use crate::error::{RegistryError, Result};
use crate::version;

/// A versioned feature unit with declared dependencies, conflicts, and
/// per-framework support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Module id, unique within the catalog namespace.
    pub id: String,
    /// Descriptive metadata.
    pub metadata: ModuleMetadata,
    /// Declared dependencies.
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Declared conflicts.
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    /// Framework support declarations.
    #[serde(default)]
    pub frameworks: Vec<FrameworkSupport>,
    /// Configuration defaults and schema.
    #[serde(default)]
    pub config: ModuleConfig,
}

/// Descriptive module metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    /// Human-readable name.
    pub name: String,
    /// Dotted version (`MAJOR.MINOR.PATCH[-PRERELEASE]`).
    pub version: String,
    /// Functional category.
    #[serde(default)]
    pub category: Category,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Explicitly deprecated.
    #[serde(default)]
    pub deprecated: bool,
    /// Explicitly experimental.
    #[serde(default)]
    pub experimental: bool,
    /// Search keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Lifecycle stage.
    #[serde(default)]
    pub stage: LifecycleStage,
}

/// Functional module category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Authentication,
    Payments,
    Analytics,
    Monitoring,
    Alerting,
    Storage,
    Networking,
    Security,
    Ui,
    Testing,
    Infrastructure,
    #[default]
    Other,
}

/// Lifecycle stage of a module release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleStage {
    Alpha,
    Beta,
    #[default]
    Stable,
    Maintenance,
    Deprecated,
}

/// A dependency on another module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Id of the required module.
    #[serde(rename = "module")]
    pub module_id: String,
    /// Exact version wanted; `None` means the catalog's latest.
    #[serde(default)]
    pub version: Option<String>,
    /// Optional dependencies are never pulled in automatically.
    #[serde(default)]
    pub optional: bool,
    /// Why the dependency exists.
    #[serde(default)]
    pub reason: Option<String>,
}

/// A declared incompatibility with another module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Id of the conflicting module.
    #[serde(rename = "module")]
    pub module_id: String,
    /// Only this exact version conflicts; `None` means every version.
    #[serde(default)]
    pub version: Option<String>,
    /// Why the modules conflict.
    #[serde(default)]
    pub reason: String,
    /// Whether the conflict blocks composition.
    #[serde(default)]
    pub severity: ConflictSeverity,
    /// Suggested fix.
    #[serde(default)]
    pub resolution: Option<String>,
}

/// Severity of a declared conflict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictSeverity {
    #[default]
    Error,
    Warning,
}

/// Support declaration for one target framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkSupport {
    /// Framework name (e.g. "flutter", "react-native").
    pub framework: String,
    /// Whether the module works on this framework at all.
    #[serde(default)]
    pub supported: bool,
    /// Degree of support.
    #[serde(default)]
    pub compatibility: CompatibilityLevel,
    /// Known limitations.
    #[serde(default)]
    pub limitations: Vec<String>,
}

/// Degree of framework support.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompatibilityLevel {
    #[default]
    Full,
    Partial,
    None,
}

/// On-disk manifest shape: `[module]` header plus top-level sections.
#[derive(Debug, Deserialize)]
struct ModuleManifest {
    module: ManifestHeader,
    #[serde(default)]
    dependencies: Vec<Dependency>,
    #[serde(default)]
    conflicts: Vec<Conflict>,
    #[serde(default)]
    frameworks: Vec<FrameworkSupport>,
    #[serde(default)]
    config: ModuleConfig,
}

#[derive(Debug, Deserialize)]
struct ManifestHeader {
    id: String,
    #[serde(flatten)]
    metadata: ModuleMetadata,
}

impl Module {
    /// Create a stable module with empty declarations.
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        let id = id.into();
        Module {
            metadata: ModuleMetadata {
                name: id.clone(),
                version: version.into(),
                category: Category::Other,
                description: String::new(),
                deprecated: false,
                experimental: false,
                keywords: Vec::new(),
                stage: LifecycleStage::Stable,
            },
            id,
            dependencies: Vec::new(),
            conflicts: Vec::new(),
            frameworks: Vec::new(),
            config: ModuleConfig::default(),
        }
    }

    /// Add a non-optional dependency on the latest version of `module_id`.
    pub fn with_dependency(mut self, module_id: impl Into<String>) -> Self {
        self.dependencies.push(Dependency {
            module_id: module_id.into(),
            version: None,
            optional: false,
            reason: None,
        });
        self
    }

    /// Add an optional dependency.
    pub fn with_optional_dependency(mut self, module_id: impl Into<String>) -> Self {
        self.dependencies.push(Dependency {
            module_id: module_id.into(),
            version: None,
            optional: true,
            reason: None,
        });
        self
    }

    /// Declare a conflict with every version of `module_id`.
    pub fn with_conflict(mut self, module_id: impl Into<String>, severity: ConflictSeverity) -> Self {
        self.conflicts.push(Conflict {
            module_id: module_id.into(),
            version: None,
            reason: String::new(),
            severity,
            resolution: None,
        });
        self
    }

    /// Declare framework support.
    pub fn with_framework(mut self, framework: impl Into<String>, compatibility: CompatibilityLevel) -> Self {
        self.frameworks.push(FrameworkSupport {
            framework: framework.into(),
            supported: compatibility != CompatibilityLevel::None,
            compatibility,
            limitations: Vec::new(),
        });
        self
    }

    /// Replace the default configuration.
    pub fn with_defaults(mut self, defaults: Map<String, Value>) -> Self {
        self.config.defaults = defaults;
        self
    }

    /// The module version string.
    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Deprecated either explicitly or through its lifecycle stage.
    pub fn is_deprecated(&self) -> bool {
        self.metadata.deprecated || self.metadata.stage == LifecycleStage::Deprecated
    }

    /// Experimental either explicitly or through the alpha stage.
    pub fn is_experimental(&self) -> bool {
        self.metadata.experimental || self.metadata.stage == LifecycleStage::Alpha
    }

    /// Non-optional dependencies.
    pub fn required_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(|d| !d.optional)
    }

    /// The support declaration for `framework`, if any.
    pub fn framework_support(&self, framework: &str) -> Option<&FrameworkSupport> {
        self.frameworks.iter().find(|f| f.framework == framework)
    }

    /// Check registration invariants: well-formed metadata and no
    /// self-dependency.
    pub fn validate(&self) -> Result<()> {
        let invalid = |detail: String| RegistryError::InvalidMetadata {
            id: self.id.clone(),
            detail,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id is required".to_string()));
        }
        if self.metadata.name.trim().is_empty() {
            return Err(invalid("name is required".to_string()));
        }
        version::validate(&self.metadata.version).map_err(|e| invalid(format!("invalid version {e}")))?;

        for dep in &self.dependencies {
            if dep.module_id.trim().is_empty() {
                return Err(invalid("dependency with empty module id".to_string()));
            }
            if dep.module_id == self.id {
                return Err(RegistryError::SelfDependency { id: self.id.clone() });
            }
        }
        for conflict in &self.conflicts {
            if conflict.module_id.trim().is_empty() {
                return Err(invalid("conflict with empty module id".to_string()));
            }
        }
        Ok(())
    }

    /// Parse and validate a module from a TOML manifest.
    pub fn from_toml(input: &str) -> Result<Self> {
        let manifest: ModuleManifest = toml::from_str(input)?;
        let module = Module {
            id: manifest.module.id,
            metadata: manifest.module.metadata,
            dependencies: manifest.dependencies,
            conflicts: manifest.conflicts,
            frameworks: manifest.frameworks,
            config: manifest.config,
        };
        module.validate()?;
        Ok(module)
    }

    /// Load a module manifest from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}
