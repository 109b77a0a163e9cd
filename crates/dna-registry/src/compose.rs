//! Composition engine: request in, validated and ordered result out.
//!
//! The pipeline runs in stages with partial short-circuiting:
//!
//! 1. look up each requested module (not found, deprecated, experimental)
//! 2. stop here if any blocking error was recorded
//! 3. resolve the transitive closure
//! 4. order the resolved set
//! 5. check conflicts and framework support (both always run)
//! 6. merge configuration, then validate merged configs
//!
//! Blocking problems become diagnostics on the result; `compose_dna` only
//! returns `Err` for a malformed request or a poisoned catalog lock.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::catalog::{ModuleCatalog, SharedCatalog};
use crate::config::{merge_configs, validate_config};
use crate::conflict::check_conflicts;
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::error::{RegistryError, Result};
use crate::events::{EventBus, LifecycleEvent};
use crate::framework::{check_frameworks, supported_frameworks};
use crate::module::Module;
use crate::order::order;
use crate::resolution::resolve;

/// One requested module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleRequest {
    /// Module id.
    pub module_id: String,
    /// Exact version; `None` selects the catalog's latest.
    #[serde(default)]
    pub version: Option<String>,
    /// Shallow override of the module's default config.
    #[serde(default)]
    pub config_override: Map<String, Value>,
}

impl ModuleRequest {
    /// Request the latest version of `module_id`.
    pub fn latest(module_id: impl Into<String>) -> Self {
        ModuleRequest {
            module_id: module_id.into(),
            ..Default::default()
        }
    }

    /// Request an exact version of `module_id`.
    pub fn exact(module_id: impl Into<String>, version: impl Into<String>) -> Self {
        ModuleRequest {
            module_id: module_id.into(),
            version: Some(version.into()),
            ..Default::default()
        }
    }

    /// Attach a config override.
    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config_override = config;
        self
    }
}

/// A composition request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    /// Requested modules.
    pub modules: Vec<ModuleRequest>,
    /// Target framework.
    pub framework: String,
    /// Project template type.
    #[serde(default)]
    pub template_type: String,
    /// Settings seeded at the top level of the merged config.
    #[serde(default)]
    pub global_config: Map<String, Value>,
}

impl Composition {
    /// A request for `modules` (latest versions) on `framework`.
    pub fn new<I, S>(framework: impl Into<String>, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Composition {
            modules: modules.into_iter().map(ModuleRequest::latest).collect(),
            framework: framework.into(),
            template_type: "default".to_string(),
            global_config: Map::new(),
        }
    }

    fn override_for(&self, module_id: &str) -> Option<&Map<String, Value>> {
        self.modules
            .iter()
            .find(|r| r.module_id == module_id)
            .map(|r| &r.config_override)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |detail: &str| RegistryError::InvalidRequest {
            detail: detail.to_string(),
        };
        if self.modules.is_empty() {
            return Err(invalid("no modules requested"));
        }
        if self.framework.trim().is_empty() {
            return Err(invalid("framework is required"));
        }
        if self.modules.iter().any(|r| r.module_id.trim().is_empty()) {
            return Err(invalid("module id must not be empty"));
        }
        Ok(())
    }
}

/// Policy knobs for composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CompositionPolicy {
    /// Accept experimental modules.
    #[serde(default)]
    pub allow_experimental: bool,
    /// Check conflict declarations in both directions.
    #[serde(default = "default_true")]
    pub symmetric_conflicts: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CompositionPolicy {
    fn default() -> Self {
        CompositionPolicy {
            allow_experimental: false,
            symmetric_conflicts: true,
        }
    }
}

/// Cost figures for one composition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Performance {
    /// Wall time in microseconds.
    pub time_us: u64,
    /// Estimated in-memory size of the resolved modules, in bytes.
    pub memory_bytes: usize,
    /// Weighted size of the module graph.
    pub complexity: u64,
}

/// Outcome of a composition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompositionResult {
    /// No blocking diagnostic was recorded.
    pub valid: bool,
    /// Module ids as requested.
    pub requested: Vec<String>,
    /// Resolved modules in build order.
    pub modules: Vec<Module>,
    /// Blocking diagnostics.
    pub errors: Vec<Diagnostic>,
    /// Non-blocking diagnostics.
    pub warnings: Vec<Diagnostic>,
    /// Module ids in build order.
    pub dependency_order: Vec<String>,
    /// Global settings plus one merged config object per module id.
    pub merged_config: Map<String, Value>,
    pub performance: Performance,
}

impl CompositionResult {
    /// The merged config object for one module.
    pub fn module_config(&self, module_id: &str) -> Option<&Map<String, Value>> {
        self.merged_config.get(module_id).and_then(Value::as_object)
    }

    /// Whether any error of `kind` was recorded.
    pub fn has_error(&self, kind: DiagnosticKind) -> bool {
        self.errors.iter().any(|d| d.kind == kind)
    }
}

/// Weighted graph size:
/// `modules*10 + Σ(deps*5 + conflicts*3) + distinct supported frameworks*15`.
pub fn complexity(modules: &[Arc<Module>]) -> u64 {
    let per_module: u64 = modules
        .iter()
        .map(|m| m.dependencies.len() as u64 * 5 + m.conflicts.len() as u64 * 3)
        .sum();
    modules.len() as u64 * 10 + per_module + supported_frameworks(modules).len() as u64 * 15
}

fn estimated_footprint(modules: &[Arc<Module>]) -> usize {
    modules
        .iter()
        .map(|m| {
            std::mem::size_of::<Module>()
                + m.id.len()
                + m.metadata.name.len()
                + m.metadata.version.len()
                + m.metadata.description.len()
                + m.metadata.keywords.iter().map(String::len).sum::<usize>()
                + m.dependencies.len() * std::mem::size_of::<crate::module::Dependency>()
                + m.conflicts.len() * std::mem::size_of::<crate::module::Conflict>()
                + m.frameworks.len() * std::mem::size_of::<crate::module::FrameworkSupport>()
        })
        .sum()
}

/// Stages 3–6 output.
struct Pipeline {
    ordered: Vec<Arc<Module>>,
    merged_config: Map<String, Value>,
}

/// Orchestrates lookup, resolution, ordering, validation, and config merge.
pub struct CompositionEngine {
    catalog: SharedCatalog,
    policy: CompositionPolicy,
    events: EventBus,
}

impl CompositionEngine {
    /// Create an engine over a shared catalog with the default policy.
    pub fn new(catalog: SharedCatalog) -> Self {
        CompositionEngine {
            catalog,
            policy: CompositionPolicy::default(),
            events: EventBus::new(),
        }
    }

    /// Replace the composition policy.
    pub fn with_policy(mut self, policy: CompositionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attach an event bus.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// The shared catalog this engine reads.
    pub fn catalog(&self) -> &SharedCatalog {
        &self.catalog
    }

    /// Compose a module set.
    ///
    /// Holds a read lock on the catalog for the whole composition, so
    /// registrations wait until it finishes.
    pub fn compose_dna(&self, request: &Composition) -> Result<CompositionResult> {
        request.validate()?;
        let start = Instant::now();

        let requested: Vec<String> = request.modules.iter().map(|r| r.module_id.clone()).collect();
        info!(modules = ?requested, framework = %request.framework, "composing modules");
        self.events.emit(&LifecycleEvent::CompositionStarted {
            modules: requested.clone(),
            framework: request.framework.clone(),
        });

        let catalog = self.catalog.read().map_err(|_| RegistryError::CatalogPoisoned)?;
        let mut diagnostics = Vec::new();
        let accepted = self.lookup_requested(&catalog, request, &mut diagnostics);

        let mut ordered = Vec::new();
        let mut merged_config = Map::new();

        if diagnostics.iter().any(Diagnostic::is_blocking) {
            debug!("blocking lookup errors, skipping resolution");
        } else {
            match self.run_pipeline(&catalog, &accepted, request, &mut diagnostics) {
                Ok(pipeline) => {
                    ordered = pipeline.ordered;
                    merged_config = pipeline.merged_config;
                }
                Err(e) => {
                    warn!(error = %e, "composition failed");
                    diagnostics.push(failure_diagnostic(e));
                }
            }
        }
        drop(catalog);

        let (errors, warnings): (Vec<Diagnostic>, Vec<Diagnostic>) =
            diagnostics.into_iter().partition(Diagnostic::is_blocking);
        let valid = errors.is_empty();

        let performance = Performance {
            time_us: start.elapsed().as_micros() as u64,
            memory_bytes: estimated_footprint(&ordered),
            complexity: complexity(&ordered),
        };

        info!(
            valid,
            errors = errors.len(),
            warnings = warnings.len(),
            modules = ordered.len(),
            "composition finished"
        );
        self.events.emit(&LifecycleEvent::CompositionCompleted {
            valid,
            errors: errors.len(),
            warnings: warnings.len(),
        });

        Ok(CompositionResult {
            valid,
            requested,
            dependency_order: ordered.iter().map(|m| m.id.clone()).collect(),
            modules: ordered.iter().map(|m| Module::clone(m)).collect(),
            errors,
            warnings,
            merged_config,
            performance,
        })
    }

    /// Stage 1: resolve each request against the catalog.
    fn lookup_requested(
        &self,
        catalog: &ModuleCatalog,
        request: &Composition,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<Arc<Module>> {
        let mut accepted = Vec::new();

        for req in &request.modules {
            let found = match &req.version {
                Some(v) => catalog.get_version(&req.module_id, v),
                None => catalog.get(&req.module_id),
            };
            let Some(module) = found else {
                let label = match &req.version {
                    Some(v) => format!("{}@{v}", req.module_id),
                    None => req.module_id.clone(),
                };
                diagnostics.push(Diagnostic::critical(
                    DiagnosticKind::ModuleNotFound,
                    Some(req.module_id.as_str()),
                    format!("module '{label}' not found in catalog"),
                ));
                continue;
            };

            if module.is_deprecated() {
                diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::ModuleDeprecated,
                    Some(module.id.as_str()),
                    format!("module '{}@{}' is deprecated", module.id, module.version()),
                ));
            }
            if module.is_experimental() && !self.policy.allow_experimental {
                diagnostics.push(Diagnostic::error(
                    DiagnosticKind::ModuleExperimentalDisallowed,
                    Some(module.id.as_str()),
                    format!(
                        "module '{}@{}' is experimental and experimental modules are not allowed",
                        module.id,
                        module.version()
                    ),
                ));
                continue;
            }
            accepted.push(module);
        }

        accepted
    }

    /// Stages 3–6.
    fn run_pipeline(
        &self,
        catalog: &ModuleCatalog,
        accepted: &[Arc<Module>],
        request: &Composition,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<Pipeline> {
        let resolved = resolve(accepted, catalog)?;
        debug!(resolved = resolved.len(), "resolved module set");

        let ordered = order(resolved.modules())?;

        diagnostics.extend(check_conflicts(resolved.modules(), self.policy.symmetric_conflicts));
        diagnostics.extend(check_frameworks(resolved.modules(), &request.framework));

        let merged_config = merge_configs(&ordered, &request.global_config, |id| request.override_for(id));

        for module in &ordered {
            let Some(config) = merged_config.get(&module.id).and_then(Value::as_object) else {
                continue;
            };
            for field in validate_config(&module.id, &module.config, config) {
                diagnostics.push(Diagnostic::error(
                    DiagnosticKind::ConfigInvalid,
                    Some(field.module_id.as_str()),
                    format!("{}.{}: {}", field.module_id, field.field, field.message),
                ));
            }
        }

        Ok(Pipeline {
            ordered,
            merged_config,
        })
    }
}

/// Convert a pipeline failure into a single blocking diagnostic.
fn failure_diagnostic(error: RegistryError) -> Diagnostic {
    match error {
        RegistryError::MissingDependency {
            ref dependency,
            ref version,
            ref required_by,
        } => {
            let wanted = match version {
                Some(v) => format!("'{dependency}' version {v}"),
                None => format!("'{dependency}'"),
            };
            Diagnostic::error(
                DiagnosticKind::MissingRequiredDependency,
                Some(required_by.as_str()),
                format!("'{required_by}' requires {wanted}, which is not in the catalog"),
            )
        }
        RegistryError::CircularDependency { .. } => {
            Diagnostic::error(DiagnosticKind::CircularDependency, None, error.to_string())
        }
        other => Diagnostic::error(DiagnosticKind::CompositionError, None, other.to_string()),
    }
}
