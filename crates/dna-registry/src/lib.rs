//! Module catalog and composition engine for DNA project scaffolding.
//!
//! Keeps a versioned catalog of reusable project modules and turns a
//! request for a handful of them into a validated, ordered composition.
//!
//! # Architecture
//!
//! A composition runs through these stages:
//! - **Lookup**: requested modules are found in the [`ModuleCatalog`]
//! - **Resolution**: required dependencies are closed over transitively
//! - **Ordering**: dependencies are placed before their dependents
//! - **Validation**: conflicts, framework support and merged config
//!
//! Problems are reported as [`Diagnostic`]s on the [`CompositionResult`]
//! rather than as errors, so one run surfaces everything that is wrong.

pub mod catalog;
pub mod compose;
pub mod config;
pub mod conflict;
pub mod diagnostic;
pub mod error;
pub mod events;
pub mod framework;
pub mod module;
pub mod order;
pub mod resolution;
pub mod source;
pub mod tree;
pub mod version;

// Re-exports for convenience.
pub use catalog::{LatestPolicy, ModuleCatalog, ModuleKey, SharedCatalog};
pub use compose::{Composition, CompositionEngine, CompositionPolicy, CompositionResult, ModuleRequest};
pub use config::{ModuleConfig, RuleKind, ValidationRule, ValueKind};
pub use diagnostic::{Diagnostic, DiagnosticKind, Severity};
pub use error::{RegistryError, Result};
pub use events::{ChannelSink, EventBus, EventSink, LifecycleEvent};
pub use module::{
    Category, CompatibilityLevel, Conflict, ConflictSeverity, Dependency, FrameworkSupport, LifecycleStage, Module,
    ModuleMetadata,
};
pub use order::dependency_order;
pub use resolution::{resolve, ResolvedSet};
pub use source::{load_all, LocalSource, ModuleSource, SourceDescriptor};
pub use tree::{format_report, format_tree};
