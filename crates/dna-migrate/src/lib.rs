//! Migration planning and execution for versioned DNA modules.
//!
//! A [`MigrationPlanner`] picks the registered steps between two versions
//! of a module; a [`MigrationExecutor`] runs them against a project with
//! optional backup and rollback.
//!
//! # Collaborators
//!
//! The executor does no I/O of its own. It goes through:
//! - [`ScriptRunner`] for automated step scripts
//! - [`BackupService`] for snapshots and restores
//!
//! Each collaborator call carries a timeout, and a collaborator returns
//! only once its work has stopped.

pub mod backup;
pub mod cancel;
pub mod error;
pub mod executor;
pub mod planner;
pub mod runner;
pub mod step;

// Re-exports for convenience.
pub use backup::{BackupService, DirectoryBackup, BACKUP_MARKER};
pub use cancel::CancellationFlag;
pub use error::{MigrateError, Result};
pub use executor::{ExecutorConfig, MigrationContext, MigrationExecutor, MigrationResult, MigrationState, StepResult};
pub use planner::{format_duration, format_preview, MigrationPlanner, MigrationPreview};
pub use runner::{ScriptRunner, ShellScriptRunner};
pub use step::{MigrationRegistry, MigrationStep};
