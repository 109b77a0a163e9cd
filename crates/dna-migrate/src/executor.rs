//! Migration execution.
//!
//! A run moves through these states:
//!
//! ```text
//! NotStarted -> BackupCreated -> Executing(i) -> Completed
//!                                             -> Failed -> RolledBack
//! ```
//!
//! `BackupCreated` is skipped for dry runs and when no backup path is set;
//! `RolledBack` is reached only when a restore actually succeeded. Steps run
//! strictly one after another: collaborators return only once their work
//! has stopped, including on timeout. Cancellation is checked before each step and
//! is handled like a failed breaking step.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dna_registry::{version, EventBus, LifecycleEvent};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backup::BackupService;
use crate::cancel::CancellationFlag;
use crate::error::{MigrateError, Result};
use crate::planner::MigrationPlanner;
use crate::runner::ScriptRunner;
use crate::step::MigrationStep;

/// What to migrate and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationContext {
    pub module_id: String,
    pub from_version: String,
    pub to_version: String,
    pub project_path: PathBuf,
    /// Simulate every step without side effects.
    #[serde(default)]
    pub dry_run: bool,
    /// Where to snapshot the project; no backup or rollback without it.
    #[serde(default)]
    pub backup_path: Option<PathBuf>,
}

impl MigrationContext {
    pub fn new(
        module_id: impl Into<String>,
        from_version: impl Into<String>,
        to_version: impl Into<String>,
        project_path: impl Into<PathBuf>,
    ) -> Self {
        MigrationContext {
            module_id: module_id.into(),
            from_version: from_version.into(),
            to_version: to_version.into(),
            project_path: project_path.into(),
            dry_run: false,
            backup_path: None,
        }
    }

    pub fn with_backup(mut self, backup_path: impl Into<PathBuf>) -> Self {
        self.backup_path = Some(backup_path.into());
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Where a run is, or where it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "step")]
pub enum MigrationState {
    NotStarted,
    BackupCreated,
    /// Running the step at this index of the migration path.
    Executing(usize),
    Completed,
    Failed,
    RolledBack,
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub version: String,
    pub description: String,
    pub success: bool,
    pub breaking: bool,
    pub output: Option<String>,
    pub error: Option<String>,
    pub duration: Duration,
}

impl StepResult {
    fn new(step: &MigrationStep, started: Instant, outcome: std::result::Result<String, String>) -> Self {
        let (success, output, error) = match outcome {
            Ok(output) => (true, Some(output), None),
            Err(error) => (false, None, Some(error)),
        };
        StepResult {
            version: step.version.clone(),
            description: step.description.clone(),
            success,
            breaking: step.breaking,
            output,
            error,
            duration: started.elapsed(),
        }
    }
}

/// Outcome of a migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationResult {
    pub run_id: String,
    pub success: bool,
    /// `to_version` after a successful real run, otherwise `from_version`.
    pub version_reached: String,
    pub steps: Vec<StepResult>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub execution_time: Duration,
    pub final_state: MigrationState,
    pub rolled_back: bool,
}

/// Timeouts for collaborator calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub script_timeout: Duration,
    /// Applies to both backup creation and restore.
    pub backup_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            script_timeout: Duration::from_secs(300),
            backup_timeout: Duration::from_secs(600),
        }
    }
}

/// Runs migration paths produced by a [`MigrationPlanner`].
pub struct MigrationExecutor {
    planner: Arc<MigrationPlanner>,
    runner: Arc<dyn ScriptRunner>,
    backup: Arc<dyn BackupService>,
    config: ExecutorConfig,
    events: EventBus,
    cancel: CancellationFlag,
}

impl MigrationExecutor {
    pub fn new(planner: Arc<MigrationPlanner>, runner: Arc<dyn ScriptRunner>, backup: Arc<dyn BackupService>) -> Self {
        MigrationExecutor {
            planner,
            runner,
            backup,
            config: ExecutorConfig::default(),
            events: EventBus::new(),
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// A handle that cancels runs of this executor.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Run the migration described by `ctx`.
    ///
    /// Step failures are reported on the result. Only a failed backup
    /// creation returns `Err`, before any step has run.
    pub fn execute(&self, ctx: &MigrationContext) -> Result<MigrationResult> {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let steps = self
            .planner
            .get_migration_path(&ctx.module_id, &ctx.from_version, &ctx.to_version);

        info!(
            run_id = %run_id,
            module = %ctx.module_id,
            from = %ctx.from_version,
            to = %ctx.to_version,
            steps = steps.len(),
            dry_run = ctx.dry_run,
            "starting migration"
        );
        self.events.emit(&LifecycleEvent::MigrationStarted {
            run_id: run_id.clone(),
            module_id: ctx.module_id.clone(),
            from: ctx.from_version.clone(),
            to: ctx.to_version.clone(),
        });

        let mut state = MigrationState::NotStarted;
        let backup_path = if ctx.dry_run { None } else { ctx.backup_path.clone() };

        if let Some(backup) = &backup_path {
            if let Err(e) = self.create_backup(ctx, backup) {
                self.events.emit(&LifecycleEvent::MigrationFailed {
                    run_id: run_id.clone(),
                    errors: vec![e.to_string()],
                });
                return Err(e);
            }
            transition(&run_id, &mut state, MigrationState::BackupCreated);
        }

        let mut results = Vec::with_capacity(steps.len());
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if steps.is_empty() {
            warnings.push(format!(
                "no migration steps for '{}' between {} and {}",
                ctx.module_id, ctx.from_version, ctx.to_version
            ));
        }

        for (index, step) in steps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(run_id = %run_id, version = %step.version, "migration cancelled");
                errors.push(format!("migration cancelled before step {}", step.version));
                results.push(StepResult::new(step, Instant::now(), Err("cancelled".to_string())));
                break;
            }

            transition(&run_id, &mut state, MigrationState::Executing(index));
            self.events.emit(&LifecycleEvent::StepStarted {
                run_id: run_id.clone(),
                index,
                version: step.version.clone(),
            });

            let result = self.run_step(step, ctx, &mut warnings);
            debug!(run_id = %run_id, version = %step.version, success = result.success, "step finished");
            self.events.emit(&LifecycleEvent::StepCompleted {
                run_id: run_id.clone(),
                index,
                version: step.version.clone(),
                success: result.success,
            });

            let halt = !result.success && step.breaking;
            if let Some(error) = &result.error {
                errors.push(format!("step {} failed: {error}", step.version));
            }
            results.push(result);
            if halt {
                warn!(run_id = %run_id, version = %step.version, "breaking step failed, halting migration");
                break;
            }
        }

        let success = errors.is_empty();
        let mut rolled_back = false;

        if success {
            transition(&run_id, &mut state, MigrationState::Completed);
        } else {
            transition(&run_id, &mut state, MigrationState::Failed);
            if let Some(backup) = &backup_path {
                match self.restore_backup(ctx, backup) {
                    Ok(()) => {
                        rolled_back = true;
                        transition(&run_id, &mut state, MigrationState::RolledBack);
                        info!(run_id = %run_id, "rolled back to backup");
                        self.events.emit(&LifecycleEvent::RolledBack { run_id: run_id.clone() });
                    }
                    Err(e) => {
                        warn!(run_id = %run_id, error = %e, "rollback failed");
                        errors.push(format!("rollback failed: {e}"));
                    }
                }
            }
        }

        let advanced = success && !ctx.dry_run && version::compare(&ctx.from_version, &ctx.to_version) == Ordering::Less;
        let version_reached = if advanced {
            ctx.to_version.clone()
        } else {
            ctx.from_version.clone()
        };

        if success {
            info!(run_id = %run_id, version = %version_reached, "migration completed");
            self.events.emit(&LifecycleEvent::MigrationCompleted {
                run_id: run_id.clone(),
                version_reached: version_reached.clone(),
            });
        } else {
            warn!(run_id = %run_id, errors = errors.len(), "migration failed");
            self.events.emit(&LifecycleEvent::MigrationFailed {
                run_id: run_id.clone(),
                errors: errors.clone(),
            });
        }

        Ok(MigrationResult {
            run_id,
            success,
            version_reached,
            steps: results,
            errors,
            warnings,
            execution_time: started.elapsed(),
            final_state: state,
            rolled_back,
        })
    }

    fn run_step(&self, step: &MigrationStep, ctx: &MigrationContext, warnings: &mut Vec<String>) -> StepResult {
        let started = Instant::now();

        if ctx.dry_run {
            let action = match (&step.script, step.automated) {
                (Some(script), true) => format!("would run `{script}`"),
                _ => format!("would ask for: {}", step.description),
            };
            return StepResult::new(step, started, Ok(format!("dry run: {action}")));
        }

        if !step.automated {
            warnings.push(format!("step {} requires manual action: {}", step.version, step.description));
            return StepResult::new(step, started, Ok(step.instructions.join("\n")));
        }

        let Some(script) = step.script.as_deref() else {
            return StepResult::new(step, started, Err("automated step has no script".to_string()));
        };
        let outcome = self
            .runner
            .execute(script, &ctx.project_path, self.config.script_timeout);
        StepResult::new(step, started, outcome.map_err(|e| e.to_string()))
    }

    fn create_backup(&self, ctx: &MigrationContext, backup_path: &Path) -> Result<()> {
        self.backup
            .create(&ctx.project_path, backup_path, self.config.backup_timeout)
            .map_err(|e| match e {
                MigrateError::Backup(_) | MigrateError::TimedOut { .. } => e,
                other => MigrateError::Backup(other.to_string()),
            })
    }

    fn restore_backup(&self, ctx: &MigrationContext, backup_path: &Path) -> Result<()> {
        self.backup
            .restore(backup_path, &ctx.project_path, self.config.backup_timeout)
    }
}

fn transition(run_id: &str, state: &mut MigrationState, next: MigrationState) {
    debug!(run_id, from = ?state, to = ?next, "migration state");
    *state = next;
}
