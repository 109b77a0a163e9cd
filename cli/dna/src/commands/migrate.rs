//! `dna migrate plan` and `dna migrate run`.

use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dna_migrate::{
    format_preview, DirectoryBackup, ExecutorConfig, MigrationContext, MigrationExecutor, MigrationPlanner,
    MigrationRegistry, MigrationResult, ShellScriptRunner,
};

use super::{OutputFormat, Workspace};

/// Versions and files for one migration command.
#[derive(Debug, Clone)]
pub struct MigrateOptions {
    pub module: String,
    pub from: String,
    pub to: String,
    /// Migration files in addition to the manifest's.
    pub migrations: Vec<PathBuf>,
}

/// Options only `dna migrate run` uses.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub project: Option<PathBuf>,
    /// `Some(None)` backs up to the default location.
    pub backup: Option<Option<PathBuf>>,
    pub dry_run: bool,
}

/// Load every configured migration file into a planner.
fn load_planner(workspace: &Workspace, extra: &[PathBuf]) -> Result<MigrationPlanner> {
    let mut paths = workspace
        .manifest
        .as_ref()
        .map(|m| m.migration_paths(&workspace.dir))
        .unwrap_or_default();
    paths.extend(extra.iter().cloned());
    if paths.is_empty() {
        let default = workspace.dir.join("migrations.toml");
        if !default.is_file() {
            bail!("no migration files configured (set [migrations] paths in dna.toml or pass --migrations)");
        }
        paths.push(default);
    }

    let mut registry = MigrationRegistry::new();
    for path in &paths {
        registry
            .load(path)
            .with_context(|| format!("loading migrations from {}", path.display()))?;
    }
    Ok(MigrationPlanner::new(registry))
}

/// Run `dna migrate plan`.
pub fn plan(workspace: &Workspace, options: &MigrateOptions, format: OutputFormat) -> Result<()> {
    let planner = load_planner(workspace, &options.migrations)?;
    let preview = planner.get_migration_preview(&options.module, &options.from, &options.to);
    match format {
        OutputFormat::Text => print!("{}", format_preview(&preview)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&preview)?),
    }
    Ok(())
}

/// Run `dna migrate run`. Returns whether the migration succeeded.
pub fn run(workspace: &Workspace, options: &MigrateOptions, run: &RunOptions, format: OutputFormat) -> Result<bool> {
    let planner = load_planner(workspace, &options.migrations)?;
    let config = workspace
        .manifest
        .as_ref()
        .map(|m| m.migrations.executor_config())
        .unwrap_or_default();

    let project = run.project.clone().unwrap_or_else(|| workspace.dir.clone());
    let mut ctx = MigrationContext::new(&options.module, &options.from, &options.to, project);
    ctx.backup_path = run
        .backup
        .clone()
        .map(|b| b.unwrap_or_else(|| default_backup_path(&ctx.project_path)));
    ctx.dry_run = run.dry_run;

    let result = execute(planner, config, &ctx)?;
    match format {
        OutputFormat::Text => print!("{}", format_result(&ctx, &result)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(result.success)
}

fn execute(planner: MigrationPlanner, config: ExecutorConfig, ctx: &MigrationContext) -> Result<MigrationResult> {
    let executor = MigrationExecutor::new(Arc::new(planner), Arc::new(ShellScriptRunner), Arc::new(DirectoryBackup))
        .with_config(config);
    executor.execute(ctx).context("migration aborted")
}

fn format_result(ctx: &MigrationContext, result: &MigrationResult) -> String {
    let mut out = String::new();
    let status = if result.success { "succeeded" } else { "failed" };
    let mode = if ctx.dry_run { " (dry run)" } else { "" };
    let _ = writeln!(
        out,
        "migration of {} {} -> {} {status}{mode}",
        ctx.module_id, ctx.from_version, ctx.to_version
    );

    for step in &result.steps {
        let mark = if step.success { "ok" } else { "FAILED" };
        let _ = writeln!(out, "  [{mark}] {}: {}", step.version, step.description);
        if let Some(error) = &step.error {
            let _ = writeln!(out, "         {error}");
        }
    }
    for warning in &result.warnings {
        let _ = writeln!(out, "warning: {warning}");
    }
    for error in &result.errors {
        let _ = writeln!(out, "error: {error}");
    }
    if result.rolled_back {
        let _ = writeln!(out, "project restored from backup");
    }
    let _ = writeln!(
        out,
        "version reached: {} ({:.1}s, run {})",
        result.version_reached,
        result.execution_time.as_secs_f64(),
        result.run_id
    );
    out
}

/// The default backup location: `.dna-backup` inside the project.
pub fn default_backup_path(project: &Path) -> PathBuf {
    project.join(".dna-backup")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIGRATIONS: &str = r#"
[[migration]]
module = "auth"
version = "1.1.0"
description = "Write a marker"
automated = true
script = "echo migrated > marker.txt"

[[migration]]
module = "auth"
version = "2.0.0"
description = "Review session settings"
instructions = ["Check the session timeout"]
"#;

    fn workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("migrations.toml"), MIGRATIONS).unwrap();
        let workspace = Workspace {
            dir: dir.path().to_path_buf(),
            manifest: None,
        };
        (dir, workspace)
    }

    fn options(to: &str) -> MigrateOptions {
        MigrateOptions {
            module: "auth".into(),
            from: "1.0.0".into(),
            to: to.into(),
            migrations: Vec::new(),
        }
    }

    #[test]
    fn plan_uses_default_migrations_file() {
        let (_dir, workspace) = workspace();
        let planner = load_planner(&workspace, &[]).unwrap();
        assert_eq!(planner.get_migration_path("auth", "1.0.0", "2.0.0").len(), 2);
        plan(&workspace, &options("2.0.0"), OutputFormat::Text).unwrap();
    }

    #[test]
    fn run_executes_in_project() {
        let (dir, workspace) = workspace();
        let ok = run(&workspace, &options("1.1.0"), &RunOptions::default(), OutputFormat::Text).unwrap();
        assert!(ok);
        assert!(dir.path().join("marker.txt").is_file());
    }

    #[test]
    fn dry_run_leaves_project_alone() {
        let (dir, workspace) = workspace();
        let run_options = RunOptions {
            dry_run: true,
            backup: Some(None),
            ..Default::default()
        };
        let ok = run(&workspace, &options("2.0.0"), &run_options, OutputFormat::Json).unwrap();
        assert!(ok);
        assert!(!dir.path().join("marker.txt").exists());
        assert!(!dir.path().join(".dna-backup").exists());
    }

    #[test]
    fn missing_migrations_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace {
            dir: dir.path().to_path_buf(),
            manifest: None,
        };
        assert!(plan(&workspace, &options("2.0.0"), OutputFormat::Text).is_err());
    }
}
