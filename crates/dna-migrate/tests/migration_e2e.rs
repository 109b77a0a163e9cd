//! End-to-end migration runs against a real project directory.

use std::sync::Arc;
use std::time::Duration;

use dna_migrate::{
    DirectoryBackup, ExecutorConfig, MigrateError, MigrationContext, MigrationExecutor, MigrationPlanner,
    MigrationRegistry, MigrationState, MigrationStep, ShellScriptRunner,
};

const MIGRATIONS: &str = r#"
[[migration]]
module = "m"
version = "1.1.0"
description = "Add a settings file"
automated = true
script = "echo 'theme = dark' > settings.toml"

[[migration]]
module = "m"
version = "2.0.0"
description = "Rewrite the storage layer"
breaking = true
automated = true
script = "rm app.txt && exit 3"
"#;

fn planner() -> Arc<MigrationPlanner> {
    let mut registry = MigrationRegistry::new();
    registry.load_toml(MIGRATIONS).expect("load migrations");
    Arc::new(MigrationPlanner::new(registry))
}

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("app.txt"), "v1\n").expect("write");
    dir
}

#[test]
fn path_lists_both_steps_in_order() {
    let path = planner().get_migration_path("m", "1.0.0", "2.0.0");
    let versions: Vec<&str> = path.iter().map(|s| s.version.as_str()).collect();
    assert_eq!(versions, vec!["1.1.0", "2.0.0"]);
    assert!(!path[0].breaking);
    assert!(path[1].breaking);
}

#[test]
fn no_path_for_same_or_lower_version() {
    let planner = planner();
    assert!(planner.get_migration_path("m", "1.0.0", "1.0.0").is_empty());
    assert!(planner.get_migration_path("m", "2.0.0", "1.0.0").is_empty());
}

#[test]
fn failing_breaking_step_restores_project() {
    let project = project();
    let backups = tempfile::tempdir().expect("tempdir");
    let executor = MigrationExecutor::new(planner(), Arc::new(ShellScriptRunner), Arc::new(DirectoryBackup));

    let ctx = MigrationContext::new("m", "1.0.0", "2.0.0", project.path()).with_backup(backups.path().join("snap"));
    let result = executor.execute(&ctx).expect("execute");

    assert!(!result.success);
    assert_eq!(result.version_reached, "1.0.0");
    assert!(result.rolled_back);
    assert_eq!(result.final_state, MigrationState::RolledBack);
    assert!(result.steps[0].success);
    assert!(!result.steps[1].success);

    // The first step's file is gone and the second step's deletion undone.
    assert!(!project.path().join("settings.toml").exists());
    assert_eq!(std::fs::read_to_string(project.path().join("app.txt")).expect("read"), "v1\n");
}

#[test]
fn successful_partial_upgrade() {
    let project = project();
    let executor = MigrationExecutor::new(planner(), Arc::new(ShellScriptRunner), Arc::new(DirectoryBackup));

    let ctx = MigrationContext::new("m", "1.0.0", "1.1.0", project.path());
    let result = executor.execute(&ctx).expect("execute");

    assert!(result.success);
    assert_eq!(result.version_reached, "1.1.0");
    assert!(project.path().join("settings.toml").is_file());
}

#[test]
fn dry_run_touches_nothing() {
    let project = project();
    let backups = tempfile::tempdir().expect("tempdir");
    let executor = MigrationExecutor::new(planner(), Arc::new(ShellScriptRunner), Arc::new(DirectoryBackup));

    let ctx = MigrationContext::new("m", "1.0.0", "2.0.0", project.path())
        .with_backup(backups.path().join("snap"))
        .dry_run();
    let result = executor.execute(&ctx).expect("execute");

    assert!(result.success);
    assert_eq!(result.version_reached, "1.0.0");
    assert!(!project.path().join("settings.toml").exists());
    assert!(!backups.path().join("snap").exists());
}

#[test]
fn timed_out_step_never_writes_after_its_successor() {
    let project = project();
    let mut registry = MigrationRegistry::new();
    registry
        .register_step("m", MigrationStep::automated("1.1.0", "slow append", "sleep 1; echo first >> log.txt"))
        .expect("register");
    registry
        .register_step("m", MigrationStep::automated("1.2.0", "fast append", "echo second >> log.txt"))
        .expect("register");
    let executor = MigrationExecutor::new(
        Arc::new(MigrationPlanner::new(registry)),
        Arc::new(ShellScriptRunner),
        Arc::new(DirectoryBackup),
    )
    .with_config(ExecutorConfig {
        script_timeout: Duration::from_millis(200),
        ..Default::default()
    });

    let result = executor
        .execute(&MigrationContext::new("m", "1.0.0", "1.2.0", project.path()))
        .expect("execute");
    assert!(!result.steps[0].success);
    assert!(result.steps[1].success);

    std::thread::sleep(Duration::from_millis(1500));
    let log = std::fs::read_to_string(project.path().join("log.txt")).expect("read");
    assert_eq!(log, "second\n");
}

#[test]
fn backup_onto_project_aborts_before_any_step() {
    let project = project();
    let executor = MigrationExecutor::new(planner(), Arc::new(ShellScriptRunner), Arc::new(DirectoryBackup));

    let ctx = MigrationContext::new("m", "1.0.0", "2.0.0", project.path()).with_backup(project.path());
    let err = executor.execute(&ctx).unwrap_err();

    assert!(matches!(err, MigrateError::Backup(_)));
    assert_eq!(std::fs::read_to_string(project.path().join("app.txt")).expect("read"), "v1\n");
    assert!(!project.path().join("settings.toml").exists());
}
