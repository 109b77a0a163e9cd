//! Project backup and restore around a migration run.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{MigrateError, Result};

/// File marking a directory as a backup written by [`DirectoryBackup`].
pub const BACKUP_MARKER: &str = ".dna-backup-marker";

/// Snapshots a project before migrating and puts it back on failure.
///
/// Work not finished within `timeout` stops with
/// [`MigrateError::TimedOut`]; nothing keeps running after a call returns.
pub trait BackupService: Send + Sync {
    /// Copy the project at `project_path` into `backup_path`.
    fn create(&self, project_path: &Path, backup_path: &Path, timeout: Duration) -> Result<()>;

    /// Replace the project at `project_path` with the copy in `backup_path`.
    fn restore(&self, backup_path: &Path, project_path: &Path, timeout: Duration) -> Result<()>;
}

/// Plain directory copy backups.
///
/// The backup directory may live inside the project; it is skipped while
/// copying and kept while restoring. It may not be the project itself or
/// one of its ancestors, and an existing directory is only replaced when it
/// is empty or carries [`BACKUP_MARKER`]. Symlinks are copied as links.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryBackup;

impl BackupService for DirectoryBackup {
    fn create(&self, project_path: &Path, backup_path: &Path, timeout: Duration) -> Result<()> {
        let budget = Budget::new("backup", timeout);
        if !project_path.is_dir() {
            return Err(MigrateError::Backup(format!(
                "project directory '{}' does not exist",
                project_path.display()
            )));
        }

        let project = project_path.canonicalize().map_err(backup_error)?;
        let backup = resolve(backup_path).map_err(backup_error)?;
        if project.starts_with(&backup) {
            return Err(MigrateError::Backup(format!(
                "backup path '{}' would overwrite the project at '{}'",
                backup.display(),
                project.display()
            )));
        }

        prepare_target(&backup)?;
        let files = copy_tree(&project, &backup, &[backup.as_path()], &budget).map_err(as_backup)?;
        info!(project = %project.display(), backup = %backup.display(), files, "created backup");
        Ok(())
    }

    fn restore(&self, backup_path: &Path, project_path: &Path, timeout: Duration) -> Result<()> {
        let budget = Budget::new("restore", timeout);
        if !backup_path.is_dir() {
            return Err(MigrateError::Restore(format!(
                "backup directory '{}' does not exist",
                backup_path.display()
            )));
        }
        let backup = backup_path.canonicalize().map_err(restore_error)?;
        let marker = backup.join(BACKUP_MARKER);
        if !marker.is_file() {
            return Err(MigrateError::Restore(format!(
                "'{}' is not a project backup",
                backup.display()
            )));
        }

        std::fs::create_dir_all(project_path).map_err(restore_error)?;
        let project = project_path.canonicalize().map_err(restore_error)?;
        if project.starts_with(&backup) {
            return Err(MigrateError::Restore(format!(
                "backup '{}' contains the project at '{}'",
                backup.display(),
                project.display()
            )));
        }

        clear_dir(&project, &backup, &budget).map_err(as_restore)?;
        let files = copy_tree(&backup, &project, &[marker.as_path()], &budget).map_err(as_restore)?;
        info!(project = %project.display(), backup = %backup.display(), files, "restored backup");
        Ok(())
    }
}

/// Wall-clock allowance for one backup or restore.
struct Budget {
    operation: &'static str,
    timeout: Duration,
    deadline: Instant,
}

impl Budget {
    fn new(operation: &'static str, timeout: Duration) -> Self {
        Budget {
            operation,
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    fn check(&self) -> Result<()> {
        if Instant::now() >= self.deadline {
            return Err(MigrateError::TimedOut {
                operation: self.operation.to_string(),
                timeout: self.timeout,
            });
        }
        Ok(())
    }
}

fn backup_error(e: std::io::Error) -> MigrateError {
    MigrateError::Backup(e.to_string())
}

fn restore_error(e: std::io::Error) -> MigrateError {
    MigrateError::Restore(e.to_string())
}

fn as_backup(e: MigrateError) -> MigrateError {
    match e {
        MigrateError::TimedOut { .. } | MigrateError::Backup(_) => e,
        MigrateError::Io(io) => backup_error(io),
        other => MigrateError::Backup(other.to_string()),
    }
}

fn as_restore(e: MigrateError) -> MigrateError {
    match e {
        MigrateError::TimedOut { .. } | MigrateError::Restore(_) => e,
        MigrateError::Io(io) => restore_error(io),
        other => MigrateError::Restore(other.to_string()),
    }
}

/// Absolute, symlink-free form of `path`, which need not exist yet.
fn resolve(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut missing: Vec<OsString> = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(mut resolved) => {
                resolved.extend(missing.iter().rev());
                return Ok(resolved);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let name = existing.file_name().ok_or(e)?;
                missing.push(name.to_os_string());
                existing = existing
                    .parent()
                    .ok_or_else(|| std::io::Error::new(ErrorKind::NotFound, "no existing ancestor"))?;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Make `backup` an empty, marked directory, clearing an earlier backup.
fn prepare_target(backup: &Path) -> Result<()> {
    match std::fs::symlink_metadata(backup) {
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(backup_error(e)),
        Ok(meta) if !meta.is_dir() => {
            return Err(MigrateError::Backup(format!(
                "'{}' exists and is not a directory",
                backup.display()
            )));
        }
        Ok(_) => {
            let empty = std::fs::read_dir(backup).map_err(backup_error)?.next().is_none();
            if !empty && !backup.join(BACKUP_MARKER).is_file() {
                return Err(MigrateError::Backup(format!(
                    "refusing to replace '{}': it is not empty and not an earlier backup",
                    backup.display()
                )));
            }
            debug!(backup = %backup.display(), "replacing earlier backup");
            std::fs::remove_dir_all(backup).map_err(backup_error)?;
        }
    }
    std::fs::create_dir_all(backup).map_err(backup_error)?;
    std::fs::write(backup.join(BACKUP_MARKER), "").map_err(backup_error)?;
    Ok(())
}

/// Copy the contents of `from` into `to`, skipping the paths in `skip`.
/// Returns the number of files and links copied.
fn copy_tree(from: &Path, to: &Path, skip: &[&Path], budget: &Budget) -> Result<usize> {
    let mut files = 0;
    let mut pending: Vec<(PathBuf, PathBuf)> = vec![(from.to_path_buf(), to.to_path_buf())];

    while let Some((src, dst)) = pending.pop() {
        std::fs::create_dir_all(&dst)?;
        for entry in std::fs::read_dir(&src)? {
            budget.check()?;
            let entry = entry?;
            let path = entry.path();
            if skip.iter().any(|s| *s == path) {
                continue;
            }
            let target = dst.join(entry.file_name());
            let file_type = entry.file_type()?;
            if file_type.is_symlink() {
                copy_link(&path, &target)?;
                files += 1;
            } else if file_type.is_dir() {
                pending.push((path, target));
            } else {
                std::fs::copy(&path, &target)?;
                files += 1;
            }
        }
    }

    Ok(files)
}

#[cfg(unix)]
fn copy_link(link: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(std::fs::read_link(link)?, target)
}

#[cfg(not(unix))]
fn copy_link(link: &Path, target: &Path) -> std::io::Result<()> {
    std::fs::copy(link, target).map(|_| ())
}

/// Remove everything under `dir` except `keep`. Directories leading to
/// `keep` are emptied of everything else but not removed.
fn clear_dir(dir: &Path, keep: &Path, budget: &Budget) -> Result<()> {
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            budget.check()?;
            let entry = entry?;
            let path = entry.path();
            if path == keep {
                debug!(path = %path.display(), "keeping backup location");
                continue;
            }
            if keep.starts_with(&path) {
                pending.push(path);
                continue;
            }
            if entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENEROUS: Duration = Duration::from_secs(60);

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pubspec.yaml"), "name: app\n").unwrap();
        std::fs::create_dir_all(dir.path().join("lib/src")).unwrap();
        std::fs::write(dir.path().join("lib/src/main.dart"), "void main() {}\n").unwrap();
        dir
    }

    #[test]
    fn backup_and_restore_round_trip() {
        let project = project();
        let backups = tempfile::tempdir().unwrap();
        let backup = backups.path().join("snapshot");

        DirectoryBackup.create(project.path(), &backup, GENEROUS).unwrap();
        assert!(backup.join("lib/src/main.dart").is_file());

        std::fs::write(project.path().join("lib/src/main.dart"), "broken").unwrap();
        std::fs::write(project.path().join("stray.txt"), "left by a step").unwrap();

        DirectoryBackup.restore(&backup, project.path(), GENEROUS).unwrap();
        let main = std::fs::read_to_string(project.path().join("lib/src/main.dart")).unwrap();
        assert_eq!(main, "void main() {}\n");
        assert!(!project.path().join("stray.txt").exists());
        assert!(!project.path().join(BACKUP_MARKER).exists());
    }

    #[test]
    fn backup_inside_project_is_skipped_and_kept() {
        let project = project();
        let backup = project.path().join(".dna-backup");

        DirectoryBackup.create(project.path(), &backup, GENEROUS).unwrap();
        assert!(!backup.join(".dna-backup").exists());

        std::fs::remove_file(project.path().join("pubspec.yaml")).unwrap();
        DirectoryBackup.restore(&backup, project.path(), GENEROUS).unwrap();
        assert!(project.path().join("pubspec.yaml").is_file());
        assert!(backup.is_dir());
    }

    #[test]
    fn deeply_nested_backup_leaves_no_stale_siblings() {
        let project = project();
        std::fs::create_dir_all(project.path().join("a")).unwrap();
        std::fs::write(project.path().join("a/kept.txt"), "original").unwrap();
        let backup = project.path().join("a/snap");

        DirectoryBackup.create(project.path(), &backup, GENEROUS).unwrap();
        std::fs::write(project.path().join("a/stale.txt"), "written by a step").unwrap();
        std::fs::write(project.path().join("a/kept.txt"), "changed").unwrap();

        DirectoryBackup.restore(&backup, project.path(), GENEROUS).unwrap();
        assert!(!project.path().join("a/stale.txt").exists());
        assert_eq!(std::fs::read_to_string(project.path().join("a/kept.txt")).unwrap(), "original");
        assert!(backup.join(BACKUP_MARKER).is_file());
    }

    #[test]
    fn backup_onto_project_is_refused() {
        let project = project();
        let err = DirectoryBackup.create(project.path(), project.path(), GENEROUS).unwrap_err();
        assert!(matches!(err, MigrateError::Backup(_)));
        assert!(project.path().join("pubspec.yaml").is_file());
        assert!(project.path().join("lib/src/main.dart").is_file());
    }

    #[test]
    fn backup_onto_project_parent_is_refused() {
        let parent = tempfile::tempdir().unwrap();
        let app = parent.path().join("app");
        std::fs::create_dir_all(&app).unwrap();
        std::fs::write(app.join("a.txt"), "app").unwrap();
        std::fs::write(parent.path().join("precious.txt"), "keep me").unwrap();

        let err = DirectoryBackup.create(&app, parent.path(), GENEROUS).unwrap_err();
        assert!(matches!(err, MigrateError::Backup(_)));
        assert!(app.join("a.txt").is_file());
        assert!(parent.path().join("precious.txt").is_file());
    }

    #[test]
    fn foreign_directory_is_not_replaced() {
        let project = project();
        let other = tempfile::tempdir().unwrap();
        std::fs::write(other.path().join("notes.txt"), "mine").unwrap();

        let err = DirectoryBackup.create(project.path(), other.path(), GENEROUS).unwrap_err();
        assert!(matches!(err, MigrateError::Backup(_)));
        assert!(other.path().join("notes.txt").is_file());
    }

    #[test]
    fn earlier_backup_is_replaced() {
        let project = project();
        let backups = tempfile::tempdir().unwrap();
        let backup = backups.path().join("snapshot");

        DirectoryBackup.create(project.path(), &backup, GENEROUS).unwrap();
        std::fs::remove_file(project.path().join("pubspec.yaml")).unwrap();
        DirectoryBackup.create(project.path(), &backup, GENEROUS).unwrap();
        assert!(!backup.join("pubspec.yaml").exists());
        assert!(backup.join("lib/src/main.dart").is_file());
    }

    #[test]
    fn unmarked_directory_is_not_restored() {
        let project = project();
        let other = tempfile::tempdir().unwrap();
        let err = DirectoryBackup.restore(other.path(), project.path(), GENEROUS).unwrap_err();
        assert!(matches!(err, MigrateError::Restore(_)));
        assert!(project.path().join("pubspec.yaml").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_copied_as_links() {
        let project = project();
        std::os::unix::fs::symlink("lib", project.path().join("lib-link")).unwrap();
        let backups = tempfile::tempdir().unwrap();
        let backup = backups.path().join("snapshot");

        DirectoryBackup.create(project.path(), &backup, GENEROUS).unwrap();
        let link = backup.join("lib-link");
        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_link(&link).unwrap(), PathBuf::from("lib"));

        std::fs::remove_file(project.path().join("lib-link")).unwrap();
        DirectoryBackup.restore(&backup, project.path(), GENEROUS).unwrap();
        assert!(project.path().join("lib-link/src/main.dart").is_file());
    }

    #[test]
    fn exhausted_budget_times_out() {
        let project = project();
        let backups = tempfile::tempdir().unwrap();
        let err = DirectoryBackup
            .create(project.path(), &backups.path().join("snapshot"), Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, MigrateError::TimedOut { .. }));
    }

    #[test]
    fn missing_project_fails_backup() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectoryBackup
            .create(&dir.path().join("nope"), &dir.path().join("backup"), GENEROUS)
            .unwrap_err();
        assert!(matches!(err, MigrateError::Backup(_)));
    }

    #[test]
    fn missing_backup_fails_restore() {
        let project = project();
        let err = DirectoryBackup
            .restore(&project.path().join("nope"), project.path(), GENEROUS)
            .unwrap_err();
        assert!(matches!(err, MigrateError::Restore(_)));
    }
}
