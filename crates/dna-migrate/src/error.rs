//! Migration error types.

use std::time::Duration;

/// Errors that can occur while planning or running a migration.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Creating the pre-migration backup failed.
    #[error("backup failed: {0}")]
    Backup(String),

    /// Restoring the project from its backup failed.
    #[error("restore failed: {0}")]
    Restore(String),

    /// A step script exited unsuccessfully or could not be started.
    #[error("script failed: {0}")]
    Script(String),

    /// A script, backup, or restore did not finish in time.
    #[error("{operation} timed out after {}s", timeout.as_secs())]
    TimedOut { operation: String, timeout: Duration },

    /// A migration step definition is malformed.
    #[error("invalid migration step for '{module_id}': {detail}")]
    InvalidStep { module_id: String, detail: String },

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_out_display() {
        let err = MigrateError::TimedOut {
            operation: "backup".into(),
            timeout: Duration::from_secs(600),
        };
        assert_eq!(err.to_string(), "backup timed out after 600s");
    }
}
