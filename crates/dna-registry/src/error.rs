//! Registry error types.

/// Errors that can occur during catalog, source, and resolution operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Module already registered at this version.
    #[error("module '{id}@{version}' already registered")]
    DuplicateModule { id: String, version: String },

    /// Module lists itself as a dependency.
    #[error("module '{id}' declares a dependency on itself")]
    SelfDependency { id: String },

    /// Module metadata failed validation.
    #[error("invalid metadata for module '{id}': {detail}")]
    InvalidMetadata { id: String, detail: String },

    /// A non-optional dependency, or the exact version it pins, is absent
    /// from the catalog.
    #[error("missing dependency '{dependency}'{} required by '{required_by}'", pinned_suffix(version))]
    MissingDependency {
        dependency: String,
        version: Option<String>,
        required_by: String,
    },

    /// The resolved set contains a dependency cycle.
    #[error("circular dependency: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// Malformed composition request.
    #[error("invalid composition request: {detail}")]
    InvalidRequest { detail: String },

    /// A writer panicked while holding the catalog lock.
    #[error("module catalog lock poisoned")]
    CatalogPoisoned,

    /// A module source failed to load.
    #[error("failed to load source '{source_name}': {detail}")]
    Source { source_name: String, detail: String },

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn pinned_suffix(version: &Option<String>) -> String {
    version.as_deref().map(|v| format!(" version {v}")).unwrap_or_default()
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_dependency_display_joins_path() {
        let err = RegistryError::CircularDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "circular dependency: a -> b -> a");
    }

    #[test]
    fn missing_dependency_display() {
        let err = RegistryError::MissingDependency {
            dependency: "core".into(),
            version: None,
            required_by: "auth".into(),
        };
        assert_eq!(err.to_string(), "missing dependency 'core' required by 'auth'");

        let pinned = RegistryError::MissingDependency {
            dependency: "core".into(),
            version: Some("3.0.0".into()),
            required_by: "auth".into(),
        };
        assert_eq!(pinned.to_string(), "missing dependency 'core' version 3.0.0 required by 'auth'");
    }
}
