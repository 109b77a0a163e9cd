//! Composition diagnostics.

use std::fmt;

use serde::Serialize;

/// What a diagnostic is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticKind {
    ModuleNotFound,
    ModuleExperimentalDisallowed,
    MissingRequiredDependency,
    CircularDependency,
    ModuleConflict,
    FrameworkIncompatible,
    ModuleDeprecated,
    FrameworkPartialSupport,
    ConfigInvalid,
    CompositionError,
}

impl DiagnosticKind {
    /// Stable machine-readable code, e.g. `MODULE_NOT_FOUND`.
    pub fn code(self) -> &'static str {
        match self {
            DiagnosticKind::ModuleNotFound => "MODULE_NOT_FOUND",
            DiagnosticKind::ModuleExperimentalDisallowed => "MODULE_EXPERIMENTAL_DISALLOWED",
            DiagnosticKind::MissingRequiredDependency => "MISSING_REQUIRED_DEPENDENCY",
            DiagnosticKind::CircularDependency => "CIRCULAR_DEPENDENCY",
            DiagnosticKind::ModuleConflict => "MODULE_CONFLICT",
            DiagnosticKind::FrameworkIncompatible => "FRAMEWORK_INCOMPATIBLE",
            DiagnosticKind::ModuleDeprecated => "MODULE_DEPRECATED",
            DiagnosticKind::FrameworkPartialSupport => "FRAMEWORK_PARTIAL_SUPPORT",
            DiagnosticKind::ConfigInvalid => "CONFIG_INVALID",
            DiagnosticKind::CompositionError => "COMPOSITION_ERROR",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// How serious a diagnostic is. Everything but `Warning` blocks composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

/// One finding produced while composing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    /// Module the finding is about, when there is one.
    pub module_id: Option<String>,
    pub message: String,
    /// Suggested fix.
    pub resolution: Option<String>,
}

impl Diagnostic {
    /// A blocking error.
    pub fn error(kind: DiagnosticKind, module_id: Option<&str>, message: impl Into<String>) -> Self {
        Self::with_severity(kind, Severity::Error, module_id, message)
    }

    /// A blocking critical error.
    pub fn critical(kind: DiagnosticKind, module_id: Option<&str>, message: impl Into<String>) -> Self {
        Self::with_severity(kind, Severity::Critical, module_id, message)
    }

    /// A non-blocking warning.
    pub fn warning(kind: DiagnosticKind, module_id: Option<&str>, message: impl Into<String>) -> Self {
        Self::with_severity(kind, Severity::Warning, module_id, message)
    }

    fn with_severity(kind: DiagnosticKind, severity: Severity, module_id: Option<&str>, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            severity,
            module_id: module_id.map(str::to_string),
            message: message.into(),
            resolution: None,
        }
    }

    /// Attach a resolution hint.
    pub fn with_resolution(mut self, resolution: Option<String>) -> Self {
        self.resolution = resolution;
        self
    }

    /// Whether this diagnostic makes the composition invalid.
    pub fn is_blocking(&self) -> bool {
        self.severity != Severity::Warning
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(hint) = &self.resolution {
            write!(f, " (hint: {hint})")?;
        }
        Ok(())
    }
}
