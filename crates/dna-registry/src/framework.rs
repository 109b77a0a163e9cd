//! Framework compatibility checks.

use std::sync::Arc;

use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::module::{CompatibilityLevel, Module};

/// Check every module against the target framework.
///
/// A missing declaration, `supported = false`, or a `none` compatibility
/// level is blocking; partial support is a warning.
pub fn check_frameworks(modules: &[Arc<Module>], framework: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for module in modules {
        match module.framework_support(framework) {
            None => diagnostics.push(Diagnostic::error(
                DiagnosticKind::FrameworkIncompatible,
                Some(module.id.as_str()),
                format!("'{}' does not declare support for framework '{framework}'", module.id),
            )),
            Some(support) if !support.supported || support.compatibility == CompatibilityLevel::None => {
                diagnostics.push(Diagnostic::error(
                    DiagnosticKind::FrameworkIncompatible,
                    Some(module.id.as_str()),
                    format!("'{}' is not supported on framework '{framework}'", module.id),
                ))
            }
            Some(support) if support.compatibility == CompatibilityLevel::Partial => {
                let mut message = format!("'{}' has partial support for framework '{framework}'", module.id);
                if !support.limitations.is_empty() {
                    message.push_str(&format!(" ({})", support.limitations.join("; ")));
                }
                diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::FrameworkPartialSupport,
                    Some(module.id.as_str()),
                    message,
                ));
            }
            Some(_) => {}
        }
    }

    diagnostics
}

/// Distinct frameworks supported by at least one module.
pub fn supported_frameworks(modules: &[Arc<Module>]) -> Vec<String> {
    let mut frameworks: Vec<String> = modules
        .iter()
        .flat_map(|m| m.frameworks.iter())
        .filter(|f| f.supported)
        .map(|f| f.framework.clone())
        .collect();
    frameworks.sort();
    frameworks.dedup();
    frameworks
}
