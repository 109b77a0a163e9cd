//! Pairwise conflict detection over a resolved module set.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::module::{Conflict, ConflictSeverity, Module};
use crate::version;

/// The conflict `declarer` declares against `other`, if any.
///
/// A conflict entry with a version only matches that exact version.
pub fn declared_conflict<'a>(declarer: &'a Module, other: &Module) -> Option<&'a Conflict> {
    declarer.conflicts.iter().find(|c| {
        c.module_id == other.id
            && c.version
                .as_deref()
                .map_or(true, |v| version::compare(v, other.version()) == Ordering::Equal)
    })
}

/// Scan every unordered pair of `modules` once for declared conflicts.
///
/// For a pair `(A, B)` with `A` first in resolution order, `A`'s
/// declaration is checked; with `symmetric` set, `B`'s declaration against
/// `A` is checked when `A` declares nothing. At most one diagnostic is
/// emitted per pair.
pub fn check_conflicts(modules: &[Arc<Module>], symmetric: bool) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for (i, a) in modules.iter().enumerate() {
        for b in &modules[i + 1..] {
            let found = declared_conflict(a, b)
                .map(|c| (a, b, c))
                .or_else(|| symmetric.then(|| declared_conflict(b, a).map(|c| (b, a, c))).flatten());

            if let Some((declarer, other, conflict)) = found {
                diagnostics.push(conflict_diagnostic(declarer, other, conflict));
            }
        }
    }

    diagnostics
}

fn conflict_diagnostic(declarer: &Module, other: &Module, conflict: &Conflict) -> Diagnostic {
    let reason = if conflict.reason.is_empty() {
        String::new()
    } else {
        format!(": {}", conflict.reason)
    };
    let message = format!(
        "'{}@{}' conflicts with '{}@{}'{reason}",
        declarer.id,
        declarer.version(),
        other.id,
        other.version()
    );
    let diagnostic = match conflict.severity {
        ConflictSeverity::Error => Diagnostic::error(DiagnosticKind::ModuleConflict, Some(declarer.id.as_str()), message),
        ConflictSeverity::Warning => Diagnostic::warning(DiagnosticKind::ModuleConflict, Some(declarer.id.as_str()), message),
    };
    diagnostic.with_resolution(conflict.resolution.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arcs(modules: Vec<Module>) -> Vec<Arc<Module>> {
        modules.into_iter().map(Arc::new).collect()
    }

    #[test]
    fn error_conflict_blocks() {
        let modules = arcs(vec![
            Module::new("payments", "1.0.0").with_conflict("payments-legacy", ConflictSeverity::Error),
            Module::new("payments-legacy", "1.0.0"),
        ]);
        let diags = check_conflicts(&modules, true);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].is_blocking());
        assert_eq!(diags[0].kind, DiagnosticKind::ModuleConflict);
    }

    #[test]
    fn warning_conflict_carries_hint() {
        let mut a = Module::new("a", "1.0.0").with_conflict("b", ConflictSeverity::Warning);
        a.conflicts[0].resolution = Some("pick one".into());
        let diags = check_conflicts(&arcs(vec![a, Module::new("b", "1.0.0")]), true);
        assert_eq!(diags.len(), 1);
        assert!(!diags[0].is_blocking());
        assert_eq!(diags[0].resolution.as_deref(), Some("pick one"));
    }

    #[test]
    fn directional_check_depends_on_order() {
        let modules = arcs(vec![
            Module::new("b", "1.0.0"),
            Module::new("a", "1.0.0").with_conflict("b", ConflictSeverity::Error),
        ]);
        assert!(check_conflicts(&modules, false).is_empty());
        assert_eq!(check_conflicts(&modules, true).len(), 1);
    }

    #[test]
    fn mutual_declarations_reported_once() {
        let modules = arcs(vec![
            Module::new("a", "1.0.0").with_conflict("b", ConflictSeverity::Error),
            Module::new("b", "1.0.0").with_conflict("a", ConflictSeverity::Error),
        ]);
        assert_eq!(check_conflicts(&modules, true).len(), 1);
    }

    #[test]
    fn versioned_conflict_matches_exact_version_only() {
        let mut a = Module::new("a", "1.0.0").with_conflict("b", ConflictSeverity::Error);
        a.conflicts[0].version = Some("1.0.0".into());
        let old = arcs(vec![a.clone(), Module::new("b", "1.0.0")]);
        let new = arcs(vec![a, Module::new("b", "2.0.0")]);
        assert_eq!(check_conflicts(&old, true).len(), 1);
        assert!(check_conflicts(&new, true).is_empty());
    }
}
