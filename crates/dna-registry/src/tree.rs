//! Composition display.
//!
//! Formats a composition as a human-readable ASCII tree:
//! ```text
//! shop-app
//! ├── auth v1.0.0
//! │   └── core v1.0.0
//! └── payments v1.2.0
//!     └── core v1.0.0 (shared)
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use crate::compose::CompositionResult;
use crate::module::Module;

/// Format the dependency tree of a composition.
///
/// Requested modules are the top-level entries. A module reached a second
/// time is printed with a `(shared)` marker and not expanded again.
pub fn format_tree(root_name: &str, result: &CompositionResult) -> String {
    let by_id: HashMap<&str, &Module> = result.modules.iter().map(|m| (m.id.as_str(), m)).collect();
    let mut out = format!("{root_name}\n");

    let roots: Vec<&Module> = result
        .requested
        .iter()
        .filter_map(|id| by_id.get(id.as_str()).copied())
        .collect();

    // (module, prefix, is_last)
    let mut stack: Vec<(&Module, String, bool)> = roots
        .iter()
        .enumerate()
        .rev()
        .map(|(i, m)| (*m, String::new(), i == roots.len() - 1))
        .collect();
    let mut expanded: HashSet<&str> = HashSet::new();
    let mut entries = 0;

    while let Some((module, prefix, is_last)) = stack.pop() {
        entries += 1;
        let connector = if is_last { "└── " } else { "├── " };
        let shared = !expanded.insert(module.id.as_str());
        let shared_marker = if shared { " (shared)" } else { "" };
        let _ = writeln!(out, "{prefix}{connector}{} v{}{shared_marker}", module.id, module.version());

        if shared {
            continue;
        }

        let child_prefix = if is_last {
            format!("{prefix}    ")
        } else {
            format!("{prefix}│   ")
        };
        let children: Vec<&Module> = module
            .dependencies
            .iter()
            .filter_map(|dep| by_id.get(dep.module_id.as_str()).copied())
            .collect();
        for (i, child) in children.iter().enumerate().rev() {
            stack.push((*child, child_prefix.clone(), i == children.len() - 1));
        }
    }

    let _ = writeln!(out, "\n{entries} entries ({} unique)", expanded.len());
    out
}

/// Format a composition summary: validity, build order, diagnostics, cost.
pub fn format_report(result: &CompositionResult) -> String {
    let mut out = String::new();
    let status = if result.valid { "valid" } else { "invalid" };
    let _ = writeln!(out, "composition: {status}");
    let _ = writeln!(out, "requested:   {}", result.requested.join(", "));

    if result.dependency_order.is_empty() {
        let _ = writeln!(out, "build order: (none)");
    } else {
        let _ = writeln!(out, "build order: {}", result.dependency_order.join(" -> "));
    }

    if !result.errors.is_empty() {
        let _ = writeln!(out, "\nerrors ({}):", result.errors.len());
        for diagnostic in &result.errors {
            let _ = writeln!(out, "  {diagnostic}");
        }
    }
    if !result.warnings.is_empty() {
        let _ = writeln!(out, "\nwarnings ({}):", result.warnings.len());
        for diagnostic in &result.warnings {
            let _ = writeln!(out, "  {diagnostic}");
        }
    }

    let perf = &result.performance;
    let _ = writeln!(
        out,
        "\n{} modules, complexity {}, ~{} bytes, {}us",
        result.modules.len(),
        perf.complexity,
        perf.memory_bytes,
        perf.time_us
    );
    out
}
