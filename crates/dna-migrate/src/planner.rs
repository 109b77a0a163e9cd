//! Migration planning: which steps lie between two versions.

use std::cmp::Ordering;
use std::fmt::Write;

use dna_registry::version;
use serde::Serialize;

use crate::step::{MigrationRegistry, MigrationStep};

/// Summary of an upgrade before running it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationPreview {
    pub module_id: String,
    pub from: String,
    pub to: String,
    pub steps: Vec<MigrationStep>,
    pub breaking_changes: Vec<MigrationStep>,
    pub automated_steps: usize,
    pub manual_steps: usize,
    pub estimated_minutes: u64,
    /// `estimated_minutes` in human form, e.g. `"45 minutes"` or `"1h 30m"`.
    pub estimated_duration: String,
}

/// Plans upgrades over a [`MigrationRegistry`].
#[derive(Debug, Clone, Default)]
pub struct MigrationPlanner {
    registry: MigrationRegistry,
}

impl MigrationPlanner {
    pub fn new(registry: MigrationRegistry) -> Self {
        MigrationPlanner { registry }
    }

    /// The underlying step registry.
    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// Mutable access for registering more steps.
    pub fn registry_mut(&mut self) -> &mut MigrationRegistry {
        &mut self.registry
    }

    /// Steps needed to go from `from` to `to`, ascending by version.
    ///
    /// A step is included when `from < step.version <= to`. Equal versions
    /// and downgrades produce an empty path.
    pub fn get_migration_path(&self, module_id: &str, from: &str, to: &str) -> Vec<MigrationStep> {
        if version::compare(from, to) != Ordering::Less {
            return Vec::new();
        }

        let mut versions: Vec<(&str, &[MigrationStep])> = self
            .registry
            .module_steps(module_id)
            .filter(|(v, _)| version::in_upgrade_range(v, from, to))
            .collect();
        versions.sort_by(|a, b| version::compare(a.0, b.0).then_with(|| a.0.cmp(b.0)));

        versions
            .into_iter()
            .flat_map(|(_, steps)| steps.iter().cloned())
            .collect()
    }

    /// Breaking steps on the path from `from` to `to`.
    pub fn get_breaking_changes(&self, module_id: &str, from: &str, to: &str) -> Vec<MigrationStep> {
        self.get_migration_path(module_id, from, to)
            .into_iter()
            .filter(|s| s.breaking)
            .collect()
    }

    /// Whether any step lies between `from` and `to`.
    pub fn is_migration_needed(&self, module_id: &str, from: &str, to: &str) -> bool {
        !self.get_migration_path(module_id, from, to).is_empty()
    }

    /// Preview an upgrade: step counts and a rough duration estimate.
    ///
    /// Every step is budgeted 2 minutes, manual steps 5 more.
    pub fn get_migration_preview(&self, module_id: &str, from: &str, to: &str) -> MigrationPreview {
        let steps = self.get_migration_path(module_id, from, to);
        let breaking_changes: Vec<MigrationStep> = steps.iter().filter(|s| s.breaking).cloned().collect();
        let automated_steps = steps.iter().filter(|s| s.automated).count();
        let manual_steps = steps.len() - automated_steps;
        let estimated_minutes = steps.len() as u64 * 2 + manual_steps as u64 * 5;

        MigrationPreview {
            module_id: module_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            steps,
            breaking_changes,
            automated_steps,
            manual_steps,
            estimated_minutes,
            estimated_duration: format_duration(estimated_minutes),
        }
    }
}

/// `"N minutes"` below an hour, `"Xh Ym"` from an hour up.
pub fn format_duration(minutes: u64) -> String {
    if minutes < 60 {
        format!("{minutes} minutes")
    } else {
        format!("{}h {}m", minutes / 60, minutes % 60)
    }
}

/// Human-readable migration preview.
pub fn format_preview(preview: &MigrationPreview) -> String {
    let mut out = format!("{} {} -> {}\n", preview.module_id, preview.from, preview.to);

    if preview.steps.is_empty() {
        out.push_str("  no migration needed\n");
        return out;
    }

    for step in &preview.steps {
        let kind = if step.automated { "auto" } else { "manual" };
        let breaking = if step.breaking { " [breaking]" } else { "" };
        let _ = writeln!(out, "  {} ({kind}){breaking}: {}", step.version, step.description);
        for line in &step.instructions {
            let _ = writeln!(out, "      - {line}");
        }
    }

    let _ = writeln!(
        out,
        "\n{} steps ({} automated, {} manual, {} breaking), estimated {}",
        preview.steps.len(),
        preview.automated_steps,
        preview.manual_steps,
        preview.breaking_changes.len(),
        preview.estimated_duration
    );
    out
}
