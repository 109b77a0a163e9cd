//! `dna compose` and `dna tree`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use dna_registry::{format_report, format_tree, CompositionEngine, CompositionPolicy, CompositionResult};
use tracing::debug;

use super::{OutputFormat, Workspace};

/// Options shared by `compose` and `tree`.
#[derive(Debug, Clone, Default)]
pub struct ComposeOptions {
    /// `ID` or `ID@VERSION` specs; empty means the manifest's modules.
    pub modules: Vec<String>,
    pub framework: Option<String>,
    pub allow_experimental: bool,
    /// Catalog paths in addition to the manifest's.
    pub catalog: Vec<PathBuf>,
}

/// Compose the requested modules against the workspace catalog.
pub fn compose(workspace: &Workspace, options: &ComposeOptions) -> Result<CompositionResult> {
    let catalog = workspace.load_catalog(&options.catalog)?;
    debug!(modules = catalog.len(), "catalog loaded");

    let mut policy = workspace
        .manifest
        .as_ref()
        .map(|m| m.policy.composition)
        .unwrap_or_else(CompositionPolicy::default);
    if options.allow_experimental {
        policy.allow_experimental = true;
    }

    let request = workspace.composition(&options.modules, options.framework.as_deref())?;
    let engine = CompositionEngine::new(catalog.shared()).with_policy(policy);
    engine.compose_dna(&request).context("composition failed")
}

/// Run `dna compose`. Returns whether the composition is valid.
pub fn run(workspace: &Workspace, options: &ComposeOptions, format: OutputFormat) -> Result<bool> {
    let result = compose(workspace, options)?;
    match format {
        OutputFormat::Text => print!("{}", format_report(&result)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(result.valid)
}

/// Run `dna tree`. Returns whether the composition is valid.
pub fn tree(workspace: &Workspace, options: &ComposeOptions) -> Result<bool> {
    let result = compose(workspace, options)?;
    if result.valid {
        print!("{}", format_tree(&workspace.project_name(), &result));
    } else {
        eprint!("{}", format_report(&result));
    }
    Ok(result.valid)
}
