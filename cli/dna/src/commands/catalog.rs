//! `dna search`: query the module catalog.

use std::path::PathBuf;

use anyhow::Result;

use super::{OutputFormat, Workspace};

/// Run `dna search <query>`.
pub fn search(workspace: &Workspace, query: &str, catalog: &[PathBuf], format: OutputFormat) -> Result<()> {
    let catalog = workspace.load_catalog(catalog)?;
    let found = catalog.search(query);

    if format == OutputFormat::Json {
        let modules: Vec<_> = found.iter().map(|m| m.as_ref()).collect();
        println!("{}", serde_json::to_string_pretty(&modules)?);
        return Ok(());
    }

    if found.is_empty() {
        println!("No modules match '{query}'");
        return Ok(());
    }

    let width = found.iter().map(|m| m.id.len()).max().unwrap_or(0);
    for module in &found {
        let mut flags = Vec::new();
        if module.is_deprecated() {
            flags.push("deprecated");
        }
        if module.is_experimental() {
            flags.push("experimental");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        let versions = catalog.versions(&module.id);
        println!(
            "{:<width$}  v{:<8} {}{flags}",
            module.id,
            module.version(),
            module.metadata.description
        );
        if versions.len() > 1 {
            println!("{:<width$}  versions: {}", "", versions.join(", "));
        }
    }
    Ok(())
}
