//! CLI command implementations.

pub mod catalog;
pub mod compose;
pub mod migrate;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use dna_registry::{load_all, Composition, LatestPolicy, LocalSource, ModuleCatalog, ModuleRequest, ModuleSource};

use crate::manifest::DnaManifest;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Where a command runs: the project directory and its manifest, if any.
pub struct Workspace {
    pub dir: PathBuf,
    pub manifest: Option<DnaManifest>,
}

impl Workspace {
    /// Load the manifest from `cwd` upward; fall back to `cwd` without one.
    pub fn discover(cwd: &Path) -> Result<Self> {
        Ok(match DnaManifest::find_and_load(cwd)? {
            Some((manifest, dir)) => Workspace {
                dir,
                manifest: Some(manifest),
            },
            None => Workspace {
                dir: cwd.to_path_buf(),
                manifest: None,
            },
        })
    }

    /// Build the module catalog from the manifest's catalog paths plus
    /// `extra`. Without any configured path, `<project>/modules` is used.
    pub fn load_catalog(&self, extra: &[PathBuf]) -> Result<ModuleCatalog> {
        let mut paths = self
            .manifest
            .as_ref()
            .map(|m| m.catalog_paths(&self.dir))
            .unwrap_or_default();
        paths.extend(extra.iter().cloned());
        if paths.is_empty() {
            let default = self.dir.join("modules");
            if !default.is_dir() {
                bail!(
                    "no module catalog configured (set [catalog] paths in dna.toml or pass --catalog)"
                );
            }
            paths.push(default);
        }

        let sources: Vec<Box<dyn ModuleSource>> = paths
            .into_iter()
            .map(|p| Box::new(LocalSource::new(p)) as Box<dyn ModuleSource>)
            .collect();
        let modules = load_all(&sources).context("loading module catalog")?;

        let latest = self
            .manifest
            .as_ref()
            .map(|m| m.policy.latest)
            .unwrap_or(LatestPolicy::LastRegistered);
        let mut catalog = ModuleCatalog::with_policy(latest);
        catalog.register_all(modules).context("registering modules")?;
        Ok(catalog)
    }

    /// Build a composition request from command-line specs, falling back to
    /// the manifest's `[[modules]]` and project framework.
    pub fn composition(&self, specs: &[String], framework: Option<&str>) -> Result<Composition> {
        let manifest = self.manifest.as_ref();

        let modules: Vec<ModuleRequest> = if specs.is_empty() {
            manifest
                .map(|m| m.modules.iter().map(|e| e.to_request()).collect())
                .unwrap_or_default()
        } else {
            specs
                .iter()
                .map(|spec| -> Result<ModuleRequest> {
                    let mut request = parse_module_spec(spec)?;
                    if let Some(entry) = manifest.and_then(|m| m.module(&request.module_id)) {
                        request.config_override = entry.config.clone();
                    }
                    Ok(request)
                })
                .collect::<Result<_>>()?
        };
        if modules.is_empty() {
            bail!("no modules requested (pass --module or list [[modules]] in dna.toml)");
        }

        let framework = framework
            .map(str::to_string)
            .or_else(|| manifest.and_then(|m| m.project.framework.clone()))
            .context("no framework given (pass --framework or set project.framework in dna.toml)")?;

        Ok(Composition {
            modules,
            framework,
            template_type: manifest
                .map(|m| m.project.template.clone())
                .unwrap_or_else(|| "default".to_string()),
            global_config: manifest.map(|m| m.global.clone()).unwrap_or_default(),
        })
    }

    /// Display name for the project.
    pub fn project_name(&self) -> String {
        match &self.manifest {
            Some(m) => m.project.name.clone(),
            None => self
                .dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_string()),
        }
    }
}

/// Parse `ID` or `ID@VERSION`.
pub fn parse_module_spec(spec: &str) -> Result<ModuleRequest> {
    let (id, version) = match spec.split_once('@') {
        Some((id, version)) => (id, Some(version)),
        None => (spec, None),
    };
    if id.trim().is_empty() {
        bail!("invalid module spec '{spec}': empty module id");
    }
    Ok(match version {
        Some(v) if !v.is_empty() => ModuleRequest::exact(id, v),
        Some(_) => bail!("invalid module spec '{spec}': empty version"),
        None => ModuleRequest::latest(id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_spec_forms() {
        let latest = parse_module_spec("auth").unwrap();
        assert_eq!(latest.module_id, "auth");
        assert!(latest.version.is_none());

        let exact = parse_module_spec("auth@1.2.0").unwrap();
        assert_eq!(exact.version.as_deref(), Some("1.2.0"));

        assert!(parse_module_spec("@1.0.0").is_err());
        assert!(parse_module_spec("auth@").is_err());
    }

    #[test]
    fn composition_falls_back_to_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("dna.toml"),
            r#"
[project]
name = "shop"
framework = "flutter"

[[modules]]
id = "auth"
config = { provider = "oauth" }

[global]
app_name = "Shop"
"#,
        )
        .unwrap();
        let workspace = Workspace::discover(dir.path()).unwrap();

        let from_manifest = workspace.composition(&[], None).unwrap();
        assert_eq!(from_manifest.framework, "flutter");
        assert_eq!(from_manifest.modules[0].module_id, "auth");
        assert_eq!(from_manifest.global_config["app_name"], "Shop");

        let from_flags = workspace
            .composition(&["auth@2.0.0".to_string()], Some("tauri"))
            .unwrap();
        assert_eq!(from_flags.framework, "tauri");
        assert_eq!(from_flags.modules[0].version.as_deref(), Some("2.0.0"));
        assert_eq!(from_flags.modules[0].config_override["provider"], "oauth");
    }

    #[test]
    fn composition_needs_modules_and_framework() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::discover(dir.path()).unwrap();
        assert!(workspace.composition(&[], Some("flutter")).is_err());
        assert!(workspace.composition(&["auth".to_string()], None).is_err());
    }

    #[test]
    fn catalog_requires_a_source() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::discover(dir.path()).unwrap();
        assert!(workspace.load_catalog(&[]).is_err());
    }
}
