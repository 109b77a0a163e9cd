//! End-to-end composition over manifests loaded from disk.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;

use dna_registry::{
    format_tree, load_all, version, ChannelSink, Composition, CompositionEngine, DiagnosticKind, EventBus,
    LifecycleEvent, LocalSource, Module, ModuleCatalog, ModuleSource, RegistryError,
};

const CORE: &str = r#"
[module]
id = "core"
name = "Core"
version = "1.0.0"
category = "infrastructure"

[[frameworks]]
framework = "flutter"
supported = true
compatibility = "full"
"#;

const AUTH: &str = r#"
[module]
id = "auth"
name = "Authentication"
version = "1.0.0"
category = "authentication"

[[dependencies]]
module = "core"

[[frameworks]]
framework = "flutter"
supported = true
compatibility = "full"

[config]
defaults = { provider = "email", session-minutes = 30 }

[[config.rules]]
field = "session-minutes"
rule = "range"
min = 5
max = 1440
"#;

const PAYMENTS: &str = r#"
[module]
id = "payments"
name = "Payments"
version = "1.0.0"
category = "payments"

[[conflicts]]
module = "payments-legacy"
reason = "both install a checkout flow"
severity = "error"

[[frameworks]]
framework = "flutter"
supported = true
compatibility = "full"
"#;

const PAYMENTS_LEGACY: &str = r#"
[module]
id = "payments-legacy"
name = "Legacy payments"
version = "1.0.0"
category = "payments"

[[frameworks]]
framework = "flutter"
supported = true
compatibility = "full"
"#;

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).expect("write manifest");
}

fn catalog_from_disk() -> (tempfile::TempDir, ModuleCatalog) {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "core.toml", CORE);
    write(dir.path(), "auth.toml", AUTH);
    write(dir.path(), "payments.toml", PAYMENTS);
    write(dir.path(), "payments-legacy.toml", PAYMENTS_LEGACY);

    let sources: Vec<Box<dyn ModuleSource>> = vec![Box::new(LocalSource::new(dir.path()))];
    let mut catalog = ModuleCatalog::new();
    catalog
        .register_all(load_all(&sources).expect("load"))
        .expect("register");
    (dir, catalog)
}

#[test]
fn auth_composes_after_core() {
    let (_dir, catalog) = catalog_from_disk();
    let engine = CompositionEngine::new(catalog.shared());

    let result = engine
        .compose_dna(&Composition::new("flutter", ["auth"]))
        .expect("compose");
    assert!(result.valid, "unexpected errors: {:?}", result.errors);
    assert_eq!(result.dependency_order, vec!["core", "auth"]);
    assert_eq!(result.module_config("auth").expect("auth config")["provider"], "email");

    let tree = format_tree("app", &result);
    assert!(tree.contains("└── auth v1.0.0"));
    assert!(tree.contains("    └── core v1.0.0"));
}

#[test]
fn conflicting_payments_yield_one_error() {
    let (_dir, catalog) = catalog_from_disk();
    let engine = CompositionEngine::new(catalog.shared());

    let result = engine
        .compose_dna(&Composition::new("flutter", ["payments", "payments-legacy"]))
        .expect("compose");
    assert!(!result.valid);
    let conflicts: Vec<_> = result
        .errors
        .iter()
        .filter(|d| d.kind == DiagnosticKind::ModuleConflict)
        .collect();
    assert_eq!(conflicts.len(), 1);
    assert!(conflicts[0].message.contains("checkout flow"));
}

#[test]
fn reversed_request_still_detects_conflict() {
    let (_dir, catalog) = catalog_from_disk();
    let engine = CompositionEngine::new(catalog.shared());

    let result = engine
        .compose_dna(&Composition::new("flutter", ["payments-legacy", "payments"]))
        .expect("compose");
    assert!(result.has_error(DiagnosticKind::ModuleConflict));
}

#[test]
fn warning_conflict_stays_valid() {
    let mut catalog = ModuleCatalog::new();
    catalog
        .register(
            Module::new("analytics", "1.0.0")
                .with_framework("flutter", dna_registry::CompatibilityLevel::Full)
                .with_conflict("monitoring", dna_registry::ConflictSeverity::Warning),
        )
        .expect("register");
    catalog
        .register(Module::new("monitoring", "1.0.0").with_framework("flutter", dna_registry::CompatibilityLevel::Full))
        .expect("register");

    let result = CompositionEngine::new(catalog.shared())
        .compose_dna(&Composition::new("flutter", ["analytics", "monitoring"]))
        .expect("compose");
    assert!(result.valid);
    assert_eq!(result.warnings.len(), 1);
}

#[test]
fn mutual_dependency_is_circular() {
    let mut catalog = ModuleCatalog::new();
    catalog
        .register_all([
            Module::new("a", "1.0.0").with_dependency("b"),
            Module::new("b", "1.0.0").with_dependency("a"),
        ])
        .expect("register");

    let result = CompositionEngine::new(catalog.shared())
        .compose_dna(&Composition::new("flutter", ["a"]))
        .expect("compose");
    assert!(!result.valid);
    assert!(result.has_error(DiagnosticKind::CircularDependency));
    assert!(result.dependency_order.is_empty());
}

#[test]
fn missing_module_is_critical() {
    let (_dir, catalog) = catalog_from_disk();
    let result = CompositionEngine::new(catalog.shared())
        .compose_dna(&Composition::new("flutter", ["does-not-exist"]))
        .expect("compose");
    assert!(!result.valid);
    assert_eq!(result.errors[0].kind, DiagnosticKind::ModuleNotFound);
    assert_eq!(result.errors[0].severity, dna_registry::Severity::Critical);
}

#[test]
fn duplicate_registration_rejected() {
    let (_dir, mut catalog) = catalog_from_disk();
    let err = catalog.register(Module::new("core", "1.0.0")).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateModule { .. }));
}

#[test]
fn numeric_version_ordering() {
    assert_eq!(version::compare("1.2.0", "1.10.0"), Ordering::Less);
    assert_eq!(version::compare("1.0", "1.0.0"), Ordering::Equal);
}

#[test]
fn composition_emits_events() {
    let (_dir, catalog) = catalog_from_disk();
    let (tx, rx) = mpsc::channel();
    let engine = CompositionEngine::new(catalog.shared())
        .with_events(EventBus::new().with_sink(Arc::new(ChannelSink::new(tx))));

    engine
        .compose_dna(&Composition::new("flutter", ["auth"]))
        .expect("compose");

    let events: Vec<LifecycleEvent> = rx.try_iter().collect();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], LifecycleEvent::CompositionStarted { .. }));
    assert!(matches!(
        events[1],
        LifecycleEvent::CompositionCompleted { valid: true, .. }
    ));
}

#[test]
fn concurrent_compositions_share_catalog() {
    let (_dir, catalog) = catalog_from_disk();
    let engine = Arc::new(CompositionEngine::new(catalog.shared()));

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let engine = engine.clone();
            scope.spawn(move || {
                let result = engine
                    .compose_dna(&Composition::new("flutter", ["auth"]))
                    .expect("compose");
                assert_eq!(result.dependency_order, vec!["core", "auth"]);
            });
        }
    });
}
