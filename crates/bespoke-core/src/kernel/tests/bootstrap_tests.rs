use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::tempdir;

use crate::kernel::bootstrap::{Application, HostRuntime};
use crate::kernel::error::Error;
use crate::module_system::error::{ModuleSystemError, UnitError};
use crate::module_system::metadata::ModuleMetadata;
use crate::module_system::notifier::NoopNotifier;
use crate::module_system::record::DisableReason;
use crate::module_system::tests::support::{Events, FakeUnits, location, meta, position};
use crate::storage::vault::{Vault, VaultEntry};

const ANCHOR: &str = "internal/internal";

/// Host that records its initialization into the shared event log
struct FakeHost {
    events: Events,
    fail: bool,
}

#[async_trait]
impl HostRuntime for FakeHost {
    async fn initialize(&self) -> Result<(), UnitError> {
        self.events.lock().push("host".to_string());
        if self.fail {
            return Err("host refused to start".into());
        }
        Ok(())
    }
}

fn write_module(root: &Path, metadata: &ModuleMetadata) {
    let path = root.join(location(&metadata.identifier()).trim_start_matches('/'));
    fs::create_dir_all(path.parent().expect("metadata has a parent dir")).expect("Failed to create module dir");
    fs::write(&path, serde_json::to_string(metadata).expect("metadata serializes")).expect("Failed to write metadata");
}

fn write_vault(root: &Path, entries: &[(&str, bool)]) {
    let mut vault = Vault::new();
    for (identifier, enabled) in entries {
        vault
            .add(identifier, VaultEntry::new(location(identifier), *enabled))
            .expect("vault entry should be new");
    }
    fs::write(root.join("vault.json"), vault.to_json().expect("vault serializes")).expect("Failed to write vault");
}

fn application(root: &Path, units: FakeUnits) -> Application {
    Application::from_root(root.to_path_buf(), None, Arc::new(units), Arc::new(NoopNotifier))
        .expect("Application::from_root failed")
}

#[tokio::test]
async fn test_start_runs_phases_around_host_initialization() {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    write_module(temp_dir.path(), &meta("alice/base", &[]));
    write_module(temp_dir.path(), &meta("alice/theme", &["alice/base"]));
    write_vault(temp_dir.path(), &[("alice/base", true), ("alice/theme", true)]);

    let units = FakeUnits::new();
    let events = units.events.clone();
    let mut app = application(temp_dir.path(), units);
    assert!(!app.is_started());

    let host = FakeHost { events: events.clone(), fail: false };
    let report = app.start(&host).await.expect("start should succeed");

    assert!(app.is_started());
    let (vault, resolution) = app.prepared().expect("start prepares the vault");
    assert_eq!(vault.loaded, vec!["alice/base", "alice/theme"]);
    assert!(resolution.is_clean());
    assert_eq!(report.pre_init, vec!["alice/base", "alice/theme", ANCHOR]);
    assert_eq!(report.post_init.activated, vec!["alice/base", "alice/theme", ANCHOR]);
    assert!(report.post_init.failures.is_empty());
    assert!(report.anchor_failures.is_empty());

    let at = |event: &str| position(&events, event).unwrap_or_else(|| panic!("missing event {}", event));
    assert!(at("mixin:alice/base") < at("mixin:alice/theme"));
    assert!(at("mixin:alice/theme") < at("host"));
    assert!(at("host") < at("style:alice/base"));
    assert!(at("style:alice/theme") < at("code:alice/base"));
    assert!(at("code:alice/base") < at("code:alice/theme"));
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let units = FakeUnits::new();
    let events = units.events.clone();
    let mut app = application(temp_dir.path(), units);
    let host = FakeHost { events, fail: false };

    app.start(&host).await.expect("first start should succeed");
    let result = app.start(&host).await;
    assert!(matches!(result, Err(Error::Other(ref message)) if message == "Application already started"));
}

#[tokio::test]
async fn test_missing_vault_starts_only_the_anchor() {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let units = FakeUnits::new();
    let events = units.events.clone();
    let mut app = application(temp_dir.path(), units);

    let report = app
        .start(&FakeHost { events: events.clone(), fail: false })
        .await
        .expect("start should succeed");

    let (vault, _) = app.prepared().expect("start prepares the vault");
    assert!(vault.loaded.is_empty());
    assert!(vault.failed.is_empty());
    assert_eq!(report.pre_init, vec![ANCHOR]);
    assert_eq!(events.lock().clone(), vec!["host"]);
}

#[tokio::test]
async fn test_pre_init_failure_aborts_before_host() {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    write_module(temp_dir.path(), &meta("alice/base", &[]));
    write_vault(temp_dir.path(), &[("alice/base", true)]);

    let units = FakeUnits::new().fail_mixin("alice/base");
    let events = units.events.clone();
    let mut app = application(temp_dir.path(), units);

    let result = app.start(&FakeHost { events: events.clone(), fail: false }).await;
    match result {
        Err(Error::ModuleSystem(ModuleSystemError::PreInitFailed { identifier, .. })) => {
            assert_eq!(identifier, "alice/base")
        }
        other => panic!("expected PreInitFailed, got {:?}", other.map(|_| ())),
    }
    assert!(position(&events, "host").is_none());
    assert!(!app.is_started());
}

#[tokio::test]
async fn test_host_failure_is_reported() {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let units = FakeUnits::new();
    let events = units.events.clone();
    let mut app = application(temp_dir.path(), units);

    let result = app.start(&FakeHost { events, fail: true }).await;
    assert!(matches!(result, Err(Error::Host { ref message }) if message == "host refused to start"));
}

#[tokio::test]
async fn test_prepare_reports_broken_entries() {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    write_module(temp_dir.path(), &meta("alice/theme", &["alice/base"]));
    // alice/ghost has a vault entry but no descriptor on disk
    write_vault(temp_dir.path(), &[("alice/ghost", true), ("alice/theme", true)]);

    let mut app = application(temp_dir.path(), FakeUnits::new());
    let (vault, resolution) = app.prepare().await.expect("prepare should succeed");

    assert_eq!(vault.loaded, vec!["alice/theme"]);
    assert_eq!(vault.failed.len(), 1);
    assert_eq!(vault.failed[0].0, "alice/ghost");
    assert!(matches!(vault.failed[0].1, ModuleSystemError::MetadataFetch { .. }));
    assert_eq!(
        resolution.missing,
        vec![("alice/theme".to_string(), "alice/base".to_string())]
    );

    let theme = app.loader().registry().get("alice/theme").expect("theme is registered");
    assert_eq!(
        theme.disabled_reason(),
        Some(DisableReason::MissingDependency("alice/base".to_string()))
    );

    // A second prepare does not construct anything twice
    let (vault, _) = app.prepare().await.expect("prepare should be idempotent");
    assert_eq!(vault.loaded, vec!["alice/theme"]);
}

#[tokio::test]
async fn test_config_file_sets_host_version() {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    fs::write(
        temp_dir.path().join("bespoke.json"),
        r#"{ "host_version": "1.2.0", "vault_file": "state/vault.json" }"#,
    )
    .expect("Failed to write config");

    let mut modern = meta("alice/modern", &[]);
    modern.host_versions = Some(">=2.0.0".to_string());
    write_module(temp_dir.path(), &modern);
    write_module(temp_dir.path(), &meta("alice/plain", &[]));

    fs::create_dir_all(temp_dir.path().join("state")).expect("Failed to create state dir");
    write_vault(temp_dir.path(), &[("alice/modern", true), ("alice/plain", true)]);
    fs::rename(temp_dir.path().join("vault.json"), temp_dir.path().join("state/vault.json"))
        .expect("Failed to move vault");

    let units = FakeUnits::new();
    let events = units.events.clone();
    let mut app = Application::from_root(
        temp_dir.path().to_path_buf(),
        Some(Path::new("bespoke.json")),
        Arc::new(units),
        Arc::new(NoopNotifier),
    )
    .expect("Application::from_root failed");

    assert_eq!(app.config().vault_file, "state/vault.json");
    assert_eq!(app.loader().host_version().map(|v| v.to_string()), Some("1.2.0".to_string()));

    let report = app.start(&FakeHost { events: events.clone(), fail: false }).await.expect("start should succeed");
    assert_eq!(report.pre_init, vec!["alice/plain", ANCHOR]);
    assert!(position(&events, "code:alice/modern").is_none());

    let modern = app.loader().registry().get("alice/modern").expect("modern is registered");
    assert_eq!(
        modern.disabled_reason(),
        Some(DisableReason::IncompatibleHost(">=2.0.0".to_string()))
    );
}

#[test]
fn test_invalid_host_version_in_config() {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    fs::write(temp_dir.path().join("bespoke.json"), r#"{ "host_version": "one" }"#).expect("Failed to write config");

    let result = Application::from_root(
        temp_dir.path().to_path_buf(),
        Some(Path::new("bespoke.json")),
        Arc::new(FakeUnits::new()),
        Arc::new(NoopNotifier),
    );
    assert!(matches!(result, Err(Error::Version(_))));
}

#[tokio::test]
async fn test_prepare_after_start_keeps_registry_and_priorities() {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    write_module(temp_dir.path(), &meta("alice/base", &[]));
    write_module(temp_dir.path(), &meta("alice/theme", &["alice/base"]));
    write_vault(temp_dir.path(), &[("alice/base", true), ("alice/theme", true)]);

    let units = FakeUnits::new();
    let events = units.events.clone();
    let mut app = application(temp_dir.path(), units);
    app.start(&FakeHost { events, fail: false }).await.expect("start should succeed");

    let base = app.loader().registry().get("alice/base").expect("base is registered");
    assert_eq!(base.priority(), 2);

    let (vault, resolution) = app.prepare().await.expect("prepare should succeed after start");
    assert_eq!(vault.loaded, vec!["alice/base", "alice/theme"]);
    assert!(vault.failed.is_empty());
    assert!(resolution.is_clean());
    assert_eq!(base.priority(), 2);
    assert_eq!(app.loader().registry().len(), 3);
}
