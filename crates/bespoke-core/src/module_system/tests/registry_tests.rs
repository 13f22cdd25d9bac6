use std::sync::Arc;
use std::thread;

use crate::module_system::error::ModuleSystemError;
use crate::module_system::record::{ModuleRecord, ModuleState};
use crate::module_system::registry::ModuleRegistry;

use super::support::{location, meta};

fn record(identifier: &str) -> Arc<ModuleRecord> {
    Arc::new(ModuleRecord::new(meta(identifier, &[]), location(identifier), None, true))
}

#[test]
fn test_new_registry_holds_only_anchor() {
    let registry = ModuleRegistry::new();
    assert_eq!(registry.len(), 1);

    let anchor = registry.anchor();
    assert!(anchor.is_anchor());
    assert!(anchor.is_enabled());
    assert_eq!(anchor.identifier(), "internal/internal");
    assert!(registry.contains("internal/internal"));
    assert_eq!(anchor.state(), ModuleState::Unloaded);
}

#[test]
fn test_register_and_lookup() {
    let registry = ModuleRegistry::new();
    let a = registry.register(record("alice/a")).expect("register should succeed");

    assert!(Arc::ptr_eq(&a, &registry.get("alice/a").expect("module should be present")));
    assert_eq!(registry.len(), 2);
    assert_eq!(a.style_id(), "alice/a-styles");
    assert_eq!(a.priority(), 0);
}

#[test]
fn test_duplicate_identifier_leaves_registry_unchanged() {
    let registry = ModuleRegistry::new();
    let first = registry.register(record("alice/a")).expect("register should succeed");
    let before = registry.snapshot();

    let result = registry.register(record("alice/a"));
    match result {
        Err(ModuleSystemError::DuplicateIdentifier { identifier }) => assert_eq!(identifier, "alice/a"),
        other => panic!("expected DuplicateIdentifier, got {:?}", other.map(|r| r.identifier().to_string())),
    }

    let after = registry.snapshot();
    assert!(Arc::ptr_eq(&before, &after), "failed insert must not install a new snapshot");
    assert!(Arc::ptr_eq(&first, after.get("alice/a").expect("original record kept")));
}

#[test]
fn test_duplicate_error_message() {
    let registry = ModuleRegistry::new();
    registry.register(record("alice/a")).expect("register should succeed");
    let err = registry.register(record("alice/a")).expect_err("duplicate must fail");
    assert_eq!(
        err.to_string(),
        "A module with the same identifier \"alice/a\" is already registered"
    );
}

#[test]
fn test_snapshots_are_isolated_from_later_mutation() {
    let registry = ModuleRegistry::new();
    let a = registry.register(record("alice/a")).expect("register should succeed");
    let old = registry.snapshot();

    registry.register(record("bob/b")).expect("register should succeed");
    registry.unregister(&a).expect("unregister should succeed");

    assert!(old.contains("alice/a"));
    assert!(!old.contains("bob/b"));
    assert_eq!(old.len(), 2);

    let new = registry.snapshot();
    assert!(!new.contains("alice/a"));
    assert!(new.contains("bob/b"));
}

#[test]
fn test_unregister() {
    let registry = ModuleRegistry::new();
    let a = registry.register(record("alice/a")).expect("register should succeed");
    assert!(registry.is_current(&a));

    registry.unregister(&a).expect("unregister should succeed");
    assert!(registry.get("alice/a").is_none());
    assert!(!registry.is_current(&a));

    assert!(matches!(
        registry.unregister(&a),
        Err(ModuleSystemError::NotRegistered { .. })
    ));
    assert!(matches!(
        registry.unregister(registry.anchor()),
        Err(ModuleSystemError::AnchorImmutable)
    ));
    assert!(registry.contains("internal/internal"));
}

#[test]
fn test_unregister_leaves_newer_record_with_same_identifier() {
    let registry = ModuleRegistry::new();
    let old = registry.register(record("alice/a")).expect("register should succeed");
    registry.unregister(&old).expect("unregister should succeed");
    let new = registry.register(record("alice/a")).expect("re-register should succeed");

    assert!(matches!(
        registry.unregister(&old),
        Err(ModuleSystemError::NotRegistered { ref identifier }) if identifier == "alice/a"
    ));
    assert!(Arc::ptr_eq(&new, &registry.get("alice/a").expect("new record kept")));
}

#[test]
fn test_ordered_by_descending_priority_with_stable_ties() {
    let registry = ModuleRegistry::new();
    let a = registry.register(record("alice/a")).expect("register should succeed");
    let b = registry.register(record("bob/b")).expect("register should succeed");
    let c = registry.register(record("carol/c")).expect("register should succeed");

    // a: 1, b: 3, c: 1, anchor: 1
    a.bump_priority();
    for _ in 0..3 {
        b.bump_priority();
    }
    c.bump_priority();
    registry.anchor().bump_priority();

    let order: Vec<String> = registry
        .ordered()
        .iter()
        .map(|r| r.identifier().to_string())
        .collect();
    assert_eq!(order, vec!["bob/b", "alice/a", "carol/c", "internal/internal"]);
}

#[test]
fn test_concurrent_registration() {
    let registry = Arc::new(ModuleRegistry::new());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let registry = registry.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let id = format!("author{}/module{}", t, i);
                    registry.register(record(&id)).expect("distinct identifiers must register");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread panicked");
    }

    assert_eq!(registry.len(), 8 * 25 + 1);
}
