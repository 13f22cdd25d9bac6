use std::sync::Arc;

use arc_swap::ArcSwap;
use indexmap::IndexMap;

use crate::module_system::error::ModuleSystemError;
use crate::module_system::record::ModuleRecord;

/// Immutable view of the registry at one point in time.
#[derive(Clone, Default)]
pub struct RegistrySnapshot {
    modules: IndexMap<String, Arc<ModuleRecord>>,
}

impl RegistrySnapshot {
    pub fn get(&self, identifier: &str) -> Option<&Arc<ModuleRecord>> {
        self.modules.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.modules.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Records in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ModuleRecord>> {
        self.modules.values()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Records by descending priority.
    ///
    /// The sort is stable: equal priorities keep insertion order, except the
    /// anchor which sorts after every other record of the same priority.
    pub fn ordered(&self) -> Vec<Arc<ModuleRecord>> {
        let mut records: Vec<Arc<ModuleRecord>> = self.modules.values().cloned().collect();
        records.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.is_anchor().cmp(&b.is_anchor()))
        });
        records
    }
}

/// Owned handle to the set of registered modules.
///
/// Reads go through [`ModuleRegistry::snapshot`] and never observe a partial
/// update. Mutations clone the current map, edit the clone and swap it in.
pub struct ModuleRegistry {
    snap: ArcSwap<RegistrySnapshot>,
    anchor: Arc<ModuleRecord>,
}

impl ModuleRegistry {
    /// Create a registry holding only the anchor record
    pub fn new() -> Self {
        let anchor = Arc::new(ModuleRecord::anchor());
        let mut modules = IndexMap::new();
        modules.insert(anchor.identifier().to_string(), anchor.clone());
        Self {
            snap: ArcSwap::from_pointee(RegistrySnapshot { modules }),
            anchor,
        }
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snap.load_full()
    }

    pub fn anchor(&self) -> &Arc<ModuleRecord> {
        &self.anchor
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<ModuleRecord>> {
        self.snap.load().get(identifier).cloned()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.snap.load().contains(identifier)
    }

    /// Number of records, anchor included
    pub fn len(&self) -> usize {
        self.snap.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snap.load().is_empty()
    }

    pub fn ordered(&self) -> Vec<Arc<ModuleRecord>> {
        self.snap.load().ordered()
    }

    /// Insert a record. Fails without touching the registry if the identifier
    /// is taken.
    pub fn register(&self, record: Arc<ModuleRecord>) -> Result<Arc<ModuleRecord>, ModuleSystemError> {
        let identifier = record.identifier().to_string();
        loop {
            let cur = self.snap.load_full();
            if cur.contains(&identifier) {
                return Err(ModuleSystemError::DuplicateIdentifier { identifier });
            }

            let mut next = (*cur).clone();
            next.modules.insert(identifier.clone(), record.clone());

            let prev = self.snap.compare_and_swap(&cur, Arc::new(next));
            if Arc::ptr_eq(&prev, &cur) {
                log::debug!("Registered module {}", identifier);
                return Ok(record);
            }
        }
    }

    /// Whether `record` is the instance currently registered under its
    /// identifier.
    pub fn is_current(&self, record: &Arc<ModuleRecord>) -> bool {
        self.snap
            .load()
            .get(record.identifier())
            .is_some_and(|current| Arc::ptr_eq(current, record))
    }

    /// Remove `record`. Only the same instance is removed; a newer record
    /// registered under the same identifier is left alone. The anchor cannot
    /// be removed.
    pub fn unregister(&self, record: &Arc<ModuleRecord>) -> Result<(), ModuleSystemError> {
        if record.is_anchor() {
            return Err(ModuleSystemError::AnchorImmutable);
        }
        let identifier = record.identifier();
        loop {
            let cur = self.snap.load_full();
            if !cur.get(identifier).is_some_and(|current| Arc::ptr_eq(current, record)) {
                return Err(ModuleSystemError::NotRegistered {
                    identifier: identifier.to_string(),
                });
            }

            let mut next = (*cur).clone();
            next.modules.shift_remove(identifier);

            let prev = self.snap.compare_and_swap(&cur, Arc::new(next));
            if Arc::ptr_eq(&prev, &cur) {
                log::debug!("Unregistered module {}", identifier);
                return Ok(());
            }
        }
    }
}
