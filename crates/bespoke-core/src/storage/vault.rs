//! # Bespoke Vault
//!
//! The vault is the persisted list of installed modules, keyed by identifier:
//!
//! ```json
//! { "modules": { "author/name": { "enabled": true, "metadata": "/modules/author/name/metadata.json" } } }
//! ```
//!
//! The loader reads it once at startup. Maintenance (add, remove, toggle) goes
//! through the external system of record, which is what the CLI implements.
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::kernel::error::Result;
use crate::storage::error::StorageSystemError;
use crate::storage::provider::StorageProvider;

/// One installed module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultEntry {
    pub enabled: bool,
    /// Location of the local descriptor
    pub metadata: String,
    /// Location of the upstream descriptor, if the module came from one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_metadata: Option<String>,
}

impl VaultEntry {
    pub fn new(metadata: impl Into<String>, enabled: bool) -> Self {
        Self {
            enabled,
            metadata: metadata.into(),
            remote_metadata: None,
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote_metadata = Some(remote.into());
        self
    }
}

/// Persisted module manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    #[serde(default)]
    modules: BTreeMap<String, VaultEntry>,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| {
            StorageSystemError::DeserializationError {
                format: "JSON".to_string(),
                source: Box::new(e),
            }
            .into()
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            StorageSystemError::SerializationError {
                format: "JSON".to_string(),
                source: Box::new(e),
            }
            .into()
        })
    }

    /// Read the vault at `path`. A missing file is an empty vault.
    pub fn load(provider: &dyn StorageProvider, path: &Path) -> Result<Self> {
        if !provider.is_file(path) {
            log::debug!("No vault at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let data = provider.read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn save(&self, provider: &dyn StorageProvider, path: &Path) -> Result<()> {
        provider.write_string(path, &self.to_json()?)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.modules.contains_key(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<&VaultEntry> {
        self.modules.get(identifier)
    }

    /// Entries in identifier order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VaultEntry)> {
        self.modules.iter().map(|(id, entry)| (id.as_str(), entry))
    }

    pub fn add(&mut self, identifier: &str, entry: VaultEntry) -> Result<()> {
        if self.modules.contains_key(identifier) {
            return Err(StorageSystemError::VaultEntryExists(identifier.to_string()).into());
        }
        self.modules.insert(identifier.to_string(), entry);
        Ok(())
    }

    pub fn remove(&mut self, identifier: &str) -> Result<VaultEntry> {
        self.modules
            .remove(identifier)
            .ok_or_else(|| StorageSystemError::VaultEntryMissing(identifier.to_string()).into())
    }

    /// Toggle an entry, returning the previous value
    pub fn set_enabled(&mut self, identifier: &str, enabled: bool) -> Result<bool> {
        let entry = self
            .modules
            .get_mut(identifier)
            .ok_or_else(|| StorageSystemError::VaultEntryMissing(identifier.to_string()))?;
        Ok(std::mem::replace(&mut entry.enabled, enabled))
    }
}
