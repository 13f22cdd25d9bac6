//! # Bespoke Core Storage
//!
//! Persistence for the loader: a [`StorageProvider`] abstraction with a local
//! filesystem implementation, the [`Vault`] of installed modules, and the
//! [`LoaderConfig`].
pub mod config;
pub mod error;
pub mod local;
pub mod provider;
pub mod vault;

pub use config::{ConfigFormat, LoaderConfig};
pub use error::StorageSystemError;
pub use local::LocalStorageProvider;
pub use provider::StorageProvider;
pub use vault::{Vault, VaultEntry};
