//! # Bespoke Module Loading Collaborators
//!
//! The loader never fetches, transforms or evaluates module content itself.
//! The host supplies these capabilities through the traits in this module:
//!
//! - [`DescriptorFetcher`] turns a metadata location into [`ModuleMetadata`].
//! - [`Transformer`] turns a source location into a loadable location. It is
//!   consulted before every dynamic load.
//! - [`UnitLoader`] loads pre-init (mixin) and code units, and injects styles.
//!
//! [`FsDescriptorFetcher`] and [`IdentityTransformer`] cover the local case.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::module_system::error::{ModuleSystemError, ModuleSystemErrorSource, UnitError};
use crate::module_system::lifecycle::ModuleHandle;
use crate::module_system::metadata::ModuleMetadata;
use crate::module_system::record::{InjectionRegistrar, ReleaseCode, ReleaseStyle};

/// Fetches module descriptors
#[async_trait]
pub trait DescriptorFetcher: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<ModuleMetadata, ModuleSystemError>;
}

/// Turns a source location into something the [`UnitLoader`] can load
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(&self, location: &str) -> Result<String, UnitError>;
}

/// A loaded pre-init unit
#[async_trait]
pub trait MixinUnit: Send + Sync {
    /// Run the unit. Background work goes through `registrar`.
    async fn activate(&self, registrar: InjectionRegistrar) -> Result<(), UnitError>;
}

/// A loaded main code unit
#[async_trait]
pub trait CodeUnit: Send + Sync {
    /// Invoke the unit's default entry. Units without one return `Ok(None)`.
    async fn activate(&self, module: ModuleHandle) -> Result<Option<ReleaseCode>, UnitError>;
}

/// Dynamic loading capability supplied by the host
#[async_trait]
pub trait UnitLoader: Send + Sync {
    async fn load_mixin(&self, location: &str) -> Result<Arc<dyn MixinUnit>, UnitError>;

    async fn load_code(&self, location: &str) -> Result<Arc<dyn CodeUnit>, UnitError>;

    /// Inject the style at `location`, tagged with `style_id`. The returned
    /// callback removes it again.
    fn inject_style(&self, style_id: &str, location: &str) -> Result<ReleaseStyle, UnitError>;
}

/// Reads descriptors from a directory on disk.
///
/// Locations are taken relative to `root`, a leading `/` included, so
/// `/modules/a/b/metadata.json` reads `<root>/modules/a/b/metadata.json`.
#[derive(Debug, Clone)]
pub struct FsDescriptorFetcher {
    root: PathBuf,
}

impl FsDescriptorFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path on disk a location maps to
    pub fn path_for(&self, location: &str) -> PathBuf {
        self.root.join(location.trim_start_matches('/'))
    }
}

#[async_trait]
impl DescriptorFetcher for FsDescriptorFetcher {
    async fn fetch(&self, location: &str) -> Result<ModuleMetadata, ModuleSystemError> {
        if location.contains("://") {
            return Err(ModuleSystemError::MetadataFetch {
                location: location.to_string(),
                source: Box::new(ModuleSystemErrorSource::Other(
                    "only local locations can be read from disk".to_string(),
                )),
            });
        }

        let path = self.path_for(location);
        let data = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ModuleSystemError::MetadataFetch {
                location: location.to_string(),
                source: Box::new(ModuleSystemErrorSource::Io(e)),
            })?;
        ModuleMetadata::from_json(location, &data)
    }
}

/// Transformer that leaves locations untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransformer;

#[async_trait]
impl Transformer for IdentityTransformer {
    async fn transform(&self, location: &str) -> Result<String, UnitError> {
        Ok(location.to_string())
    }
}
