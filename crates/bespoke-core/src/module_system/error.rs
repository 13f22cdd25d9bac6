//! # Bespoke Module System Errors
//!
//! Defines error types specific to the Bespoke Module System.
//!
//! This module includes [`ModuleSystemError`], the primary enum encompassing the
//! errors that can occur while fetching metadata, registering modules, resolving
//! dependencies, and driving modules through their lifecycle phases. Errors raised
//! by host-supplied units travel as [`UnitError`] and are wrapped in a variant that
//! names the module and the phase it failed in.
use std::time::Duration;

use crate::module_system::dependency::DependencyError;

/// Error produced by host-supplied units (loaders, transformers, entry points).
pub type UnitError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum ModuleSystemError {
    #[error("A module with the same identifier \"{identifier}\" is already registered")]
    DuplicateIdentifier { identifier: String },

    #[error("Invalid module metadata at '{location}': {message}")]
    InvalidMetadata { location: String, message: String },

    #[error("Failed to fetch module metadata from '{location}': {source}")]
    MetadataFetch {
        location: String,
        #[source]
        source: Box<ModuleSystemErrorSource>,
    },

    #[error("Dependency resolution failed: {0}")]
    DependencyCycle(#[from] DependencyError),

    #[error("Pre-init of module '{identifier}' failed: {source}")]
    PreInitFailed {
        identifier: String,
        #[source]
        source: UnitError,
    },

    #[error("Style activation of module '{identifier}' failed: {source}")]
    StyleActivationFailed {
        identifier: String,
        #[source]
        source: UnitError,
    },

    #[error("Code activation of module '{identifier}' failed: {source}")]
    CodeActivationFailed {
        identifier: String,
        #[source]
        source: UnitError,
    },

    #[error("Pending injection of module '{identifier}' failed: {message}")]
    InjectionFailed { identifier: String, message: String },

    #[error("Transform of '{location}' failed: {source}")]
    TransformFailed {
        location: String,
        #[source]
        source: UnitError,
    },

    #[error("Module '{identifier}' is not registered")]
    NotRegistered { identifier: String },

    #[error("The anchor module cannot be disabled or disposed")]
    AnchorImmutable,

    #[error("Module '{identifier}' timed out after {timeout:?} during {phase}")]
    PhaseTimeout {
        identifier: String,
        phase: &'static str,
        timeout: Duration,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ModuleSystemErrorSource {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Other: {0}")]
    Other(String),
}

impl ModuleSystemError {
    /// Identifier of the module the error is attributed to, if any.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            ModuleSystemError::DuplicateIdentifier { identifier }
            | ModuleSystemError::PreInitFailed { identifier, .. }
            | ModuleSystemError::StyleActivationFailed { identifier, .. }
            | ModuleSystemError::CodeActivationFailed { identifier, .. }
            | ModuleSystemError::InjectionFailed { identifier, .. }
            | ModuleSystemError::NotRegistered { identifier }
            | ModuleSystemError::PhaseTimeout { identifier, .. } => Some(identifier),
            _ => None,
        }
    }
}
