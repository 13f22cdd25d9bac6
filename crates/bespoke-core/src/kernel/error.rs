//! # Bespoke Core Kernel Errors
//!
//! Defines the top-level [`Error`] type. Each subsystem has its own typed error
//! ([`ModuleSystemError`], [`StorageSystemError`], [`VersionError`]) which
//! converts into [`Error`] through `#[from]`.
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error as ThisError;

use crate::module_system::error::ModuleSystemError;
use crate::module_system::version::VersionError;
use crate::storage::error::StorageSystemError;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Specific, typed module system error
    #[error("Module system error: {0}")]
    ModuleSystem(#[from] ModuleSystemError),

    /// Specific, typed storage system error
    #[error("Storage system error: {0}")]
    StorageSystem(#[from] StorageSystemError),

    /// The configured host version could not be parsed
    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    /// The host failed its own initialization between the two startup passes
    #[error("Host initialization failed: {message}")]
    Host { message: String },

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl Error {
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        Error::StorageSystem(StorageSystemError::io(source, operation, path))
    }
}
