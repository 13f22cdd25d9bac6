use std::fmt::Debug;
use std::path::Path;

use crate::kernel::error::Result;

/// Trait for storage providers that can read and write data
pub trait StorageProvider: Send + Sync + Debug {
    /// Get the name of this provider
    fn name(&self) -> &str;

    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if a path is a file
    fn is_file(&self, path: &Path) -> bool;

    /// Check if a path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Create a directory and all its parent directories
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read a file to a string
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Write a string to a file, replacing it atomically
    fn write_string(&self, path: &Path, contents: &str) -> Result<()>;

    /// Remove a file
    fn remove_file(&self, path: &Path) -> Result<()>;
}
