pub mod kernel;
pub mod module_system;
pub mod storage;

// Re-export the types the binary and hosts reach for first
pub use kernel::Application;
pub use kernel::HostRuntime;
pub use kernel::error::Error as KernelError;
pub use module_system::{ModuleLoader, ModuleMetadata, ModuleSystemError, RemoteAction, RemoteNotifier, UnitLoader};
pub use storage::{LoaderConfig, StorageProvider, Vault, VaultEntry};
