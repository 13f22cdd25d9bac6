//! # Bespoke Core Module System
//!
//! Everything between "a list of installed modules" and "every enabled module
//! is running":
//!
//! - **[`metadata`]**: module descriptors ([`ModuleMetadata`]) and the
//!   `author/name` identifier.
//! - **[`record`]**: [`ModuleRecord`], a descriptor plus its runtime state
//!   (enabled flag, priority, pending injections, release callbacks).
//! - **[`registry`]**: the [`ModuleRegistry`] handle, read through immutable
//!   snapshots and mutated copy-on-write.
//! - **[`dependency`]**: the priority resolver, which orders modules so that
//!   dependencies load before their dependents and detects cycles.
//! - **[`loader`]**: traits for the host-supplied collaborators (descriptor
//!   fetch, code transform, dynamic unit loading).
//! - **[`lifecycle`]**: the [`ModuleLoader`] orchestrator running the pre-init
//!   and post-init passes and per-module enable/disable/dispose.
//! - **[`notifier`]**: the fire-and-forget [`RemoteNotifier`] side channel.
//! - **[`version`]**: host version ranges.
//! - **[`error`]**: [`ModuleSystemError`].
pub mod dependency;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod metadata;
pub mod notifier;
pub mod record;
pub mod registry;
pub mod version;

pub use dependency::{DependencyError, ResolutionReport};
pub use error::{ModuleSystemError, UnitError};
pub use lifecycle::{ModuleHandle, ModuleLoader, ModuleLoaderBuilder, PostInitReport, VaultLoadReport};
pub use loader::{CodeUnit, DescriptorFetcher, FsDescriptorFetcher, IdentityTransformer, MixinUnit, Transformer, UnitLoader};
pub use metadata::{MetadataBuilder, ModuleEntries, ModuleMetadata};
pub use notifier::{ChannelNotifier, NoopNotifier, ProtocolNotifier, RemoteAction, RemoteNotifier};
pub use record::{DisableReason, InjectionRegistrar, ModuleRecord, ModuleState, ReleaseCode, ReleaseStyle};
pub use registry::{ModuleRegistry, RegistrySnapshot};
pub use version::VersionRange;

#[cfg(test)]
pub(crate) mod tests;
