//! # Bespoke Core Kernel
//!
//! The `kernel` module ties the subsystems together.
//!
//! - **Application Bootstrapping**: [`Application`](bootstrap::Application)
//!   loads the vault, resolves priorities and runs the startup passes around
//!   the host's own initialization ([`HostRuntime`](bootstrap::HostRuntime)).
//! - **Core Constants**: default file names and protocol endpoints, in the
//!   `constants` submodule.
//! - **Error Handling**: the top-level [`Error`](error::Error) and `Result`
//!   alias every subsystem error converts into.
pub mod bootstrap;
pub mod constants;
pub mod error;

pub use bootstrap::{Application, HostRuntime, StartupReport};
pub use error::{Error, Result};

#[cfg(test)]
mod tests;
