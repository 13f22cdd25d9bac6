use std::sync::Arc;

use async_trait::async_trait;
use bespoke_core::module_system::record::{DisableReason, InjectionRegistrar, ModuleRecord, ReleaseCode, ReleaseStyle};
use bespoke_core::module_system::{CodeUnit, MixinUnit, ModuleHandle, UnitError, UnitLoader};
use bespoke_core::HostRuntime;

/// Unit loader for running the loader from the command line.
///
/// There is no host to execute module code in, so every unit resolves and
/// does nothing. What remains observable is the order the loader drives
/// modules in.
#[derive(Debug, Default)]
pub struct DryRunUnits;

struct DryRunUnit;

#[async_trait]
impl MixinUnit for DryRunUnit {
    async fn activate(&self, registrar: InjectionRegistrar) -> Result<(), UnitError> {
        log::debug!("[dry-run] pre-init {}", registrar.identifier());
        Ok(())
    }
}

#[async_trait]
impl CodeUnit for DryRunUnit {
    async fn activate(&self, module: ModuleHandle) -> Result<Option<ReleaseCode>, UnitError> {
        log::debug!("[dry-run] activate {}", module.identifier());
        Ok(None)
    }
}

#[async_trait]
impl UnitLoader for DryRunUnits {
    async fn load_mixin(&self, location: &str) -> Result<Arc<dyn MixinUnit>, UnitError> {
        log::trace!("[dry-run] load mixin {}", location);
        Ok(Arc::new(DryRunUnit))
    }

    async fn load_code(&self, location: &str) -> Result<Arc<dyn CodeUnit>, UnitError> {
        log::trace!("[dry-run] load code {}", location);
        Ok(Arc::new(DryRunUnit))
    }

    fn inject_style(&self, style_id: &str, location: &str) -> Result<ReleaseStyle, UnitError> {
        log::trace!("[dry-run] inject {} from {}", style_id, location);
        Ok(Box::new(|| {}))
    }
}

/// Host stand-in; initialization always succeeds immediately.
#[derive(Debug)]
pub struct CliHost;

#[async_trait]
impl HostRuntime for CliHost {
    async fn initialize(&self) -> Result<(), UnitError> {
        println!("Host initialized");
        Ok(())
    }
}

/// `enabled`, `disabled`, or `disabled (<reason>)` when the loader demoted it
pub fn status(record: &ModuleRecord) -> String {
    if record.is_enabled() {
        return "enabled".to_string();
    }
    match record.disabled_reason() {
        Some(DisableReason::User) | None => "disabled".to_string(),
        Some(reason) => format!("disabled ({})", reason),
    }
}
