//! # Bespoke Module Lifecycle
//!
//! [`ModuleLoader`] drives registered modules through their phases:
//!
//! 1. **Pre-init**: every enabled module's mixin unit, strictly in priority
//!    order. The first failure aborts the pass.
//! 2. The host finishes its own initialization (see `kernel::bootstrap`).
//! 3. **Post-init**: every enabled module's style, then every enabled
//!    module's code, in the same order. Failures are reported per module and
//!    never stop the others.
//!
//! After startup [`ModuleLoader::enable`], [`ModuleLoader::disable`] and
//! [`ModuleLoader::dispose`] run the corresponding phases for one module.
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use semver::Version;

use crate::module_system::dependency::{self, ResolutionReport};
use crate::module_system::error::ModuleSystemError;
use crate::module_system::loader::{DescriptorFetcher, FsDescriptorFetcher, IdentityTransformer, Transformer, UnitLoader};
use crate::module_system::metadata::ModuleMetadata;
use crate::module_system::notifier::{NoopNotifier, RemoteAction, RemoteNotifier};
use crate::module_system::record::{DisableReason, InjectionRegistrar, ModuleRecord, ModuleState};
use crate::module_system::registry::ModuleRegistry;
use crate::module_system::version::{VersionError, parse_host_version};
use crate::storage::config::LoaderConfig;
use crate::storage::vault::Vault;

const PHASE_PRE_INIT: &str = "pre-init";
const PHASE_STYLE: &str = "style";
const PHASE_CODE: &str = "code";

/// Outcome of [`ModuleLoader::load_vault`]
#[derive(Debug, Default)]
pub struct VaultLoadReport {
    /// Identifiers of the records constructed, in vault order
    pub loaded: Vec<String>,
    /// Vault entries that could not be fetched or constructed
    pub failed: Vec<(String, ModuleSystemError)>,
}

/// Outcome of [`ModuleLoader::run_post_init`]
#[derive(Debug, Default)]
pub struct PostInitReport {
    /// Modules whose style phase completed
    pub styled: Vec<String>,
    /// Modules whose code phase completed
    pub activated: Vec<String>,
    /// Isolated style and code failures
    pub failures: Vec<ModuleSystemError>,
}

struct Inner {
    registry: ModuleRegistry,
    fetcher: Arc<dyn DescriptorFetcher>,
    transformer: Arc<dyn Transformer>,
    units: Arc<dyn UnitLoader>,
    notifier: Arc<dyn RemoteNotifier>,
    host_version: Option<Version>,
    phase_timeout: Option<Duration>,
}

/// Builder for [`ModuleLoader`]
pub struct ModuleLoaderBuilder {
    fetcher: Arc<dyn DescriptorFetcher>,
    transformer: Arc<dyn Transformer>,
    units: Arc<dyn UnitLoader>,
    notifier: Arc<dyn RemoteNotifier>,
    host_version: Option<Version>,
    phase_timeout: Option<Duration>,
}

impl ModuleLoaderBuilder {
    pub fn new(units: Arc<dyn UnitLoader>) -> Self {
        Self {
            fetcher: Arc::new(FsDescriptorFetcher::new(".")),
            transformer: Arc::new(IdentityTransformer),
            units,
            notifier: Arc::new(NoopNotifier),
            host_version: None,
            phase_timeout: None,
        }
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn DescriptorFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn RemoteNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Enable host compatibility checks against `version`
    pub fn host_version(mut self, version: Version) -> Self {
        self.host_version = Some(version);
        self
    }

    /// Bound every transform/load/activate step
    pub fn phase_timeout(mut self, timeout: Duration) -> Self {
        self.phase_timeout = Some(timeout);
        self
    }

    /// Take the host version and timeout from a loaded config
    pub fn config(mut self, config: &LoaderConfig) -> Result<Self, VersionError> {
        if let Some(version) = config.host_version.as_deref() {
            self.host_version = Some(parse_host_version(version)?);
        }
        if let Some(ms) = config.phase_timeout_ms {
            self.phase_timeout = Some(Duration::from_millis(ms));
        }
        Ok(self)
    }

    pub fn build(self) -> ModuleLoader {
        ModuleLoader {
            inner: Arc::new(Inner {
                registry: ModuleRegistry::new(),
                fetcher: self.fetcher,
                transformer: self.transformer,
                units: self.units,
                notifier: self.notifier,
                host_version: self.host_version,
                phase_timeout: self.phase_timeout,
            }),
        }
    }
}

/// Orchestrates module construction, priority resolution and lifecycle phases.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct ModuleLoader {
    inner: Arc<Inner>,
}

impl ModuleLoader {
    pub fn builder(units: Arc<dyn UnitLoader>) -> ModuleLoaderBuilder {
        ModuleLoaderBuilder::new(units)
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.inner.registry
    }

    pub fn host_version(&self) -> Option<&Version> {
        self.inner.host_version.as_ref()
    }

    /// Register capability of the anchor, for injections no module owns
    pub fn anchor_registrar(&self) -> InjectionRegistrar {
        self.inner.registry.anchor().registrar()
    }

    /// Handle to a registered module
    pub fn handle(&self, identifier: &str) -> Option<ModuleHandle> {
        self.inner
            .registry
            .get(identifier)
            .map(|record| ModuleHandle::new(record, Arc::downgrade(&self.inner)))
    }

    fn require(&self, identifier: &str) -> Result<Arc<ModuleRecord>, ModuleSystemError> {
        self.inner
            .registry
            .get(identifier)
            .ok_or_else(|| ModuleSystemError::NotRegistered {
                identifier: identifier.to_string(),
            })
    }

    fn notify(&self, action: RemoteAction) {
        self.inner.notifier.notify(action);
    }

    /// Build a record and insert it into the registry.
    ///
    /// A record whose declared host range excludes the configured host version
    /// is inserted disabled.
    pub fn construct(
        &self,
        metadata: ModuleMetadata,
        metadata_location: &str,
        remote_metadata_location: Option<String>,
        enabled: bool,
    ) -> Result<Arc<ModuleRecord>, ModuleSystemError> {
        let record = ModuleRecord::new(metadata, metadata_location, remote_metadata_location, enabled);

        if let Some(host) = &self.inner.host_version {
            match record.metadata().host_range() {
                Some(Ok(range)) if !range.includes(host) => {
                    log::info!(
                        "Disabling {}: host version {} is outside {}",
                        record.identifier(),
                        host,
                        range
                    );
                    record.demote(DisableReason::IncompatibleHost(range.to_string()));
                }
                Some(Err(e)) => {
                    log::warn!("{}: {}, assuming compatible", record.identifier(), e);
                }
                _ => {}
            }
        }

        self.inner.registry.register(Arc::new(record))
    }

    /// Fetch and construct every vault entry.
    ///
    /// Descriptors are fetched concurrently; records are constructed in vault
    /// order. Failures are reported per entry.
    pub async fn load_vault(&self, vault: &Vault) -> VaultLoadReport {
        let started = Instant::now();
        let fetcher = &self.inner.fetcher;
        let fetches = vault.iter().map(|(identifier, entry)| async move {
            let fetched = fetcher.fetch(&entry.metadata).await;
            (identifier, entry, fetched)
        });
        let fetched = futures::future::join_all(fetches).await;

        let mut report = VaultLoadReport::default();
        for (identifier, entry, result) in fetched {
            let constructed = result.and_then(|metadata| {
                self.construct(metadata, &entry.metadata, entry.remote_metadata.clone(), entry.enabled)
            });
            match constructed {
                Ok(record) => {
                    if record.identifier() != identifier {
                        log::warn!(
                            "Vault entry {} describes module {}",
                            identifier,
                            record.identifier()
                        );
                    }
                    report.loaded.push(record.identifier().to_string());
                }
                Err(e) => {
                    log::error!("Failed to load module {}: {}", identifier, e);
                    report.failed.push((identifier.to_string(), e));
                }
            }
        }

        log::debug!(
            "Loaded {} modules from vault in {:?} ({} failed)",
            report.loaded.len(),
            started.elapsed(),
            report.failed.len()
        );
        report
    }

    /// Compute priorities for every registered module. Run once, after the
    /// startup records are constructed.
    pub fn resolve_priorities(&self) -> ResolutionReport {
        let snapshot = self.inner.registry.snapshot();
        dependency::resolve_priorities(&snapshot)
    }

    /// Fetch a descriptor and register it after startup.
    ///
    /// Only the new record's dependency paths are bumped. The module is not
    /// activated; call [`ModuleLoader::enable`] for that.
    pub async fn add(
        &self,
        metadata_location: &str,
        remote_metadata_location: Option<String>,
        enabled: bool,
        notify: bool,
    ) -> Result<Arc<ModuleRecord>, ModuleSystemError> {
        let metadata = self.inner.fetcher.fetch(metadata_location).await?;
        let record = self.construct(metadata, metadata_location, remote_metadata_location, enabled)?;

        let snapshot = self.inner.registry.snapshot();
        dependency::resolve_record(&snapshot, &record);

        log::info!("Added module {}", record.identifier());
        if notify {
            self.notify(RemoteAction::Add(metadata_location.to_string()));
        }
        Ok(record)
    }

    /// Run pre-init for every enabled module, by descending priority.
    ///
    /// Returns the identifiers that completed. The first failure aborts the
    /// pass and is returned.
    pub async fn run_pre_init(&self) -> Result<Vec<String>, ModuleSystemError> {
        let started = Instant::now();
        let mut completed = Vec::new();
        for record in self.inner.registry.ordered() {
            if !record.is_enabled() {
                continue;
            }
            if let Err(e) = self.pre_init(&record).await {
                log::error!("Pre-init aborted at {}: {}", record.identifier(), e);
                return Err(e);
            }
            completed.push(record.identifier().to_string());
        }
        log::debug!("Pre-init pass took {:?}", started.elapsed());
        Ok(completed)
    }

    /// Wait for the injections registered through the anchor. Returns the
    /// failure messages.
    pub async fn await_anchor_injections(&self) -> Vec<String> {
        let started = Instant::now();
        let failures = self.inner.registry.anchor().pending_injections().settle().await;
        for failure in &failures {
            log::warn!("Anchor injection failed: {}", failure);
        }
        log::debug!("Anchor injections settled in {:?}", started.elapsed());
        failures
    }

    /// Activate styles, then code, for every enabled module.
    pub async fn run_post_init(&self) -> PostInitReport {
        let started = Instant::now();
        let records = self.inner.registry.ordered();
        let mut report = PostInitReport::default();

        for record in &records {
            if !record.is_enabled() {
                continue;
            }
            match self.activate_style(record).await {
                Ok(()) => report.styled.push(record.identifier().to_string()),
                Err(e) => {
                    log::error!("{}", e);
                    report.failures.push(e);
                }
            }
        }

        for record in &records {
            if !record.is_enabled() {
                continue;
            }
            match self.activate_code(record).await {
                Ok(()) if record.is_enabled() => report.activated.push(record.identifier().to_string()),
                Ok(()) => {}
                Err(e) => {
                    log::error!("{}", e);
                    report.failures.push(e);
                }
            }
        }

        log::debug!("Post-init pass took {:?}", started.elapsed());
        report
    }

    /// Enable a module and run its phases. No-op if already enabled.
    ///
    /// A pre-init failure is returned and leaves the module flagged enabled.
    /// A style failure is logged and code activation still runs.
    pub async fn enable(&self, identifier: &str, notify: bool) -> Result<(), ModuleSystemError> {
        let record = self.require(identifier)?;
        self.enable_record(&record, notify).await
    }

    /// Disable a module and release what it activated. No-op if already
    /// disabled. Pre-init effects stay in place.
    pub async fn disable(&self, identifier: &str, notify: bool) -> Result<(), ModuleSystemError> {
        let record = self.require(identifier)?;
        self.disable_record(&record, notify).await
    }

    /// Disable a module without notification, then remove it from the registry.
    pub async fn dispose(&self, identifier: &str, notify: bool) -> Result<(), ModuleSystemError> {
        let record = self.require(identifier)?;
        self.dispose_record(&record, notify).await
    }

    async fn enable_record(&self, record: &Arc<ModuleRecord>, notify: bool) -> Result<(), ModuleSystemError> {
        if record.set_enabled(true) {
            return Ok(());
        }
        let identifier = record.identifier().to_string();
        log::info!("Enabling {}", identifier);
        if notify {
            self.notify(RemoteAction::Enable(identifier.clone()));
        }

        self.pre_init(record).await?;
        if !record.is_enabled() {
            return Ok(());
        }
        if let Err(e) = self.activate_style(record).await {
            log::error!("{}", e);
        }
        self.activate_code(record).await
    }

    async fn disable_record(&self, record: &Arc<ModuleRecord>, notify: bool) -> Result<(), ModuleSystemError> {
        if record.is_anchor() {
            return Err(ModuleSystemError::AnchorImmutable);
        }
        if !record.set_enabled(false) {
            return Ok(());
        }
        record.demote(DisableReason::User);
        let identifier = record.identifier().to_string();
        log::info!("Disabling {}", identifier);
        if notify {
            self.notify(RemoteAction::Disable(identifier.clone()));
        }

        record.release_style();
        if let Err(e) = record.release_code().await {
            log::error!("Releasing code of {} failed: {}", identifier, e);
        }
        record.rewind_state();
        Ok(())
    }

    async fn dispose_record(&self, record: &Arc<ModuleRecord>, notify: bool) -> Result<(), ModuleSystemError> {
        if record.is_anchor() {
            return Err(ModuleSystemError::AnchorImmutable);
        }
        if !self.inner.registry.is_current(record) {
            return Err(ModuleSystemError::NotRegistered {
                identifier: record.identifier().to_string(),
            });
        }
        self.disable_record(record, false).await?;
        self.inner.registry.unregister(record)?;
        log::info!("Disposed {}", record.identifier());
        if notify {
            self.notify(RemoteAction::Remove(record.identifier().to_string()));
        }
        Ok(())
    }

    async fn timed<T, F>(&self, identifier: &str, phase: &'static str, step: F) -> Result<T, ModuleSystemError>
    where
        F: Future<Output = Result<T, ModuleSystemError>>,
    {
        let started = Instant::now();
        let result = match self.inner.phase_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, step).await {
                Ok(result) => result,
                Err(_) => Err(ModuleSystemError::PhaseTimeout {
                    identifier: identifier.to_string(),
                    phase,
                    timeout,
                }),
            },
            None => step.await,
        };
        log::debug!("{}#{} took {:?}", identifier, phase, started.elapsed());
        result
    }

    async fn transform(&self, location: &str) -> Result<String, ModuleSystemError> {
        self.inner
            .transformer
            .transform(location)
            .await
            .map_err(|source| ModuleSystemError::TransformFailed {
                location: location.to_string(),
                source,
            })
    }

    async fn pre_init(&self, record: &Arc<ModuleRecord>) -> Result<(), ModuleSystemError> {
        if !record.is_enabled() {
            return Ok(());
        }
        if let Some(location) = record.mixin_location() {
            let identifier = record.identifier();
            // Injections of an earlier run belong to a module instance that
            // was disabled since.
            record.pending_injections().clear();
            self.timed(identifier, PHASE_PRE_INIT, async {
                let loadable = self.transform(&location).await?;
                let failed = |source| ModuleSystemError::PreInitFailed {
                    identifier: identifier.to_string(),
                    source,
                };
                let unit = self.inner.units.load_mixin(&loadable).await.map_err(failed)?;
                if !record.is_enabled() {
                    return Ok(());
                }
                unit.activate(record.registrar()).await.map_err(failed)
            })
            .await?;
            let pending = record.pending_injections().len();
            if pending > 0 {
                log::debug!("{} has {} pending injections", identifier, pending);
            }
        }
        if record.is_enabled() && record.state() < ModuleState::MixinLoaded {
            record.set_state(ModuleState::MixinLoaded);
        }
        Ok(())
    }

    async fn activate_style(&self, record: &Arc<ModuleRecord>) -> Result<(), ModuleSystemError> {
        if !record.is_enabled() {
            return Ok(());
        }
        record.release_style();
        if let Some(location) = record.style_location() {
            let identifier = record.identifier();
            let release = self
                .timed(identifier, PHASE_STYLE, async {
                    let loadable = self.transform(&location).await?;
                    if !record.is_enabled() {
                        return Ok(None);
                    }
                    self.inner
                        .units
                        .inject_style(&record.style_id(), &loadable)
                        .map(Some)
                        .map_err(|source| ModuleSystemError::StyleActivationFailed {
                            identifier: identifier.to_string(),
                            source,
                        })
                })
                .await?;
            match release {
                Some(release) if record.is_enabled() => record.install_release_style(release),
                Some(release) => {
                    log::debug!("{} was disabled during style activation", identifier);
                    release();
                    return Ok(());
                }
                None => return Ok(()),
            }
        }
        record.set_state(ModuleState::StyleLoaded);
        // A disable that ran between the check and the install found nothing to release
        if !record.is_enabled() {
            record.release_style();
            record.rewind_state();
        }
        Ok(())
    }

    async fn activate_code(&self, record: &Arc<ModuleRecord>) -> Result<(), ModuleSystemError> {
        if !record.is_enabled() {
            return Ok(());
        }
        let identifier = record.identifier();
        if let Err(e) = record.release_code().await {
            log::warn!("Releasing previous code of {} failed: {}", identifier, e);
        }

        if let Some(location) = record.code_location() {
            let failures = record.pending_injections().settle().await;
            if !record.is_enabled() {
                return Ok(());
            }
            if !failures.is_empty() {
                return Err(ModuleSystemError::InjectionFailed {
                    identifier: identifier.to_string(),
                    message: failures.join("; "),
                });
            }

            let handle = ModuleHandle::new(record.clone(), Arc::downgrade(&self.inner));
            let release = self
                .timed(identifier, PHASE_CODE, async {
                    let loadable = self.transform(&location).await?;
                    let failed = |source| ModuleSystemError::CodeActivationFailed {
                        identifier: identifier.to_string(),
                        source,
                    };
                    let unit = self.inner.units.load_code(&loadable).await.map_err(failed)?;
                    if !record.is_enabled() {
                        return Ok(None);
                    }
                    unit.activate(handle).await.map_err(failed)
                })
                .await?;
            if !record.is_enabled() {
                log::debug!("{} was disabled during code activation", identifier);
                if let Some(release) = release {
                    if let Err(e) = release().await {
                        log::error!("Releasing code of {} failed: {}", identifier, e);
                    }
                }
                return Ok(());
            }
            if let Some(release) = release {
                record.install_release_code(release);
            }
        }
        record.set_state(ModuleState::CodeLoaded);
        // A disable that ran between the check and the install found nothing to release
        if !record.is_enabled() {
            if let Err(e) = record.release_code().await {
                log::error!("Releasing code of {} failed: {}", identifier, e);
            }
            record.rewind_state();
        }
        Ok(())
    }
}

/// What a module's code unit gets to see of itself
#[derive(Clone)]
pub struct ModuleHandle {
    record: Arc<ModuleRecord>,
    loader: Weak<Inner>,
}

impl ModuleHandle {
    fn new(record: Arc<ModuleRecord>, loader: Weak<Inner>) -> Self {
        Self { record, loader }
    }

    /// The owning loader, as long as this handle's record is still the one
    /// registered under its identifier.
    fn loader(&self) -> Result<ModuleLoader, ModuleSystemError> {
        self.loader
            .upgrade()
            .map(|inner| ModuleLoader { inner })
            .filter(|loader| loader.inner.registry.is_current(&self.record))
            .ok_or_else(|| ModuleSystemError::NotRegistered {
                identifier: self.record.identifier().to_string(),
            })
    }

    pub fn identifier(&self) -> &str {
        self.record.identifier()
    }

    pub fn metadata(&self) -> &ModuleMetadata {
        self.record.metadata()
    }

    pub fn record(&self) -> &Arc<ModuleRecord> {
        &self.record
    }

    pub fn is_enabled(&self) -> bool {
        self.record.is_enabled()
    }

    pub async fn enable(&self, notify: bool) -> Result<(), ModuleSystemError> {
        self.loader()?.enable_record(&self.record, notify).await
    }

    pub async fn disable(&self, notify: bool) -> Result<(), ModuleSystemError> {
        self.loader()?.disable_record(&self.record, notify).await
    }

    pub async fn dispose(&self, notify: bool) -> Result<(), ModuleSystemError> {
        self.loader()?.dispose_record(&self.record, notify).await
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("identifier", &self.record.identifier())
            .finish_non_exhaustive()
    }
}
