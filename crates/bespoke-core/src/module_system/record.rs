use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::module_system::error::UnitError;
use crate::module_system::metadata::{ModuleMetadata, resolve_entry};

/// Undoes an activated code unit. Runs at most once.
pub type ReleaseCode = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), UnitError>> + Send>;

/// Undoes an injected style unit. Runs at most once.
pub type ReleaseStyle = Box<dyn FnOnce() + Send>;

type InjectionTask = Shared<BoxFuture<'static, Result<(), String>>>;

/// How far a module got through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModuleState {
    Unloaded,
    MixinLoaded,
    StyleLoaded,
    CodeLoaded,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleState::Unloaded => write!(f, "unloaded"),
            ModuleState::MixinLoaded => write!(f, "mixin-loaded"),
            ModuleState::StyleLoaded => write!(f, "style-loaded"),
            ModuleState::CodeLoaded => write!(f, "code-loaded"),
        }
    }
}

/// Why a module was last switched off
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisableReason {
    /// Disabled through `disable` or persisted as disabled
    User,
    /// A declared dependency is not registered
    MissingDependency(String),
    /// The module sits on a dependency cycle (members in traversal order)
    DependencyCycle(Vec<String>),
    /// The module does not support the running host version
    IncompatibleHost(String),
}

impl fmt::Display for DisableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisableReason::User => write!(f, "disabled by user"),
            DisableReason::MissingDependency(dep) => write!(f, "missing dependency {}", dep),
            DisableReason::DependencyCycle(cycle) => write!(f, "dependency cycle {}", cycle.join(" -> ")),
            DisableReason::IncompatibleHost(range) => write!(f, "requires host version {}", range),
        }
    }
}

/// Background tasks a module's pre-init unit left running.
///
/// Tasks start immediately when registered; joining only waits for them.
/// Settled tasks are kept until the module's pre-init runs again, so every
/// join until then sees the same results.
#[derive(Default)]
pub struct PendingInjections {
    tasks: Mutex<Vec<InjectionTask>>,
}

impl PendingInjections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` on the runtime and keep a joinable handle to it.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn push<F>(&self, task: F)
    where
        F: Future<Output = Result<(), UnitError>> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let joined = async move {
            match handle.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(join_err) => Err(format!("injection task did not complete: {}", join_err)),
            }
        }
        .boxed()
        .shared();
        self.tasks.lock().push(joined);
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Forget every task. Tasks still running keep running, nobody waits for them.
    pub(crate) fn clear(&self) {
        self.tasks.lock().clear();
    }

    /// Wait until every registered task settled. Returns the failure messages.
    pub async fn settle(&self) -> Vec<String> {
        let tasks: Vec<InjectionTask> = self.tasks.lock().clone();
        futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect()
    }
}

/// Capability handed to a pre-init unit so it can leave work running in the
/// background. Code activation of the same module waits for that work.
#[derive(Clone)]
pub struct InjectionRegistrar {
    identifier: String,
    pending: Arc<PendingInjections>,
}

impl InjectionRegistrar {
    /// Identifier of the module the registrations are attributed to
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Enqueue a background task. It starts running right away.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; the task is spawned with
    /// `tokio::spawn`.
    pub fn register<F>(&self, task: F)
    where
        F: Future<Output = Result<(), UnitError>> + Send + 'static,
    {
        log::debug!("{} registered an injection", self.identifier);
        self.pending.push(task);
    }
}

impl fmt::Debug for InjectionRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionRegistrar")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

/// One registered module: its metadata plus runtime state.
pub struct ModuleRecord {
    metadata: ModuleMetadata,
    identifier: String,
    metadata_location: String,
    remote_metadata_location: Option<String>,
    anchor: bool,
    enabled: AtomicBool,
    priority: AtomicU64,
    state: Mutex<ModuleState>,
    disabled_reason: Mutex<Option<DisableReason>>,
    pending: Arc<PendingInjections>,
    release_code: Mutex<Option<ReleaseCode>>,
    release_style: Mutex<Option<ReleaseStyle>>,
}

impl ModuleRecord {
    /// Create a record. `metadata` is expected to be validated already.
    pub fn new(
        metadata: ModuleMetadata,
        metadata_location: impl Into<String>,
        remote_metadata_location: Option<String>,
        enabled: bool,
    ) -> Self {
        let identifier = metadata.identifier();
        Self {
            metadata,
            identifier,
            metadata_location: metadata_location.into(),
            remote_metadata_location,
            anchor: false,
            enabled: AtomicBool::new(enabled),
            priority: AtomicU64::new(0),
            state: Mutex::new(ModuleState::Unloaded),
            disabled_reason: Mutex::new((!enabled).then_some(DisableReason::User)),
            pending: Arc::new(PendingInjections::new()),
            release_code: Mutex::new(None),
            release_style: Mutex::new(None),
        }
    }

    /// The placeholder that owns cross-cutting injections.
    pub fn anchor() -> Self {
        let mut metadata = ModuleMetadata::new(
            crate::kernel::constants::ANCHOR_NAME,
            crate::kernel::constants::ANCHOR_NAME,
        );
        metadata.tags.push(crate::kernel::constants::ANCHOR_NAME.to_string());
        metadata.version = "dev".to_string();
        let mut record = Self::new(metadata, String::new(), None, true);
        record.anchor = true;
        record
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn metadata(&self) -> &ModuleMetadata {
        &self.metadata
    }

    pub fn metadata_location(&self) -> &str {
        &self.metadata_location
    }

    pub fn remote_metadata_location(&self) -> Option<&str> {
        self.remote_metadata_location.as_deref()
    }

    pub fn is_anchor(&self) -> bool {
        self.anchor
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Flip the enabled flag, returning the previous value.
    pub(crate) fn set_enabled(&self, enabled: bool) -> bool {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if enabled {
            *self.disabled_reason.lock() = None;
        }
        previous
    }

    /// Disable the record and remember why.
    pub(crate) fn demote(&self, reason: DisableReason) {
        self.enabled.store(false, Ordering::SeqCst);
        *self.disabled_reason.lock() = Some(reason);
    }

    pub fn disabled_reason(&self) -> Option<DisableReason> {
        self.disabled_reason.lock().clone()
    }

    pub fn priority(&self) -> u64 {
        self.priority.load(Ordering::SeqCst)
    }

    pub(crate) fn bump_priority(&self) -> u64 {
        self.priority.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn state(&self) -> ModuleState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ModuleState) {
        *self.state.lock() = state;
    }

    /// Pre-init effects survive a disable, everything later is undone.
    pub(crate) fn rewind_state(&self) {
        let mut state = self.state.lock();
        if *state > ModuleState::MixinLoaded {
            *state = ModuleState::MixinLoaded;
        }
    }

    pub fn pending_injections(&self) -> &Arc<PendingInjections> {
        &self.pending
    }

    pub fn registrar(&self) -> InjectionRegistrar {
        InjectionRegistrar {
            identifier: self.identifier.clone(),
            pending: self.pending.clone(),
        }
    }

    pub fn mixin_location(&self) -> Option<String> {
        self.entry_location(self.metadata.entries.mixin.as_deref())
    }

    pub fn code_location(&self) -> Option<String> {
        self.entry_location(self.metadata.entries.code.as_deref())
    }

    pub fn style_location(&self) -> Option<String> {
        self.entry_location(self.metadata.entries.style.as_deref())
    }

    fn entry_location(&self, entry: Option<&str>) -> Option<String> {
        entry.map(|e| resolve_entry(&self.metadata_location, e))
    }

    /// Id the injected style element is tagged with
    pub fn style_id(&self) -> String {
        format!("{}-styles", self.identifier)
    }

    pub fn has_release_code(&self) -> bool {
        self.release_code.lock().is_some()
    }

    pub fn has_release_style(&self) -> bool {
        self.release_style.lock().is_some()
    }

    pub(crate) fn install_release_code(&self, release: ReleaseCode) {
        *self.release_code.lock() = Some(release);
    }

    pub(crate) fn install_release_style(&self, release: ReleaseStyle) {
        *self.release_style.lock() = Some(release);
    }

    /// Run the code release callback if one is installed. The slot is cleared
    /// before the callback runs.
    pub async fn release_code(&self) -> Result<bool, UnitError> {
        let release = self.release_code.lock().take();
        match release {
            Some(release) => release().await.map(|_| true),
            None => Ok(false),
        }
    }

    /// Run the style release callback if one is installed.
    pub fn release_style(&self) -> bool {
        let release = self.release_style.lock().take();
        match release {
            Some(release) => {
                release();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("identifier", &self.identifier)
            .field("enabled", &self.is_enabled())
            .field("priority", &self.priority())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
