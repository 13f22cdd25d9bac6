//! Fakes for the host-supplied collaborators, shared by the module system and
//! kernel tests.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::module_system::error::{ModuleSystemError, ModuleSystemErrorSource, UnitError};
use crate::module_system::lifecycle::{ModuleHandle, ModuleLoader};
use crate::module_system::loader::{CodeUnit, DescriptorFetcher, MixinUnit, Transformer, UnitLoader};
use crate::module_system::metadata::{MetadataBuilder, ModuleMetadata};
use crate::module_system::notifier::{RemoteAction, RemoteNotifier};
use crate::module_system::record::{InjectionRegistrar, ModuleRecord, ReleaseCode, ReleaseStyle};

pub type Events = Arc<Mutex<Vec<String>>>;

/// `/modules/a/b/metadata.json`
pub fn location(identifier: &str) -> String {
    format!("/modules/{}/metadata.json", identifier)
}

/// Module identifier a unit location belongs to
pub fn module_of(location: &str) -> String {
    let trimmed = location.trim_start_matches("/modules/");
    match trimmed.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => trimmed.to_string(),
    }
}

/// Descriptor with all three entries and the given dependencies
pub fn meta(identifier: &str, deps: &[&str]) -> ModuleMetadata {
    let (author, name) = identifier.split_once('/').expect("identifier must be author/name");
    let mut builder = MetadataBuilder::new(author, name)
        .version("1.0.0")
        .mixin("mixin.js")
        .code("index.js")
        .style("index.css");
    for dep in deps {
        builder = builder.dependency(dep);
    }
    builder.build()
}

/// Descriptor without any entries
pub fn bare_meta(identifier: &str, deps: &[&str]) -> ModuleMetadata {
    let (author, name) = identifier.split_once('/').expect("identifier must be author/name");
    let mut builder = MetadataBuilder::new(author, name);
    for dep in deps {
        builder = builder.dependency(dep);
    }
    builder.build()
}

pub fn construct(loader: &ModuleLoader, identifier: &str, deps: &[&str]) -> Arc<ModuleRecord> {
    loader
        .construct(meta(identifier, deps), &location(identifier), None, true)
        .expect("construct should succeed")
}

pub fn count(events: &Events, event: &str) -> usize {
    events.lock().iter().filter(|e| e.as_str() == event).count()
}

pub fn position(events: &Events, event: &str) -> Option<usize> {
    events.lock().iter().position(|e| e == event)
}

#[derive(Clone, Copy)]
struct Injection {
    delay: Duration,
    fail: bool,
    fail_once: bool,
}

/// Records every load, activation and release as a string event.
#[derive(Default)]
pub struct FakeUnits {
    pub events: Events,
    failing_mixins: HashSet<String>,
    failing_styles: HashSet<String>,
    failing_code: HashSet<String>,
    no_release: HashSet<String>,
    slow_code: HashMap<String, Duration>,
    injections: HashMap<String, Injection>,
    injection_runs: Arc<Mutex<HashMap<String, usize>>>,
}

impl FakeUnits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_mixin(mut self, identifier: &str) -> Self {
        self.failing_mixins.insert(identifier.to_string());
        self
    }

    pub fn fail_style(mut self, identifier: &str) -> Self {
        self.failing_styles.insert(identifier.to_string());
        self
    }

    pub fn fail_code(mut self, identifier: &str) -> Self {
        self.failing_code.insert(identifier.to_string());
        self
    }

    /// Code unit of `identifier` has a default entry that returns nothing
    pub fn no_release(mut self, identifier: &str) -> Self {
        self.no_release.insert(identifier.to_string());
        self
    }

    pub fn slow_code(mut self, identifier: &str, delay: Duration) -> Self {
        self.slow_code.insert(identifier.to_string(), delay);
        self
    }

    /// Pre-init of `identifier` registers one background injection
    pub fn inject(mut self, identifier: &str, delay: Duration, fail: bool) -> Self {
        self.injections.insert(
            identifier.to_string(),
            Injection {
                delay,
                fail,
                fail_once: false,
            },
        );
        self
    }

    /// Like [`FakeUnits::inject`], but only the first registered injection fails
    pub fn inject_failing_once(mut self, identifier: &str, delay: Duration) -> Self {
        self.injections.insert(
            identifier.to_string(),
            Injection {
                delay,
                fail: false,
                fail_once: true,
            },
        );
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

struct FakeMixin {
    identifier: String,
    events: Events,
    fail: bool,
    injection: Option<Injection>,
    injection_runs: Arc<Mutex<HashMap<String, usize>>>,
}

#[async_trait]
impl MixinUnit for FakeMixin {
    async fn activate(&self, registrar: InjectionRegistrar) -> Result<(), UnitError> {
        self.events.lock().push(format!("mixin:{}", self.identifier));
        assert_eq!(registrar.identifier(), self.identifier);
        if let Some(injection) = self.injection {
            let events = self.events.clone();
            let identifier = self.identifier.clone();
            let first_run = {
                let mut runs = self.injection_runs.lock();
                let run = runs.entry(identifier.clone()).or_insert(0);
                *run += 1;
                *run == 1
            };
            let fail = injection.fail || (injection.fail_once && first_run);
            registrar.register(async move {
                tokio::time::sleep(injection.delay).await;
                events.lock().push(format!("injected:{}", identifier));
                if fail {
                    return Err(UnitError::from(format!("injection of {} broke", identifier)));
                }
                Ok(())
            });
        }
        if self.fail {
            return Err(format!("mixin of {} broke", self.identifier).into());
        }
        Ok(())
    }
}

struct FakeCode {
    identifier: String,
    events: Events,
    fail: bool,
    release: bool,
    delay: Option<Duration>,
}

#[async_trait]
impl CodeUnit for FakeCode {
    async fn activate(&self, module: ModuleHandle) -> Result<Option<ReleaseCode>, UnitError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.events.lock().push(format!("code:{}", module.identifier()));
        if self.fail {
            return Err(format!("code of {} broke", self.identifier).into());
        }
        if !self.release {
            return Ok(None);
        }
        let events = self.events.clone();
        let identifier = self.identifier.clone();
        let release: ReleaseCode = Box::new(move || {
            async move {
                events.lock().push(format!("release-code:{}", identifier));
                Ok::<(), UnitError>(())
            }
            .boxed()
        });
        Ok(Some(release))
    }
}

#[async_trait]
impl UnitLoader for FakeUnits {
    async fn load_mixin(&self, location: &str) -> Result<Arc<dyn MixinUnit>, UnitError> {
        let identifier = module_of(location);
        Ok(Arc::new(FakeMixin {
            fail: self.failing_mixins.contains(&identifier),
            injection: self.injections.get(&identifier).copied(),
            injection_runs: self.injection_runs.clone(),
            events: self.events.clone(),
            identifier,
        }))
    }

    async fn load_code(&self, location: &str) -> Result<Arc<dyn CodeUnit>, UnitError> {
        let identifier = module_of(location);
        Ok(Arc::new(FakeCode {
            fail: self.failing_code.contains(&identifier),
            release: !self.no_release.contains(&identifier),
            delay: self.slow_code.get(&identifier).copied(),
            events: self.events.clone(),
            identifier,
        }))
    }

    fn inject_style(&self, style_id: &str, location: &str) -> Result<ReleaseStyle, UnitError> {
        let identifier = module_of(location);
        assert_eq!(style_id, format!("{}-styles", identifier));
        self.push(format!("style:{}", identifier));
        if self.failing_styles.contains(&identifier) {
            return Err(format!("style of {} broke", identifier).into());
        }
        let events = self.events.clone();
        Ok(Box::new(move || {
            events.lock().push(format!("release-style:{}", identifier));
        }))
    }
}

/// Records transformed locations; fails for locations containing `fail_on`
#[derive(Default)]
pub struct RecordingTransformer {
    pub seen: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl RecordingTransformer {
    pub fn failing_on(fragment: &str) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            fail_on: Some(fragment.to_string()),
        }
    }
}

#[async_trait]
impl Transformer for RecordingTransformer {
    async fn transform(&self, location: &str) -> Result<String, UnitError> {
        self.seen.lock().push(location.to_string());
        if let Some(fragment) = &self.fail_on {
            if location.contains(fragment.as_str()) {
                return Err(format!("cannot transform {}", location).into());
            }
        }
        Ok(location.to_string())
    }
}

/// Serves descriptors from memory
#[derive(Default)]
pub struct MemoryFetcher {
    descriptors: HashMap<String, ModuleMetadata>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, metadata: ModuleMetadata) -> Self {
        self.descriptors.insert(location(&metadata.identifier()), metadata);
        self
    }
}

#[async_trait]
impl DescriptorFetcher for MemoryFetcher {
    async fn fetch(&self, location: &str) -> Result<ModuleMetadata, ModuleSystemError> {
        self.descriptors
            .get(location)
            .cloned()
            .ok_or_else(|| ModuleSystemError::MetadataFetch {
                location: location.to_string(),
                source: Box::new(ModuleSystemErrorSource::Other("not found".to_string())),
            })
    }
}

/// Writes every notification into an event log as `notify:<action>:<argument>`
pub struct EventNotifier {
    pub events: Events,
}

impl RemoteNotifier for EventNotifier {
    fn notify(&self, action: RemoteAction) {
        self.events.lock().push(format!("notify:{}", action));
    }
}
