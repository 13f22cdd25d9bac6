use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::kernel::constants;
use crate::kernel::error::{Error, Result};
use crate::module_system::dependency::ResolutionReport;
use crate::module_system::error::UnitError;
use crate::module_system::lifecycle::{ModuleLoader, PostInitReport, VaultLoadReport};
use crate::module_system::loader::{FsDescriptorFetcher, UnitLoader};
use crate::module_system::notifier::RemoteNotifier;
use crate::storage::config::LoaderConfig;
use crate::storage::local::LocalStorageProvider;
use crate::storage::vault::Vault;

/// The host application, as seen from the loader
#[async_trait]
pub trait HostRuntime: Send + Sync {
    /// The host's own initialization. Runs after every module's pre-init and
    /// before any style or code is activated.
    async fn initialize(&self) -> std::result::Result<(), UnitError>;
}

/// What happened during [`Application::start`]. The vault and resolution
/// outcomes stay on the application, see [`Application::prepared`].
#[derive(Debug, Default)]
pub struct StartupReport {
    /// Modules whose pre-init completed, in the order they ran
    pub pre_init: Vec<String>,
    pub anchor_failures: Vec<String>,
    pub post_init: PostInitReport,
}

/// Ties the config root, the vault and the loader together and runs startup.
pub struct Application {
    root: PathBuf,
    config: LoaderConfig,
    provider: LocalStorageProvider,
    loader: ModuleLoader,
    prepared: Option<(VaultLoadReport, ResolutionReport)>,
    started: bool,
}

impl Application {
    /// Create an application over `root` with an already built loader
    pub fn new(root: PathBuf, config: LoaderConfig, loader: ModuleLoader) -> Self {
        Self {
            provider: LocalStorageProvider::new(root.clone()),
            root,
            config,
            loader,
            prepared: None,
            started: false,
        }
    }

    /// Read the config under `root` (or `config_path`) and build a loader
    /// that fetches descriptors from disk.
    pub fn from_root(
        root: PathBuf,
        config_path: Option<&Path>,
        units: Arc<dyn UnitLoader>,
        notifier: Arc<dyn RemoteNotifier>,
    ) -> Result<Self> {
        log::info!("Initializing {} v{}", constants::APP_NAME, constants::APP_VERSION);
        let provider = LocalStorageProvider::new(root.clone());
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(constants::CONFIG_FILE_NAME));
        let config = LoaderConfig::load(&provider, &config_path)?;
        log::info!("Using config root: {}", root.display());

        let loader = ModuleLoader::builder(units)
            .fetcher(Arc::new(FsDescriptorFetcher::new(root.clone())))
            .notifier(notifier)
            .config(&config)?
            .build();
        Ok(Self::new(root, config, loader))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn load_vault(&self) -> Result<Vault> {
        Vault::load(&self.provider, &self.config.vault_path())
    }

    /// Reports of the preparation step, once it ran
    pub fn prepared(&self) -> Option<&(VaultLoadReport, ResolutionReport)> {
        self.prepared.as_ref()
    }

    /// Construct the vault's modules and resolve priorities, without running
    /// any phase. Idempotent, also after [`Application::start`].
    pub async fn prepare(&mut self) -> Result<&(VaultLoadReport, ResolutionReport)> {
        if self.prepared.is_none() {
            let vault = self.load_vault()?;
            let vault_report = self.loader.load_vault(&vault).await;
            let resolution = self.loader.resolve_priorities();
            for error in resolution.errors() {
                log::warn!("{}", error);
            }
            self.prepared = Some((vault_report, resolution));
        }
        self.prepared
            .as_ref()
            .ok_or_else(|| Error::Other("Module preparation did not run".to_string()))
    }

    /// Run the full startup sequence: prepare, pre-init, host initialization,
    /// post-init.
    ///
    /// A pre-init failure aborts startup before the host initializes.
    pub async fn start(&mut self, host: &dyn HostRuntime) -> Result<StartupReport> {
        if self.started {
            return Err(Error::Other("Application already started".to_string()));
        }
        let started = Instant::now();

        self.prepare().await?;
        let pre_init = self.loader.run_pre_init().await?;

        log::info!("Waiting for host initialization...");
        host.initialize().await.map_err(|e| Error::Host { message: e.to_string() })?;

        let anchor_failures = self.loader.await_anchor_injections().await;
        let post_init = self.loader.run_post_init().await;

        self.started = true;
        log::info!(
            "Started {} modules in {:?} ({} failures)",
            post_init.activated.len(),
            started.elapsed(),
            post_init.failures.len()
        );

        Ok(StartupReport {
            pre_init,
            anchor_failures,
            post_init,
        })
    }
}
