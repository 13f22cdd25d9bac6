mod cli;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use bespoke_core::kernel::constants;
use bespoke_core::kernel::{Error, Result};
use bespoke_core::module_system::{DescriptorFetcher, FsDescriptorFetcher, NoopNotifier, RemoteAction};
use bespoke_core::storage::LocalStorageProvider;
use bespoke_core::{Application, LoaderConfig, Vault, VaultEntry};
use clap::{Parser, Subcommand};
use log::{error, info};

/// Bespoke: dependency-aware module loader
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Config root holding the vault and the modules directory
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Config file, relative to the root
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage installed modules
    Pkg {
        #[command(subcommand)]
        command: PkgCommand,
    },
    /// List the modules in the vault
    List,
    /// Print the order modules load in
    Order,
    /// Run the full startup sequence without executing module code
    DryRun,
    /// Apply a protocol URI, as sent by a running loader
    Protocol {
        /// e.g. `bespoke:enable:author/name`
        uri: String,
    },
}

#[derive(Subcommand, Debug)]
enum PkgCommand {
    /// Add a module from its metadata location, or from an identifier
    /// installed under the modules directory
    Add {
        metadata: String,
        /// Upstream descriptor the module was installed from
        #[arg(long)]
        remote: Option<String>,
        /// Add the module disabled
        #[arg(long)]
        disabled: bool,
    },
    /// Remove a module from the vault
    Rem { identifier: String },
    /// Enable a module (persist setting)
    Enable { identifier: String },
    /// Disable a module (persist setting)
    Disable { identifier: String },
}

struct Workspace {
    root: PathBuf,
    config_path: PathBuf,
    provider: LocalStorageProvider,
    config: LoaderConfig,
}

impl Workspace {
    fn open(root: &Path, config_path: Option<&Path>) -> Result<Self> {
        let provider = LocalStorageProvider::new(root.to_path_buf());
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(constants::CONFIG_FILE_NAME));
        let config = LoaderConfig::load(&provider, &config_path)?;
        Ok(Self {
            root: root.to_path_buf(),
            config_path,
            provider,
            config,
        })
    }

    fn vault(&self) -> Result<Vault> {
        Vault::load(&self.provider, &self.config.vault_path())
    }

    fn save(&self, vault: &Vault) -> Result<()> {
        vault.save(&self.provider, &self.config.vault_path())
    }

    fn application(&self) -> Result<Application> {
        Application::from_root(
            self.root.clone(),
            Some(self.config_path.as_path()),
            Arc::new(cli::DryRunUnits),
            Arc::new(NoopNotifier),
        )
    }

    async fn add(&self, metadata: &str, remote: Option<String>, enabled: bool) -> Result<String> {
        let location = if metadata.ends_with(".json") {
            metadata.to_string()
        } else {
            self.config.metadata_location(metadata)
        };
        let descriptor = FsDescriptorFetcher::new(self.root.clone()).fetch(&location).await?;
        let identifier = descriptor.identifier();

        let mut entry = VaultEntry::new(location, enabled);
        if let Some(remote) = remote {
            entry = entry.with_remote(remote);
        }
        let mut vault = self.vault()?;
        vault.add(&identifier, entry)?;
        self.save(&vault)?;
        Ok(identifier)
    }

    fn remove(&self, identifier: &str) -> Result<()> {
        let mut vault = self.vault()?;
        vault.remove(identifier)?;
        self.save(&vault)
    }

    fn set_enabled(&self, identifier: &str, enabled: bool) -> Result<bool> {
        let mut vault = self.vault()?;
        let previous = vault.set_enabled(identifier, enabled)?;
        self.save(&vault)?;
        Ok(previous)
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let workspace = Workspace::open(&args.root, args.config.as_deref())?;

    match args.command {
        Commands::Pkg { command } => match command {
            PkgCommand::Add { metadata, remote, disabled } => {
                let identifier = workspace.add(&metadata, remote, !disabled).await?;
                println!("Added module '{}'", identifier);
            }
            PkgCommand::Rem { identifier } => {
                workspace.remove(&identifier)?;
                println!("Removed module '{}'", identifier);
            }
            PkgCommand::Enable { identifier } => {
                workspace.set_enabled(&identifier, true)?;
                println!("Enabled module '{}'", identifier);
            }
            PkgCommand::Disable { identifier } => {
                workspace.set_enabled(&identifier, false)?;
                println!("Disabled module '{}'", identifier);
            }
        },
        Commands::List => {
            let vault = workspace.vault()?;
            if vault.is_empty() {
                println!("No modules installed.");
            }
            for (identifier, entry) in vault.iter() {
                let status = if entry.enabled { "enabled" } else { "disabled" };
                println!("{}\t{}\t{}", identifier, status, entry.metadata);
            }
        }
        Commands::Order => {
            let mut app = workspace.application()?;
            let (vault, _) = app.prepare().await?;
            for (identifier, e) in &vault.failed {
                eprintln!("Skipped '{}': {}", identifier, e);
            }
            for record in app.loader().registry().ordered() {
                if record.is_anchor() {
                    continue;
                }
                println!("{}\t{}\t{}", record.priority(), record.identifier(), cli::status(&record));
            }
        }
        Commands::DryRun => {
            let mut app = workspace.application()?;
            let report = app.start(&cli::CliHost).await?;
            println!("Pre-init: {}", report.pre_init.join(", "));
            println!("Activated: {}", report.post_init.activated.join(", "));
            for failure in &report.post_init.failures {
                eprintln!("Failed: {}", failure);
            }
        }
        Commands::Protocol { uri } => {
            let action = RemoteAction::parse_protocol(&uri, &workspace.config.protocol_scheme)
                .ok_or_else(|| Error::Other(format!("Unrecognized protocol URI '{}'", uri)))?;
            info!("Applying protocol action {}", action);
            match &action {
                RemoteAction::Add(location) => {
                    let identifier = workspace.add(location, None, true).await?;
                    println!("Added module '{}'", identifier);
                }
                RemoteAction::Remove(identifier) => {
                    workspace.remove(identifier)?;
                    println!("Removed module '{}'", identifier);
                }
                RemoteAction::Enable(identifier) => {
                    workspace.set_enabled(identifier, true)?;
                    println!("Enabled module '{}'", identifier);
                }
                RemoteAction::Disable(identifier) => {
                    workspace.set_enabled(identifier, false)?;
                    println!("Disabled module '{}'", identifier);
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
