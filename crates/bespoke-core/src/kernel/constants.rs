/// Application name
pub const APP_NAME: &str = "Bespoke";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default modules directory, relative to the config root
pub const DEFAULT_MODULES_DIR: &str = "modules";

/// Persisted module manifest
pub const VAULT_FILE_NAME: &str = "vault.json";

/// Descriptor file inside every module directory
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Default loader configuration file
pub const CONFIG_FILE_NAME: &str = "bespoke.toml";

/// Endpoint that forwards protocol URIs to the system of record
pub const PROTOCOL_BASE: &str = "https://bespoke-proxy.delusoire.workers.dev/protocol/";

/// Scheme prefix of protocol actions
pub const PROTOCOL_SCHEME: &str = "bespoke:";

/// Author and name of the anchor module
pub const ANCHOR_NAME: &str = "internal";
