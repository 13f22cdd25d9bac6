use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::kernel::constants;
use crate::kernel::error::Result;
use crate::storage::error::StorageSystemError;
use crate::storage::provider::StorageProvider;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }

    fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "JSON",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "YAML",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "TOML",
        }
    }
}

/// Where the loader finds things and how it talks to the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directory holding one subdirectory per installed module
    pub modules_dir: String,
    /// Vault file, relative to the config root
    pub vault_file: String,
    /// Descriptor file name inside each module directory
    pub metadata_file: String,
    /// Protocol endpoint remote notifications are sent to
    pub protocol_base: String,
    /// Scheme prefix of protocol actions
    pub protocol_scheme: String,
    /// Host version, enables compatibility checks when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_version: Option<String>,
    /// Upper bound for each transform/load/activate step, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_timeout_ms: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            modules_dir: constants::DEFAULT_MODULES_DIR.to_string(),
            vault_file: constants::VAULT_FILE_NAME.to_string(),
            metadata_file: constants::METADATA_FILE_NAME.to_string(),
            protocol_base: constants::PROTOCOL_BASE.to_string(),
            protocol_scheme: constants::PROTOCOL_SCHEME.to_string(),
            host_version: None,
            phase_timeout_ms: None,
        }
    }
}

impl LoaderConfig {
    /// Serialize to string based on format
    pub fn serialize(&self, format: ConfigFormat) -> Result<String> {
        let serialized: std::result::Result<String, BoxError> = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(|e| Box::new(e) as BoxError),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(|e| Box::new(e) as BoxError),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(|e| Box::new(e) as BoxError),
        };
        serialized.map_err(|source| {
            StorageSystemError::SerializationError {
                format: format.name().to_string(),
                source,
            }
            .into()
        })
    }

    /// Deserialize from string based on format
    pub fn deserialize(data: &str, format: ConfigFormat) -> Result<Self> {
        let parsed: std::result::Result<Self, BoxError> = match format {
            ConfigFormat::Json => serde_json::from_str(data).map_err(|e| Box::new(e) as BoxError),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(data).map_err(|e| Box::new(e) as BoxError),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::from_str(data).map_err(|e| Box::new(e) as BoxError),
        };
        parsed.map_err(|source| {
            StorageSystemError::DeserializationError {
                format: format.name().to_string(),
                source,
            }
            .into()
        })
    }

    /// Load the config at `path`, format chosen by extension. A missing file
    /// gives the defaults.
    pub fn load(provider: &dyn StorageProvider, path: &Path) -> Result<Self> {
        let format = ConfigFormat::from_path(path)
            .ok_or_else(|| StorageSystemError::UnsupportedConfigFormat(path.display().to_string()))?;
        if !provider.is_file(path) {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let data = provider.read_to_string(path)?;
        Self::deserialize(&data, format)
    }

    pub fn save(&self, provider: &dyn StorageProvider, path: &Path) -> Result<()> {
        let format = ConfigFormat::from_path(path)
            .ok_or_else(|| StorageSystemError::UnsupportedConfigFormat(path.display().to_string()))?;
        provider.write_string(path, &self.serialize(format)?)
    }

    pub fn vault_path(&self) -> PathBuf {
        PathBuf::from(&self.vault_file)
    }

    /// Descriptor location of an installed module, in the form the fetcher reads
    pub fn metadata_location(&self, identifier: &str) -> String {
        format!("/{}/{}/{}", self.modules_dir, identifier, self.metadata_file)
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
