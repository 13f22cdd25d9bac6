use serde::{Deserialize, Serialize};

use crate::module_system::error::{ModuleSystemError, ModuleSystemErrorSource};
use crate::module_system::version::VersionRange;

/// Entry points a module may declare, relative to its metadata location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntries {
    /// Pre-init unit, run before the host finishes starting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mixin: Option<String>,

    /// Main code unit, activated after the host started
    #[serde(default, rename = "js", skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Style unit
    #[serde(default, rename = "css", skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// Describes one module. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleMetadata {
    /// Module name, second half of the identifier
    pub name: String,

    /// Authors, the first one is canonical
    pub authors: Vec<String>,

    /// Module version (display only)
    #[serde(default)]
    pub version: String,

    /// Module description
    #[serde(default)]
    pub description: String,

    /// Tags for categorization
    #[serde(default)]
    pub tags: Vec<String>,

    /// Preview image location
    #[serde(default)]
    pub preview: String,

    /// Readme location
    #[serde(default)]
    pub readme: String,

    /// Entry points
    #[serde(default)]
    pub entries: ModuleEntries,

    /// Identifiers of the modules this one depends on
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Host versions this module was written against (semver range)
    #[serde(default, alias = "spotifyVersions", skip_serializing_if = "Option::is_none")]
    pub host_versions: Option<String>,
}

impl ModuleMetadata {
    /// Create metadata with a single author and no entries
    pub fn new(author: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            authors: vec![author.to_string()],
            version: String::new(),
            description: String::new(),
            tags: Vec::new(),
            preview: String::new(),
            readme: String::new(),
            entries: ModuleEntries::default(),
            dependencies: Vec::new(),
            host_versions: None,
        }
    }

    /// Parse and validate metadata fetched from `location`
    pub fn from_json(location: &str, data: &str) -> Result<Self, ModuleSystemError> {
        let metadata: ModuleMetadata =
            serde_json::from_str(data).map_err(|e| ModuleSystemError::MetadataFetch {
                location: location.to_string(),
                source: Box::new(ModuleSystemErrorSource::Json(e)),
            })?;
        metadata.validated(location)
    }

    /// Check the invariants the identifier relies on and drop duplicate dependencies.
    pub fn validated(mut self, location: &str) -> Result<Self, ModuleSystemError> {
        let invalid = |message: &str| ModuleSystemError::InvalidMetadata {
            location: location.to_string(),
            message: message.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("module name is empty"));
        }
        if self.name.contains('/') {
            return Err(invalid("module name must not contain '/'"));
        }
        match self.authors.first() {
            None => return Err(invalid("module declares no authors")),
            Some(author) if author.trim().is_empty() || author.contains('/') => {
                return Err(invalid("first author is empty or contains '/'"));
            }
            Some(_) => {}
        }

        let mut seen = std::collections::HashSet::new();
        self.dependencies.retain(|dep| seen.insert(dep.clone()));
        Ok(self)
    }

    /// Canonical author
    pub fn author(&self) -> &str {
        self.authors.first().map(String::as_str).unwrap_or_default()
    }

    /// `<author>/<name>`
    pub fn identifier(&self) -> String {
        format!("{}/{}", self.author(), self.name)
    }

    /// Parsed host version range, if declared
    pub fn host_range(&self) -> Option<Result<VersionRange, crate::module_system::version::VersionError>> {
        self.host_versions.as_deref().map(VersionRange::from_constraint)
    }
}

/// Resolve an entry declared in metadata against the metadata's own location.
///
/// `modules/a/b/metadata.json` + `index.js` gives `modules/a/b/index.js`.
pub fn resolve_entry(metadata_location: &str, entry: &str) -> String {
    let entry = entry.trim_start_matches("./");
    match metadata_location.rfind('/') {
        Some(idx) => format!("{}/{}", &metadata_location[..idx], entry),
        None => entry.to_string(),
    }
}

/// Builder for creating module metadata, mostly for hosts and tests
pub struct MetadataBuilder {
    metadata: ModuleMetadata,
}

impl MetadataBuilder {
    /// Create a new metadata builder
    pub fn new(author: &str, name: &str) -> Self {
        Self {
            metadata: ModuleMetadata::new(author, name),
        }
    }

    /// Add a co-author
    pub fn author(mut self, author: &str) -> Self {
        self.metadata.authors.push(author.to_string());
        self
    }

    /// Set the version
    pub fn version(mut self, version: &str) -> Self {
        self.metadata.version = version.to_string();
        self
    }

    /// Set the description
    pub fn description(mut self, description: &str) -> Self {
        self.metadata.description = description.to_string();
        self
    }

    /// Add a tag
    pub fn tag(mut self, tag: &str) -> Self {
        self.metadata.tags.push(tag.to_string());
        self
    }

    /// Declare a dependency on another module identifier
    pub fn dependency(mut self, identifier: &str) -> Self {
        self.metadata.dependencies.push(identifier.to_string());
        self
    }

    /// Set the pre-init entry
    pub fn mixin(mut self, entry: &str) -> Self {
        self.metadata.entries.mixin = Some(entry.to_string());
        self
    }

    /// Set the main code entry
    pub fn code(mut self, entry: &str) -> Self {
        self.metadata.entries.code = Some(entry.to_string());
        self
    }

    /// Set the style entry
    pub fn style(mut self, entry: &str) -> Self {
        self.metadata.entries.style = Some(entry.to_string());
        self
    }

    /// Restrict the host versions this module supports
    pub fn host_versions(mut self, range: &str) -> Self {
        self.metadata.host_versions = Some(range.to_string());
        self
    }

    /// Build the metadata
    pub fn build(self) -> ModuleMetadata {
        self.metadata
    }
}
