use std::fmt;
use std::str::FromStr;
use semver::{Version, VersionReq};
use thiserror::Error;

/// Error type for version parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Invalid host version '{0}'")]
    InvalidVersion(String),
    #[error("Invalid version constraint '{constraint}': {message}")]
    InvalidConstraint { constraint: String, message: String },
}

/// Parses the version the host application reports about itself.
pub fn parse_host_version(version: &str) -> Result<Version, VersionError> {
    Version::parse(version.trim()).map_err(|_| VersionError::InvalidVersion(version.to_string()))
}

/// Represents a host version requirement using semver constraints.
///
/// Module metadata may declare which host versions it was written against
/// (`hostVersions`). The loader only uses this to demote modules that declare
/// an incompatible range; it never selects between versions.
#[derive(Debug, Clone)]
pub struct VersionRange {
    /// The original constraint string (e.g., "^1.2.3", ">=2.0")
    constraint: String,
    /// The parsed semver requirement
    req: VersionReq,
}

impl VersionRange {
    /// Creates a new version range from a constraint string.
    pub fn from_constraint(constraint: &str) -> Result<Self, VersionError> {
        let req = VersionReq::parse(constraint).map_err(|e| VersionError::InvalidConstraint {
            constraint: constraint.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            constraint: constraint.to_string(),
            req,
        })
    }

    /// Checks if a specific host version satisfies this range.
    pub fn includes(&self, version: &Version) -> bool {
        self.req.matches(version)
    }

    /// Returns the original constraint string.
    pub fn constraint_string(&self) -> &str {
        &self.constraint
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.constraint)
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionRange::from_constraint(s)
    }
}
