//! Wiring configuration.
//!
//! [`WiringConfig`] is plain serde data with defaults for every field, so an
//! empty JSON object is a valid configuration.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WiringError;

/// What to do with a reference whose path is too short to name a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedReferencePolicy {
    /// Exclude the reference from wiring; log at `warn`.
    #[default]
    Skip,
    /// Fail the wiring pass.
    Reject,
}

impl FromStr for MalformedReferencePolicy {
    type Err = WiringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(MalformedReferencePolicy::Skip),
            "reject" => Ok(MalformedReferencePolicy::Reject),
            other => Err(WiringError::UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for MalformedReferencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedReferencePolicy::Skip => f.write_str("skip"),
            MalformedReferencePolicy::Reject => f.write_str("reject"),
        }
    }
}

/// Options for compile-time and incremental wiring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WiringConfig {
    pub malformed_references: MalformedReferencePolicy,
    /// Fail on `@self` references that are not inside a field instead of
    /// skipping them.
    pub strict_self_references: bool,
}

impl WiringConfig {
    pub fn from_json_str(json: &str) -> Result<Self, WiringError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, WiringError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| WiringError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}
