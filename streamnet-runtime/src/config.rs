//! Runtime configuration
//!
//! Loaded from YAML; every field has a default so an empty document is a
//! valid configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub gc: GcConfig,

    /// Default tracing filter used by the binary when `RUST_LOG` is unset
    #[serde(default)]
    pub log_filter: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Capacity of every stream the network allocates; unbounded when absent
    #[serde(default)]
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcConfig {
    /// Structural garbage collection of parallel branches and star iterations
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Close collector branches whose next record is a Terminate before
    /// adding a newly announced branch
    #[serde(default = "default_true")]
    pub scan_waiting_on_collect: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_waiting_on_collect: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl RuntimeConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
