//! Load and print the runtime configuration.

use anyhow::{Context, Result};
use std::path::Path;
use streamnet_runtime::RuntimeConfig;

/// Configuration from `path`, or the defaults when none is given
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

pub fn show_config(config: &RuntimeConfig) -> Result<()> {
    let yaml = config.to_yaml().context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}
