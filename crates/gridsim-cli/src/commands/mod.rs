//! CLI command modules

pub mod config;
pub mod demand;
pub mod evaluate;
pub mod simulate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gridsim_core::GridSimConfig;
use tracing::info;

/// Configuration loaded once at startup, with the file it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub source: Option<PathBuf>,
    pub config: GridSimConfig,
}

impl LoadedConfig {
    /// Locate and load the configuration without logging, so it can run
    /// before the subscriber is installed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let source = GridSimConfig::locate(path)?;
        let config = GridSimConfig::load_from(source.as_deref())
            .context("Failed to load gridsim configuration")?;
        Ok(Self { source, config })
    }

    pub fn log_source(&self) {
        match &self.source {
            Some(path) => info!("Loaded config from {}", path.display()),
            None => info!("No config file found, using defaults"),
        }
    }
}

/// Surface a startup load failure, or log where the configuration came from.
pub fn checked(loaded: Result<LoadedConfig>) -> Result<GridSimConfig> {
    let loaded = loaded?;
    loaded.log_source();
    Ok(loaded.config)
}
