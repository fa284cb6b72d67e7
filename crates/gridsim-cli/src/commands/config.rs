//! Configuration management commands

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use gridsim_core::GridSimConfig;

use super::LoadedConfig;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Write a configuration file with default values
    Init {
        /// Destination file
        #[arg(default_value = "gridsim.toml")]
        path: PathBuf,
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
    /// Check a configuration file without running anything
    Validate {
        /// File to check (defaults to the --config path or the standard locations)
        path: Option<PathBuf>,
    },
}

/// `loaded` is the startup load; `init` does not need it and `validate PATH`
/// loads the named file instead.
pub async fn run(cmd: ConfigCommands, loaded: Result<LoadedConfig>) -> Result<()> {
    match cmd {
        ConfigCommands::Show => show(&loaded?),
        ConfigCommands::Init { path, force } => init(&path, force),
        ConfigCommands::Validate { path: Some(path) } => {
            validate(&LoadedConfig::load(Some(&path))?)
        }
        ConfigCommands::Validate { path: None } => validate(&loaded?),
    }
}

fn show(loaded: &LoadedConfig) -> Result<()> {
    println!("Current Configuration");
    println!("=====================\n");
    match &loaded.source {
        Some(path) => println!("# Config file: {}\n", path.display()),
        None => println!("# No configuration file found. Using defaults.\n"),
    }
    println!("{}", loaded.config.to_toml_string()?);
    Ok(())
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("Configuration file already exists: {}", path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    let contents = GridSimConfig::default().to_toml_string()?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Configuration written to {}", path.display());
    Ok(())
}

fn validate(loaded: &LoadedConfig) -> Result<()> {
    let config = &loaded.config;
    println!(
        "Configuration OK: {} generators ({:.0} MW), horizon {} steps",
        config.num_generators(),
        config.generators.iter().map(|g| g.capacity_mw).sum::<f64>(),
        config.environment.horizon
    );
    Ok(())
}
