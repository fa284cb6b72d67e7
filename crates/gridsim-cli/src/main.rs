//! gridsim CLI - evaluate dispatch policies against the grid simulator
//!
//! Runs baseline and learned policies over seeded episodes and writes the
//! comparison report consumed by external plotting tools.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::unused_async)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_precision_loss)]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gridsim_core::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{config, demand, evaluate, simulate, LoadedConfig};

#[derive(Parser)]
#[command(name = "gridsim")]
#[command(author, version, about = "gridsim - grid dispatch simulation and policy evaluation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to $GRIDSIM_CONFIG, ./gridsim.toml, ~/.config/gridsim/gridsim.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate policies over seeded episodes and write a JSON report
    Evaluate(evaluate::EvaluateArgs),

    /// Run one episode and print every step
    Simulate(simulate::SimulateArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),

    /// Demand series tools
    #[command(subcommand)]
    Demand(demand::DemandCommands),
}

fn init_tracing(cli: &Cli, logging: &LoggingConfig) {
    let log_level = if cli.verbose {
        "debug"
    } else {
        logging.level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("gridsim_cli={log_level},gridsim_core={log_level},gridsim_rl={log_level}").into()
    });

    let (plain, json) = if cli.json_logs || logging.json {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
        )
    } else {
        (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Loaded once, silently, so its logging section can configure the subscriber.
    let loaded = LoadedConfig::load(cli.config.as_deref());
    let logging = loaded
        .as_ref()
        .map(|l| l.config.logging.clone())
        .unwrap_or_default();
    init_tracing(&cli, &logging);

    match cli.command {
        Commands::Config(cmd) => config::run(cmd, loaded).await,
        Commands::Evaluate(args) => evaluate::run(args, commands::checked(loaded)?).await,
        Commands::Simulate(args) => simulate::run(args, commands::checked(loaded)?).await,
        Commands::Demand(cmd) => demand::run(cmd, commands::checked(loaded)?).await,
    }
}
