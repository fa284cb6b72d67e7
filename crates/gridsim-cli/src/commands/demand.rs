//! Demand series commands

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use gridsim_core::{DemandSeries, DemandStats, GridSimConfig};

#[derive(Subcommand, Debug)]
pub enum DemandCommands {
    /// Generate a synthetic hourly demand series as CSV
    Synth {
        /// Output CSV path
        #[arg(short, long, default_value = "demand.csv")]
        output: PathBuf,
        /// Number of hourly samples (defaults to the configured value)
        #[arg(long)]
        hours: Option<usize>,
        /// Noise seed (defaults to the configured value)
        #[arg(short, long)]
        seed: Option<u64>,
    },
    /// Print summary statistics of a demand file
    Inspect {
        /// CSV or JSON demand file
        path: PathBuf,
    },
}

pub async fn run(cmd: DemandCommands, config: GridSimConfig) -> Result<()> {
    match cmd {
        DemandCommands::Synth {
            output,
            hours,
            seed,
        } => synth(&config, &output, hours, seed),
        DemandCommands::Inspect { path } => inspect(&path),
    }
}

fn synth(
    config: &GridSimConfig,
    output: &Path,
    hours: Option<usize>,
    seed: Option<u64>,
) -> Result<()> {
    let mut synthetic = config.demand.synthetic.clone();
    if let Some(hours) = hours {
        synthetic.hours = hours;
    }
    if let Some(seed) = seed {
        synthetic.seed = seed;
    }

    let series = synthetic.generate()?;
    series
        .write_csv(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {} samples to {}", series.len(), output.display());
    print_stats(&series.stats());
    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let series = DemandSeries::from_path(path)
        .with_context(|| format!("Failed to load demand from {}", path.display()))?;
    println!("Demand series: {}", path.display());
    print_stats(&series.stats());
    Ok(())
}

fn print_stats(stats: &DemandStats) {
    println!("  samples: {}", stats.len);
    if let (Some(start), Some(end)) = (stats.start, stats.end) {
        println!("  range:   {start} .. {end}");
    }
    println!("  step:    {} min", stats.step_minutes);
    println!(
        "  load:    min {:.2} / mean {:.2} / max {:.2} MW",
        stats.min_mw, stats.mean_mw, stats.max_mw
    );
}
