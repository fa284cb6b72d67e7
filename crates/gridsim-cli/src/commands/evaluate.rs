//! Policy evaluation command

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use gridsim_core::GridSimConfig;
use gridsim_rl::{CancelToken, Comparison, EvaluationHarness, PolicyContext, PolicyRegistry};

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Policies to evaluate (repeatable)
    #[arg(short, long = "policy", default_values_t = ["greedy".to_string(), "rule_based".to_string(), "random".to_string()])]
    pub policies: Vec<String>,

    /// Episodes per policy
    #[arg(short, long)]
    pub episodes: Option<usize>,

    /// Base seed of the episode seed sequence
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Parallel episode workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Demand file (CSV or JSON), overrides the configured one
    #[arg(long)]
    pub demand: Option<PathBuf>,

    /// Linear policy weights (JSON); adds the `linear` policy
    #[arg(long)]
    pub weights: Option<PathBuf>,

    /// Report output path
    #[arg(short, long, default_value = "evaluation_results.json")]
    pub output: PathBuf,
}

pub async fn run(args: EvaluateArgs, mut config: GridSimConfig) -> Result<()> {
    if let Some(episodes) = args.episodes {
        config.evaluation.episodes = episodes;
    }
    if let Some(seed) = args.seed {
        config.evaluation.base_seed = seed;
    }
    if let Some(workers) = args.workers {
        config.evaluation.workers = workers;
    }
    config.validate().context("Invalid evaluation settings")?;

    let mut policies = args.policies.clone();
    if args.weights.is_some() && !policies.iter().any(|p| p == "linear") {
        policies.insert(0, "linear".to_string());
    }

    let series = Arc::new(
        config
            .demand
            .load_series(args.demand.as_deref())
            .context("Failed to load demand series")?,
    );
    info!("Demand series: {} samples", series.len());

    let harness = EvaluationHarness::new(&config, series)?;
    let episodes = config.evaluation.episodes;
    let seeds = harness.seeds(episodes);
    let registry = PolicyRegistry::new();
    let ctx = PolicyContext::from_config(&config).with_weights(args.weights.clone());

    let cancel = CancelToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing running episodes");
            signal.cancel();
        }
    });

    let mut results = Vec::with_capacity(policies.len());
    for name in &policies {
        let factory = registry
            .factory(name, ctx.clone())
            .with_context(|| format!("Cannot build policy '{name}'"))?;
        let result = harness
            .evaluate_parallel(factory, episodes, &seeds, &cancel)
            .await
            .with_context(|| format!("Evaluation of '{name}' failed"))?;
        results.push(result);
        if cancel.is_cancelled() {
            break;
        }
    }

    let comparison = harness.comparison(results, &seeds);
    write_report(&comparison, &args.output)?;
    print_summary(&comparison);
    Ok(())
}

fn write_report(comparison: &Comparison, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&comparison.report())?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    info!(
        "Report {} written to {}",
        comparison.run_id,
        path.display()
    );
    Ok(())
}

fn print_summary(comparison: &Comparison) {
    println!("Evaluation Results ({})", comparison.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("==================");
    println!(
        "{:<16} {:>8} {:>14} {:>12} {:>10} {:>8} {:>12}",
        "policy", "episodes", "mean cost", "std cost", "gap (MW)", "match", "vs ref (%)"
    );
    for result in &comparison.results {
        let improvement = if result.policy == comparison.reference {
            "ref".to_string()
        } else {
            comparison
                .improvement_pct(&result.policy)
                .map_or_else(|| "-".to_string(), |pct| format!("{pct:+.2}"))
        };
        println!(
            "{:<16} {:>8} {:>14.2} {:>12.2} {:>10.3} {:>7.1}% {:>12}",
            result.policy,
            result.episodes,
            result.mean_cost,
            result.std_cost,
            result.mean_supply_gap,
            result.supply_match_rate * 100.0,
            improvement
        );
    }
    if comparison.results.iter().any(|r| r.cancelled) {
        println!("\nRun was cancelled; partial results shown.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: EvaluateArgs,
    }

    #[test]
    fn test_default_policies() {
        let cli = TestCli::parse_from(["gridsim"]);
        assert_eq!(cli.args.policies, vec!["greedy", "rule_based", "random"]);
        assert_eq!(cli.args.output, PathBuf::from("evaluation_results.json"));
    }

    #[test]
    fn test_repeated_policy_flag() {
        let cli = TestCli::parse_from(["gridsim", "--policy", "greedy", "-p", "random", "-e", "5"]);
        assert_eq!(cli.args.policies, vec!["greedy", "random"]);
        assert_eq!(cli.args.episodes, Some(5));
    }
}
