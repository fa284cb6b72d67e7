//! Single-episode simulation command

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use gridsim_core::GridSimConfig;
use gridsim_rl::{DispatchEnv, PolicyContext, PolicyRegistry};

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Policy to run
    #[arg(short, long, default_value = "greedy")]
    pub policy: String,

    /// Episode seed (picks the demand window and seeds stochastic policies)
    #[arg(short, long, default_value_t = 0)]
    pub seed: u64,

    /// Demand file (CSV or JSON), overrides the configured one
    #[arg(long)]
    pub demand: Option<PathBuf>,

    /// Linear policy weights (JSON)
    #[arg(long)]
    pub weights: Option<PathBuf>,
}

pub async fn run(args: SimulateArgs, config: GridSimConfig) -> Result<()> {
    let series = Arc::new(
        config
            .demand
            .load_series(args.demand.as_deref())
            .context("Failed to load demand series")?,
    );

    let mut env = DispatchEnv::new(&config, series)?;
    let ctx = PolicyContext::from_config(&config).with_weights(args.weights.clone());
    let mut policy = PolicyRegistry::new()
        .create(&args.policy, &ctx)
        .with_context(|| format!("Cannot build policy '{}'", args.policy))?;

    policy.reset(args.seed);
    let mut observation = env.reset(args.seed)?;
    info!(
        "Simulating '{}' from window offset {:?} (horizon {})",
        policy.name(),
        env.window_offset(),
        env.horizon()
    );

    println!(
        "{:>5} {:>10} {:>10} {:>9} {:>12} {:>12}",
        "t", "demand", "supply", "gap", "cost", "reward"
    );
    loop {
        let action = policy.act(&observation);
        let outcome = env.step(&action)?;
        let t = env.trajectory().len() - 1;
        println!(
            "{:>5} {:>10.2} {:>10.2} {:>9.2} {:>12.2} {:>12.4}",
            t,
            outcome.demand,
            outcome.supply,
            (outcome.supply - outcome.demand).abs(),
            outcome.components.generation_cost,
            outcome.reward
        );
        observation = outcome.observation;
        if outcome.done {
            break;
        }
    }

    let trajectory = env.trajectory();
    println!();
    println!("Steps:            {}", trajectory.len());
    println!("Total cost:       {:.2}", trajectory.total_cost());
    println!("Total reward:     {:.4}", trajectory.total_reward());
    println!("Mean supply gap:  {:.3} MW", trajectory.mean_gap());
    println!(
        "Energy delivered: {:.2} MWh",
        trajectory.energy_delivered(env.step_hours())
    );
    if trajectory.truncated() {
        println!("Episode truncated: demand window shorter than the horizon");
    }
    let violations = trajectory.violations();
    if violations.clamped_actions > 0 {
        println!("Clamped actions:  {}", violations.clamped_actions);
    }
    Ok(())
}
