//! Evaluation harness
//!
//! Runs a policy over a batch of seeded episodes and reduces the results to
//! an [`EvaluationResult`]. Every policy sees the same seed sequence, so
//! results from different policies are directly comparable, and the same
//! policy with the same seeds always yields the same summary.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use gridsim_core::{DemandSeries, EvaluationConfig, GridError, GridSimConfig, Result};

use crate::env::DispatchEnv;
use crate::policy::{Policy, PolicyKind};
use crate::registry::PolicyFactory;
use crate::simulator::Violations;
use crate::trajectory::{Trajectory, TrajectoryView};

/// z-score of the two-sided 95% normal interval
const Z_95: f64 = 1.959_963_984_540_054;

/// Deterministic stream of episode seeds derived from a base seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSequence {
    base: u64,
}

impl SeedSequence {
    pub fn new(base: u64) -> Self {
        Self { base }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    /// First `count` seeds of the sequence
    pub fn seeds(&self, count: usize) -> Vec<u64> {
        let mut state = self.base;
        (0..count).map(|_| splitmix64(&mut state)).collect()
    }
}

/// One splitmix64 step
pub fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Shared cancellation flag, observed between episodes
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-episode statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub seed: u64,
    pub steps: usize,
    pub total_cost: f64,
    pub total_reward: f64,
    pub mean_supply_gap: f64,
    pub energy_delivered_mwh: f64,
    /// Total cost per MWh delivered; 0 when nothing was delivered
    pub cost_per_unit: f64,
    pub supply_match_rate: f64,
    pub truncated: bool,
    /// Action entries clamped into bounds
    pub bounds_violations: usize,
    pub violations: Violations,
}

impl EpisodeSummary {
    pub fn from_trajectory(
        seed: u64,
        trajectory: &Trajectory,
        step_hours: f64,
        tolerance: f64,
    ) -> Self {
        let total_cost = trajectory.total_cost();
        let energy = trajectory.energy_delivered(step_hours);
        let violations = trajectory.violations();
        Self {
            seed,
            steps: trajectory.len(),
            total_cost,
            total_reward: trajectory.total_reward(),
            mean_supply_gap: trajectory.mean_gap(),
            energy_delivered_mwh: energy,
            cost_per_unit: if energy > 0.0 { total_cost / energy } else { 0.0 },
            supply_match_rate: trajectory.supply_match_rate(tolerance),
            truncated: trajectory.truncated(),
            bounds_violations: violations.clamped_actions,
            violations,
        }
    }
}

/// Aggregate result of evaluating one policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub policy: String,
    pub kind: PolicyKind,
    /// Episodes that completed
    pub episodes: usize,
    pub mean_cost: f64,
    pub std_cost: f64,
    /// Normal-approximation 95% interval for the mean cost
    pub cost_ci95: [f64; 2],
    pub mean_reward: f64,
    pub std_reward: f64,
    pub mean_supply_gap: f64,
    pub cost_per_unit: f64,
    pub supply_match_rate: f64,
    pub truncated_episodes: usize,
    pub bounds_violations: usize,
    /// The run stopped early on a cancellation request
    pub cancelled: bool,
    pub summaries: Vec<EpisodeSummary>,
    /// Full log of the first episode
    pub trajectory: Trajectory,
}

impl EvaluationResult {
    /// Reduce episode summaries, in seed order, to aggregate statistics.
    pub fn aggregate(
        policy: &str,
        kind: PolicyKind,
        summaries: Vec<EpisodeSummary>,
        trajectory: Trajectory,
        cancelled: bool,
    ) -> Result<Self> {
        if summaries.is_empty() {
            return Err(GridError::Cancelled);
        }
        let costs: Vec<f64> = summaries.iter().map(|s| s.total_cost).collect();
        let rewards: Vec<f64> = summaries.iter().map(|s| s.total_reward).collect();
        let (mean_cost, std_cost) = mean_std(&costs);
        let (mean_reward, std_reward) = mean_std(&rewards);
        let half_width = Z_95 * std_cost / (summaries.len() as f64).sqrt();

        Ok(Self {
            policy: policy.to_string(),
            kind,
            episodes: summaries.len(),
            mean_cost,
            std_cost,
            cost_ci95: [mean_cost - half_width, mean_cost + half_width],
            mean_reward,
            std_reward,
            mean_supply_gap: mean(summaries.iter().map(|s| s.mean_supply_gap)),
            cost_per_unit: mean(summaries.iter().map(|s| s.cost_per_unit)),
            supply_match_rate: mean(summaries.iter().map(|s| s.supply_match_rate)),
            truncated_episodes: summaries.iter().filter(|s| s.truncated).count(),
            bounds_violations: summaries.iter().map(|s| s.bounds_violations).sum(),
            cancelled,
            summaries,
            trajectory,
        })
    }

    /// Report entry for this policy
    pub fn report(&self) -> PolicyReport {
        PolicyReport {
            kind: self.kind,
            episodes: self.episodes,
            mean_cost: self.mean_cost,
            mean_supply_gap: self.mean_supply_gap,
            cost_per_unit: self.cost_per_unit,
            mean_reward: self.mean_reward,
            std_cost: self.std_cost,
            std_reward: self.std_reward,
            cost_ci95: self.cost_ci95,
            supply_match_rate: self.supply_match_rate,
            truncated_episodes: self.truncated_episodes,
            bounds_violations: self.bounds_violations,
            cancelled: self.cancelled,
            improvement_pct: None,
            trajectory: self.trajectory.view(),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Mean and population standard deviation
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let m = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / n;
    (m, var.sqrt())
}

/// One entry of the JSON report, keyed by policy name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyReport {
    pub kind: PolicyKind,
    pub episodes: usize,
    pub mean_cost: f64,
    pub mean_supply_gap: f64,
    pub cost_per_unit: f64,
    pub mean_reward: f64,
    pub std_cost: f64,
    pub std_reward: f64,
    pub cost_ci95: [f64; 2],
    pub supply_match_rate: f64,
    pub truncated_episodes: usize,
    pub bounds_violations: usize,
    pub cancelled: bool,
    /// Cost improvement over the reference policy (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improvement_pct: Option<f64>,
    pub trajectory: TrajectoryView,
}

/// Several policies evaluated on identical seeds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub reference: String,
    pub seeds: Vec<u64>,
    pub results: Vec<EvaluationResult>,
}

impl Comparison {
    pub fn result(&self, policy: &str) -> Option<&EvaluationResult> {
        self.results.iter().find(|r| r.policy == policy)
    }

    /// `(reference - policy) / reference * 100` on mean cost.
    ///
    /// `None` when either policy is missing or the reference cost is zero.
    pub fn improvement_pct(&self, policy: &str) -> Option<f64> {
        let reference = self.result(&self.reference)?.mean_cost;
        let cost = self.result(policy)?.mean_cost;
        if reference == 0.0 {
            return None;
        }
        Some((reference - cost) / reference * 100.0)
    }

    /// JSON report keyed by policy name
    pub fn report(&self) -> BTreeMap<String, PolicyReport> {
        self.results
            .iter()
            .map(|r| {
                let mut entry = r.report();
                if r.policy != self.reference {
                    entry.improvement_pct = self.improvement_pct(&r.policy);
                }
                (r.policy.clone(), entry)
            })
            .collect()
    }
}

/// Drive one episode to termination.
pub fn run_episode(
    env: &mut DispatchEnv,
    policy: &mut dyn Policy,
    seed: u64,
    tolerance: f64,
) -> Result<(EpisodeSummary, Trajectory)> {
    let name = policy.name().to_string();
    let wrap = |e: GridError| GridError::Evaluation {
        policy: name.clone(),
        seed,
        source: Box::new(e),
    };

    let mut observation = env.reset(seed).map_err(&wrap)?;
    policy.reset(seed);
    loop {
        let action = policy.act(&observation);
        let outcome = env.step(&action).map_err(&wrap)?;
        if outcome.done {
            break;
        }
        observation = outcome.observation;
    }

    let trajectory = env.take_trajectory();
    let summary = EpisodeSummary::from_trajectory(seed, &trajectory, env.step_hours(), tolerance);
    debug!(
        "Episode seed {} ({}): {} steps, cost {:.2}, mean gap {:.3}",
        seed,
        name,
        summary.steps,
        summary.total_cost,
        summary.mean_supply_gap
    );
    Ok((summary, trajectory))
}

/// Evaluates policies against a shared demand series and configuration
#[derive(Debug, Clone)]
pub struct EvaluationHarness {
    env: DispatchEnv,
    config: EvaluationConfig,
}

impl EvaluationHarness {
    pub fn new(config: &GridSimConfig, series: Arc<DemandSeries>) -> Result<Self> {
        Ok(Self {
            env: DispatchEnv::new(config, series)?,
            config: config.evaluation.clone(),
        })
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Seeds from the configured base seed
    pub fn seeds(&self, count: usize) -> Vec<u64> {
        SeedSequence::new(self.config.base_seed).seeds(count)
    }

    /// Fresh environment sharing this harness's series and configuration
    pub fn env(&self) -> DispatchEnv {
        self.env.clone()
    }

    fn check_request(&self, policy: &dyn Policy, num_episodes: usize, seeds: &[u64]) -> Result<()> {
        if num_episodes == 0 {
            return Err(GridError::Config(
                "number of episodes must be at least 1".to_string(),
            ));
        }
        if seeds.len() < num_episodes {
            return Err(GridError::Config(format!(
                "{num_episodes} episodes requested but only {} seeds given",
                seeds.len()
            )));
        }
        policy.check_dimensions(self.env.observation_dimension(), self.env.num_generators())
    }

    /// Evaluate `policy` on the first `num_episodes` seeds.
    pub fn evaluate(
        &self,
        policy: &mut dyn Policy,
        num_episodes: usize,
        seeds: &[u64],
    ) -> Result<EvaluationResult> {
        self.evaluate_with_cancel(policy, num_episodes, seeds, &CancelToken::new())
    }

    /// Like [`evaluate`](Self::evaluate), stopping between episodes once
    /// `cancel` is set. Completed episodes are kept.
    pub fn evaluate_with_cancel(
        &self,
        policy: &mut dyn Policy,
        num_episodes: usize,
        seeds: &[u64],
        cancel: &CancelToken,
    ) -> Result<EvaluationResult> {
        self.check_request(policy, num_episodes, seeds)?;
        info!(
            "Evaluating policy '{}' over {} episodes",
            policy.name(),
            num_episodes
        );

        let mut env = self.env.clone();
        let mut summaries = Vec::with_capacity(num_episodes);
        let mut first = None;
        let mut cancelled = false;

        for &seed in &seeds[..num_episodes] {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let (summary, trajectory) =
                run_episode(&mut env, policy, seed, self.config.supply_match_tolerance)?;
            first.get_or_insert(trajectory);
            summaries.push(summary);
        }

        self.finish(policy.name(), policy.kind(), summaries, first, cancelled)
    }

    /// Evaluate with a bounded pool of blocking workers, one fresh policy
    /// per episode. Results are merged in seed order, so the summary
    /// matches the sequential path.
    pub async fn evaluate_parallel(
        &self,
        factory: PolicyFactory,
        num_episodes: usize,
        seeds: &[u64],
        cancel: &CancelToken,
    ) -> Result<EvaluationResult> {
        let probe = factory()?;
        self.check_request(probe.as_ref(), num_episodes, seeds)?;
        let (name, kind) = (probe.name().to_string(), probe.kind());
        drop(probe);

        info!(
            "Evaluating policy '{}' over {} episodes with {} workers",
            name, num_episodes, self.config.workers
        );

        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let tolerance = self.config.supply_match_tolerance;
        // Set by the first failing episode; queued episodes then skip their run.
        let failed = CancelToken::new();
        let mut handles = Vec::with_capacity(num_episodes);
        let mut cancelled = false;

        for &seed in &seeds[..num_episodes] {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| GridError::Worker(e.to_string()))?;
            if failed.is_cancelled() {
                break;
            }
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let mut env = self.env.clone();
            let factory = factory.clone();
            let failed = failed.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                if failed.is_cancelled() {
                    return Ok(None);
                }
                let outcome = factory().and_then(|mut policy| {
                    run_episode(&mut env, policy.as_mut(), seed, tolerance)
                });
                if outcome.is_err() {
                    failed.cancel();
                }
                outcome.map(Some)
            }));
        }

        // Every handle is awaited, so no episode outlives this call.
        let mut summaries = Vec::with_capacity(handles.len());
        let mut first = None;
        let mut failure = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(Some((summary, trajectory)))) => {
                    first.get_or_insert(trajectory);
                    summaries.push(summary);
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    failed.cancel();
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    failed.cancel();
                    failure.get_or_insert(GridError::Worker(e.to_string()));
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        self.finish(&name, kind, summaries, first, cancelled)
    }

    fn finish(
        &self,
        name: &str,
        kind: PolicyKind,
        summaries: Vec<EpisodeSummary>,
        first: Option<Trajectory>,
        cancelled: bool,
    ) -> Result<EvaluationResult> {
        if cancelled {
            warn!(
                "Evaluation of '{}' cancelled after {} episodes",
                name,
                summaries.len()
            );
        }
        let result = EvaluationResult::aggregate(
            name,
            kind,
            summaries,
            first.unwrap_or_default(),
            cancelled,
        )?;
        if result.truncated_episodes > 0 {
            warn!(
                "{} of {} episodes for '{}' were truncated by the demand data",
                result.truncated_episodes, result.episodes, name
            );
        }
        info!(
            "Policy '{}': mean cost {:.2}, mean gap {:.3} MW, cost/MWh {:.3}",
            name, result.mean_cost, result.mean_supply_gap, result.cost_per_unit
        );
        Ok(result)
    }

    /// Evaluate several policies on identical seeds and report each one's
    /// cost improvement over the configured reference policy.
    pub fn compare(
        &self,
        policies: &mut [Box<dyn Policy>],
        num_episodes: usize,
        seeds: &[u64],
    ) -> Result<Comparison> {
        let mut results = Vec::with_capacity(policies.len());
        for policy in policies.iter_mut() {
            results.push(self.evaluate(policy.as_mut(), num_episodes, seeds)?);
        }
        Ok(self.comparison(results, &seeds[..num_episodes]))
    }

    /// Wrap already computed results in a [`Comparison`]
    pub fn comparison(&self, results: Vec<EvaluationResult>, seeds: &[u64]) -> Comparison {
        let comparison = Comparison {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            reference: self.config.reference_policy.clone(),
            seeds: seeds.to_vec(),
            results,
        };

        if comparison.result(&comparison.reference).is_none() {
            warn!(
                "Reference policy '{}' was not evaluated, no improvement figures",
                comparison.reference
            );
        }
        for result in &comparison.results {
            if let Some(pct) = comparison.improvement_pct(&result.policy) {
                if result.policy != comparison.reference {
                    info!(
                        "'{}' vs '{}': {:+.2}% cost improvement",
                        result.policy, comparison.reference, pct
                    );
                }
            }
        }
        comparison
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::GreedyPolicy;
    use crate::policy::FnPolicy;
    use gridsim_core::{Action, CostCurve, Generator, Observation};

    fn create_test_harness(len: usize, horizon: usize) -> EvaluationHarness {
        let mut config = GridSimConfig::default();
        config.generators = vec![
            Generator::new("base", 100.0, 20.0, 10.0, CostCurve::Linear { marginal: 10.0 }),
            Generator::new("peak", 50.0, 0.0, 25.0, CostCurve::Linear { marginal: 50.0 }),
        ];
        config.environment.horizon = horizon;
        let series = Arc::new(DemandSeries::constant(100.0, len).unwrap());
        EvaluationHarness::new(&config, series).unwrap()
    }

    fn hold() -> FnPolicy<impl FnMut(&Observation) -> Action + Send> {
        FnPolicy::new("hold", |obs: &Observation| Action::zeros(obs.outputs_mw.len()))
    }

    #[test]
    fn test_seed_sequence_is_stable() {
        let a = SeedSequence::new(42).seeds(5);
        let b = SeedSequence::new(42).seeds(5);
        assert_eq!(a, b);
        assert_eq!(&SeedSequence::new(42).seeds(8)[..5], a.as_slice());
        assert_ne!(SeedSequence::new(43).seeds(5), a);
    }

    #[test]
    fn test_splitmix64_reference_value() {
        let mut state = 0;
        assert_eq!(splitmix64(&mut state), 0xE220_A839_7B1D_CDAF);
    }

    #[test]
    fn test_too_few_seeds() {
        let harness = create_test_harness(50, 10);
        let mut policy = hold();
        assert!(matches!(
            harness.evaluate(&mut policy, 3, &[1, 2]),
            Err(GridError::Config(_))
        ));
    }

    #[test]
    fn test_hold_policy_summary() {
        let harness = create_test_harness(50, 10);
        let mut policy = hold();
        let seeds = harness.seeds(3);
        let result = harness.evaluate(&mut policy, 3, &seeds).unwrap();

        // 60 MW base + 25 MW peak every step, 15 MW short of 100 MW
        assert_eq!(result.episodes, 3);
        assert_eq!(result.mean_cost, 10.0 * (600.0 + 1250.0));
        assert_eq!(result.std_cost, 0.0);
        assert_eq!(result.mean_supply_gap, 15.0);
        assert_eq!(result.summaries[0].energy_delivered_mwh, 850.0);
        assert_eq!(result.cost_per_unit, 18_500.0 / 850.0);
        assert_eq!(result.supply_match_rate, 0.0);
        assert_eq!(result.trajectory.len(), 10);
        assert!(!result.cancelled);
    }

    #[test]
    fn test_pre_cancelled_run_errors() {
        let harness = create_test_harness(50, 10);
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut policy = hold();
        let seeds = harness.seeds(2);
        assert!(matches!(
            harness.evaluate_with_cancel(&mut policy, 2, &seeds, &cancel),
            Err(GridError::Cancelled)
        ));
    }

    #[test]
    fn test_cancel_between_episodes() {
        let harness = create_test_harness(50, 5);
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut steps = 0;
        let mut policy = FnPolicy::new("cancelling", move |obs: &Observation| {
            steps += 1;
            if steps == 5 {
                trigger.cancel();
            }
            Action::zeros(obs.outputs_mw.len())
        });
        let seeds = harness.seeds(4);
        let result = harness
            .evaluate_with_cancel(&mut policy, 4, &seeds, &cancel)
            .unwrap();
        assert!(result.cancelled);
        assert_eq!(result.episodes, 1);
    }

    #[test]
    fn test_numerical_error_names_policy_and_seed() {
        let mut config = GridSimConfig::default();
        config.generators = vec![Generator::new(
            "overflow",
            100.0,
            0.0,
            10.0,
            CostCurve::Quadratic {
                a: 0.0,
                b: 0.0,
                c: f64::MAX,
            },
        )];
        config.environment.horizon = 5;
        let series = Arc::new(DemandSeries::constant(100.0, 20).unwrap());
        let harness = EvaluationHarness::new(&config, series).unwrap();
        let mut policy = hold();

        match harness.evaluate(&mut policy, 1, &[17]) {
            Err(GridError::Evaluation { policy, seed, source }) => {
                assert_eq!(policy, "hold");
                assert_eq!(seed, 17);
                assert!(matches!(*source, GridError::Numerical { .. }));
            }
            other => panic!("expected evaluation error, got {other:?}"),
        }
    }

    #[test]
    fn test_comparison_improvement() {
        let harness = create_test_harness(50, 10);
        let seeds = harness.seeds(2);
        let generators: Arc<[Generator]> = harness.env().generators().to_vec().into();
        let mut policies: Vec<Box<dyn Policy>> =
            vec![Box::new(GreedyPolicy::new(generators)), Box::new(hold())];
        let comparison = harness.compare(&mut policies, 2, &seeds).unwrap();

        assert_eq!(comparison.reference, "greedy");
        assert_eq!(comparison.seeds, seeds);
        let greedy = comparison.result("greedy").unwrap().mean_cost;
        let hold_cost = comparison.result("hold").unwrap().mean_cost;
        let expected = (greedy - hold_cost) / greedy * 100.0;
        assert_eq!(comparison.improvement_pct("hold"), Some(expected));

        let report = comparison.report();
        assert!(report["greedy"].improvement_pct.is_none());
        assert_eq!(report["hold"].improvement_pct, Some(expected));
    }

    #[test]
    fn test_report_schema() {
        let harness = create_test_harness(50, 4);
        let mut policy = hold();
        let result = harness.evaluate(&mut policy, 1, &[5]).unwrap();
        let json = serde_json::to_value(result.report()).unwrap();
        for key in ["mean_cost", "mean_supply_gap", "cost_per_unit", "trajectory"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["trajectory"]["generator_output"][1][0], 25.0);
    }

    #[test]
    fn test_mean_std() {
        assert_eq!(mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), (5.0, 2.0));
        assert_eq!(mean_std(&[]), (0.0, 0.0));
    }
}
