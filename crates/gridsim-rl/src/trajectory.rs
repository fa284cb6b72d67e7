//! Per-episode trajectory log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reward::{Reward, RewardComponents};
use crate::simulator::Violations;

/// One step of an episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub t: usize,
    pub timestamp: Option<DateTime<Utc>>,
    pub demand: f64,
    pub supply: f64,
    pub cost: f64,
    pub reward: Reward,
    pub components: RewardComponents,
    pub outputs: Vec<f64>,
    pub violations: Violations,
}

impl StepRecord {
    /// |supply - demand|
    pub fn gap(&self) -> f64 {
        (self.supply - self.demand).abs()
    }
}

/// Append-only log of an episode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    steps: Vec<StepRecord>,
    truncated: bool,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(horizon: usize) -> Self {
        Self {
            steps: Vec::with_capacity(horizon),
            truncated: false,
        }
    }

    pub fn push(&mut self, record: StepRecord) {
        self.steps.push(record);
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Mark that the demand data ran out before the horizon
    pub fn mark_truncated(&mut self) {
        self.truncated = true;
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn total_cost(&self) -> f64 {
        self.steps.iter().map(|s| s.cost).sum()
    }

    pub fn total_reward(&self) -> f64 {
        self.steps.iter().map(|s| s.reward).sum()
    }

    /// Mean |supply - demand| over the episode
    pub fn mean_gap(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        self.steps.iter().map(StepRecord::gap).sum::<f64>() / self.steps.len() as f64
    }

    /// Energy delivered (MWh) for a given step length in hours
    pub fn energy_delivered(&self, step_hours: f64) -> f64 {
        self.steps.iter().map(|s| s.supply).sum::<f64>() * step_hours
    }

    /// Fraction of steps whose gap is within `tolerance` of demand
    pub fn supply_match_rate(&self, tolerance: f64) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        let matched = self
            .steps
            .iter()
            .filter(|s| s.gap() <= tolerance * s.demand.abs())
            .count();
        matched as f64 / self.steps.len() as f64
    }

    pub fn violations(&self) -> Violations {
        let mut total = Violations::default();
        for step in &self.steps {
            total.accumulate(&step.violations);
        }
        total
    }

    /// Parallel-array projection consumed by reporting tools
    pub fn view(&self) -> TrajectoryView {
        let num_generators = self.steps.first().map_or(0, |s| s.outputs.len());
        let mut generator_output = vec![Vec::with_capacity(self.steps.len()); num_generators];
        for step in &self.steps {
            for (series, &output) in generator_output.iter_mut().zip(&step.outputs) {
                series.push(output);
            }
        }
        TrajectoryView {
            demand: self.steps.iter().map(|s| s.demand).collect(),
            supply: self.steps.iter().map(|s| s.supply).collect(),
            cost: self.steps.iter().map(|s| s.cost).collect(),
            generator_output,
            truncated: self.truncated,
        }
    }
}

/// Trajectory as parallel arrays; `generator_output[g][t]`.
///
/// Field names are relied on by downstream visualization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryView {
    pub demand: Vec<f64>,
    pub supply: Vec<f64>,
    pub cost: Vec<f64>,
    pub generator_output: Vec<Vec<f64>>,
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(t: usize, demand: f64, outputs: Vec<f64>, cost: f64) -> StepRecord {
        StepRecord {
            t,
            timestamp: None,
            demand,
            supply: outputs.iter().sum(),
            cost,
            reward: -cost,
            components: RewardComponents::default(),
            outputs,
            violations: Violations::default(),
        }
    }

    fn create_test_trajectory() -> Trajectory {
        let mut trajectory = Trajectory::new();
        trajectory.push(record(0, 100.0, vec![40.0, 50.0], 900.0));
        trajectory.push(record(1, 100.0, vec![50.0, 50.0], 1000.0));
        trajectory.push(record(2, 100.0, vec![60.0, 50.0], 1100.0));
        trajectory
    }

    #[test]
    fn test_totals() {
        let trajectory = create_test_trajectory();
        assert_eq!(trajectory.len(), 3);
        assert_eq!(trajectory.total_cost(), 3000.0);
        assert_eq!(trajectory.total_reward(), -3000.0);
        assert_eq!(trajectory.mean_gap(), 20.0 / 3.0);
        assert_eq!(trajectory.energy_delivered(1.0), 300.0);
        assert_eq!(trajectory.energy_delivered(0.5), 150.0);
    }

    #[test]
    fn test_supply_match_rate() {
        let trajectory = create_test_trajectory();
        assert_eq!(trajectory.supply_match_rate(0.0), 1.0 / 3.0);
        assert_eq!(trajectory.supply_match_rate(0.1), 1.0);
        assert_eq!(Trajectory::new().supply_match_rate(0.1), 0.0);
    }

    #[test]
    fn test_view_is_parallel_arrays() {
        let view = create_test_trajectory().view();
        assert_eq!(view.demand, vec![100.0; 3]);
        assert_eq!(view.supply, vec![90.0, 100.0, 110.0]);
        assert_eq!(view.generator_output.len(), 2);
        assert_eq!(view.generator_output[0], vec![40.0, 50.0, 60.0]);
        assert_eq!(view.generator_output[1], vec![50.0, 50.0, 50.0]);
    }

    #[test]
    fn test_view_field_names() {
        let json = serde_json::to_value(create_test_trajectory().view()).unwrap();
        for key in ["demand", "supply", "cost", "generator_output"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_truncation_flag() {
        let mut trajectory = Trajectory::with_capacity(10);
        assert!(!trajectory.truncated());
        trajectory.mark_truncated();
        assert!(trajectory.truncated());
        assert!(trajectory.view().truncated);
    }
}
