//! Reward/cost model - a pure function of a transition

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use gridsim_core::{Action, Generator, GridError, GridState, Result, RewardConfig};

/// Scalar reward value
pub type Reward = f64;

/// Breakdown of one step's reward
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardComponents {
    /// Sum of per-generator cost curves at the new outputs
    pub generation_cost: f64,
    /// Penalty on |supply - demand|
    pub reliability_penalty: f64,
    /// Penalty on total output churn
    pub stability_penalty: f64,
    /// Credit for a cleaner-than-reference output mix (negative when dirtier)
    pub carbon_credit: f64,
    /// Signed supply minus demand (MW)
    pub imbalance_mw: f64,
}

impl RewardComponents {
    pub fn supply_gap(&self) -> f64 {
        self.imbalance_mw.abs()
    }
}

/// Deterministic, side-effect-free scorer.
#[derive(Debug, Clone)]
pub struct RewardModel {
    generators: Arc<[Generator]>,
    config: RewardConfig,
}

impl RewardModel {
    pub fn new(generators: Arc<[Generator]>, config: RewardConfig) -> Self {
        Self { generators, config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Score the transition `prev_state --action--> next_state` against `demand`.
    ///
    /// The action itself does not enter the reward; the realized change in
    /// output does. Non-finite results are reported with the step index
    /// (`prev_state.time_index`) and, for cost terms, the generator index.
    pub fn score(
        &self,
        prev_state: &GridState,
        _action: &Action,
        next_state: &GridState,
        demand: f64,
    ) -> Result<(Reward, RewardComponents)> {
        let n = self.generators.len();
        for (what, len) in [
            ("previous state", prev_state.outputs.len()),
            ("next state", next_state.outputs.len()),
        ] {
            if len != n {
                return Err(GridError::DimensionMismatch {
                    what,
                    expected: n,
                    actual: len,
                });
            }
        }

        let step = prev_state.time_index;
        let mut generation_cost = 0.0;
        let mut churn = 0.0;
        let mut carbon_credit = 0.0;

        for (g, generator) in self.generators.iter().enumerate() {
            let output = next_state.outputs[g];
            let cost = generator.cost.evaluate(output);
            if !cost.is_finite() {
                return Err(GridError::Numerical {
                    quantity: "generation cost",
                    value: cost,
                    step,
                    generator: Some(g),
                });
            }
            generation_cost += cost;
            churn += (output - prev_state.outputs[g]).abs();
            carbon_credit +=
                (self.config.reference_intensity - generator.emissions_t_per_mwh) * output;
        }

        let supply: f64 = next_state.outputs.iter().sum();
        let imbalance = supply - demand;

        let components = RewardComponents {
            generation_cost,
            reliability_penalty: self.reliability_penalty(imbalance, demand),
            stability_penalty: churn,
            carbon_credit,
            imbalance_mw: imbalance,
        };
        let reward = self.combine(&components);
        if !reward.is_finite() {
            return Err(GridError::Numerical {
                quantity: "reward",
                value: reward,
                step,
                generator: None,
            });
        }
        Ok((reward, components))
    }

    /// `-(cost + λr·reliability + λs·stability - λc·carbon)`
    pub fn combine(&self, c: &RewardComponents) -> Reward {
        -(c.generation_cost
            + self.config.reliability_weight * c.reliability_penalty
            + self.config.stability_weight * c.stability_penalty
            - self.config.carbon_weight * c.carbon_credit)
    }

    /// Asymmetric linear penalty with an extra term once the mismatch
    /// exceeds `severe_fraction` of demand.
    pub fn reliability_penalty(&self, imbalance: f64, demand: f64) -> f64 {
        let gap = imbalance.abs();
        let base = if imbalance < 0.0 {
            self.config.shortage_weight * gap
        } else {
            self.config.oversupply_weight * gap
        };
        let severe = if gap > self.config.severe_fraction * demand.abs() {
            self.config.severe_multiplier * gap
        } else {
            0.0
        };
        base + severe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsim_core::CostCurve;

    fn model(config: RewardConfig) -> RewardModel {
        let generators: Vec<Generator> = vec![
            Generator::new("a", 100.0, 0.0, 50.0, CostCurve::Linear { marginal: 10.0 })
                .with_emissions(1.0),
            Generator::new("b", 100.0, 0.0, 50.0, CostCurve::Linear { marginal: 20.0 }),
        ];
        RewardModel::new(generators.into(), config)
    }

    fn state(outputs: Vec<f64>, t: usize) -> GridState {
        let mut s = GridState::new(outputs);
        s.time_index = t;
        s
    }

    #[test]
    fn test_components() {
        let m = model(RewardConfig::default());
        let prev = state(vec![50.0, 50.0], 0);
        let next = state(vec![60.0, 40.0], 1);
        let (reward, c) = m.score(&prev, &Action::zeros(2), &next, 100.0).unwrap();

        assert_eq!(c.generation_cost, 600.0 + 800.0);
        assert_eq!(c.stability_penalty, 20.0);
        assert_eq!(c.reliability_penalty, 0.0);
        assert_eq!(c.carbon_credit, -60.0);
        assert_eq!(reward, -(1400.0 + 0.1 * 20.0));
    }

    #[test]
    fn test_shortage_and_oversupply_are_penalized() {
        let config = RewardConfig {
            shortage_weight: 2.0,
            oversupply_weight: 1.0,
            severe_fraction: 1.0,
            ..RewardConfig::default()
        };
        let m = model(config);
        assert_eq!(m.reliability_penalty(-10.0, 100.0), 20.0);
        assert_eq!(m.reliability_penalty(10.0, 100.0), 10.0);
        assert!(m.reliability_penalty(-20.0, 100.0) > m.reliability_penalty(-10.0, 100.0));
    }

    #[test]
    fn test_severe_mismatch_term() {
        let m = model(RewardConfig::default());
        // 5 MW on 100 MW demand is within 10%
        assert_eq!(m.reliability_penalty(5.0, 100.0), 5.0);
        // 20 MW is severe: 20 + 2 * 20
        assert_eq!(m.reliability_penalty(-20.0, 100.0), 60.0);
    }

    #[test]
    fn test_carbon_weight_rewards_clean_mix() {
        let config = RewardConfig {
            carbon_weight: 1.0,
            reference_intensity: 0.5,
            ..RewardConfig::default()
        };
        let m = model(config);
        let prev = state(vec![50.0, 50.0], 0);
        let dirty = state(vec![100.0, 0.0], 1);
        let clean = state(vec![0.0, 100.0], 1);

        let (_, dirty_c) = m.score(&prev, &Action::zeros(2), &dirty, 100.0).unwrap();
        let (_, clean_c) = m.score(&prev, &Action::zeros(2), &clean, 100.0).unwrap();
        assert_eq!(dirty_c.carbon_credit, -50.0);
        assert_eq!(clean_c.carbon_credit, 50.0);
    }

    #[test]
    fn test_deterministic() {
        let m = model(RewardConfig::default());
        let prev = state(vec![33.3, 71.9], 4);
        let next = state(vec![41.7, 60.2], 5);
        let a = m.score(&prev, &Action::zeros(2), &next, 97.5).unwrap();
        let b = m.score(&prev, &Action::zeros(2), &next, 97.5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_finite_cost_reports_generator_and_step() {
        let generators: Vec<Generator> = vec![
            Generator::new("ok", 100.0, 0.0, 50.0, CostCurve::Linear { marginal: 1.0 }),
            Generator::new(
                "overflow",
                100.0,
                0.0,
                50.0,
                CostCurve::Quadratic {
                    a: 0.0,
                    b: 0.0,
                    c: f64::MAX,
                },
            ),
        ];
        let m = RewardModel::new(generators.into(), RewardConfig::default());
        let prev = state(vec![10.0, 10.0], 7);
        let next = state(vec![10.0, 10.0], 8);

        match m.score(&prev, &Action::zeros(2), &next, 20.0) {
            Err(GridError::Numerical {
                step, generator, ..
            }) => {
                assert_eq!(step, 7);
                assert_eq!(generator, Some(1));
            }
            other => panic!("expected numerical error, got {other:?}"),
        }
    }
}
