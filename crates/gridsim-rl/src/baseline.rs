//! Baseline comparator policies

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use gridsim_core::{Action, Generator, GridError, Observation, Result, RuleBasedConfig};

use crate::policy::{Policy, PolicyKind};

/// Gaps smaller than this (MW) are treated as closed
const GAP_EPSILON_MW: f64 = 1e-9;

/// Marginal costs closer than this are treated as tied
const MARGINAL_TIE: f64 = 1e-9;

/// Closes the instantaneous supply gap as fast as ramp limits allow, in
/// merit order.
///
/// Raising visits the cheapest marginal cost first, lowering the most
/// expensive first. Generators with tied marginal cost share their part of
/// the gap in proportion to their remaining headroom.
#[derive(Debug, Clone)]
pub struct GreedyPolicy {
    generators: Arc<[Generator]>,
}

impl GreedyPolicy {
    pub fn new(generators: Arc<[Generator]>) -> Self {
        Self { generators }
    }

    fn headroom(g: &Generator, output: f64, raising: bool) -> f64 {
        let room = if raising {
            g.capacity_mw - output
        } else {
            output - g.min_stable_mw
        };
        room.min(g.ramp_rate_mw).max(0.0)
    }
}

impl Policy for GreedyPolicy {
    fn name(&self) -> &str {
        "greedy"
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Greedy
    }

    fn act(&mut self, observation: &Observation) -> Action {
        let n = self.generators.len();
        let outputs = &observation.outputs_mw;
        let mut values = vec![0.0; n];

        let gap = observation.gap_mw();
        if gap.abs() <= GAP_EPSILON_MW || outputs.len() != n {
            return Action::new(values);
        }
        let raising = gap > 0.0;

        let marginals: Vec<f64> = self
            .generators
            .iter()
            .zip(outputs)
            .map(|(g, &p)| g.cost.marginal(p))
            .collect();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            let ord = marginals[a].total_cmp(&marginals[b]);
            if raising {
                ord
            } else {
                ord.reverse()
            }
        });

        let mut remaining = gap.abs();
        let mut i = 0;
        while i < order.len() && remaining > GAP_EPSILON_MW {
            let lead = marginals[order[i]];
            let mut j = i;
            while j < order.len() && (marginals[order[j]] - lead).abs() <= MARGINAL_TIE {
                j += 1;
            }
            let group = &order[i..j];

            let rooms: Vec<f64> = group
                .iter()
                .map(|&g| Self::headroom(&self.generators[g], outputs[g], raising))
                .collect();
            let total_room: f64 = rooms.iter().sum();
            if total_room > 0.0 {
                let take = remaining.min(total_room);
                for (&g, room) in group.iter().zip(&rooms) {
                    let delta = take * room / total_room;
                    let a = delta / self.generators[g].ramp_rate_mw;
                    values[g] = if raising { a } else { -a };
                }
                remaining -= take;
            }
            i = j;
        }

        Action::new(values)
    }
}

/// Fixed 7 x 24 adjustment table keyed by weekday and hour, applied to
/// every generator regardless of the live gap.
#[derive(Debug, Clone)]
pub struct RuleBasedPolicy {
    table: [[f64; 24]; 7],
}

impl RuleBasedPolicy {
    pub fn new(config: &RuleBasedConfig) -> Result<Self> {
        let weekday = Self::profile("weekday_profile", &config.weekday_profile)?;
        let weekend = Self::profile("weekend_profile", &config.weekend_profile)?;
        let mut table = [[0.0; 24]; 7];
        for (day, row) in table.iter_mut().enumerate() {
            *row = if day >= 5 { weekend } else { weekday };
        }
        Ok(Self { table })
    }

    fn profile(name: &str, values: &[f64]) -> Result<[f64; 24]> {
        let profile: [f64; 24] = values.try_into().map_err(|_| {
            GridError::Config(format!(
                "{name} needs 24 hourly values, got {}",
                values.len()
            ))
        })?;
        Ok(profile.map(|v| v.clamp(-1.0, 1.0)))
    }

    /// Adjustment for a weekday (Monday = 0) and hour
    pub fn adjustment(&self, day_of_week: u32, hour: u32) -> f64 {
        self.table[(day_of_week % 7) as usize][(hour % 24) as usize]
    }
}

impl Default for RuleBasedPolicy {
    fn default() -> Self {
        Self::new(&RuleBasedConfig::default()).unwrap_or(Self {
            table: [[0.0; 24]; 7],
        })
    }
}

impl Policy for RuleBasedPolicy {
    fn name(&self) -> &str {
        "rule_based"
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::RuleBased
    }

    fn act(&mut self, observation: &Observation) -> Action {
        let value = self.adjustment(observation.time.day_of_week, observation.time.hour_of_day);
        Action::new(vec![value; observation.outputs_mw.len()])
    }
}

/// Uniform random actions in `[-1, 1]`, reseeded every episode
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    rng: ChaCha8Rng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn name(&self) -> &str {
        "random"
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Random
    }

    fn reset(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    fn act(&mut self, observation: &Observation) -> Action {
        let values = (0..observation.outputs_mw.len())
            .map(|_| self.rng.gen_range(-1.0..=1.0))
            .collect();
        Action::new(values)
    }
}
