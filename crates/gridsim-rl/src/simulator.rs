//! Dispatch simulator - applies ramp requests under physical limits

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use gridsim_core::generator::fleet_cost;
use gridsim_core::{
    Action, BelowMinPolicy, DemandWindow, Generator, GridError, GridState, InitialOutput, Result,
};

/// Constraint activity during one step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violations {
    /// Action entries outside [-1, 1] or non-finite
    pub clamped_actions: usize,
    /// Generators whose change was cut to the ramp rate
    pub ramp_limited: usize,
    /// Generators whose request exceeded capacity
    pub capacity_limited: usize,
    /// Generators whose request fell below min stable and were held there
    pub min_stable_limited: usize,
    /// Generators turned off this step
    pub shutdowns: usize,
}

impl Violations {
    pub fn total(&self) -> usize {
        self.clamped_actions
            + self.ramp_limited
            + self.capacity_limited
            + self.min_stable_limited
            + self.shutdowns
    }

    pub fn accumulate(&mut self, other: &Violations) {
        self.clamped_actions += other.clamped_actions;
        self.ramp_limited += other.ramp_limited;
        self.capacity_limited += other.capacity_limited;
        self.min_stable_limited += other.min_stable_limited;
        self.shutdowns += other.shutdowns;
    }
}

/// Result of applying one action
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub next_state: GridState,
    /// Exact sum of post-clamp outputs (MW)
    pub supply: f64,
    /// Demand the step was served against (MW)
    pub demand: f64,
    pub violations: Violations,
}

/// Outcome of [`DispatchSimulator::step`]
#[derive(Debug, Clone, PartialEq)]
pub enum SimulatorStep {
    Dispatched(Dispatch),
    /// The demand window has no sample for the current time index
    Exhausted,
}

/// Stateless dispatch physics over a fixed generator table.
///
/// The simulator never holds episode state; every call maps an input state
/// to a new one, so identical inputs always give identical outputs.
#[derive(Debug, Clone)]
pub struct DispatchSimulator {
    generators: Arc<[Generator]>,
    below_min: BelowMinPolicy,
}

impl DispatchSimulator {
    pub fn new(generators: Arc<[Generator]>, below_min: BelowMinPolicy) -> Self {
        Self {
            generators,
            below_min,
        }
    }

    pub fn generators(&self) -> &[Generator] {
        &self.generators
    }

    pub fn num_generators(&self) -> usize {
        self.generators.len()
    }

    /// Feasible starting state
    pub fn initial_state(&self, initial: InitialOutput) -> GridState {
        let outputs = self
            .generators
            .iter()
            .map(|g| match initial {
                InitialOutput::Midpoint => g.midpoint(),
                InitialOutput::FractionOfCapacity { fraction } => {
                    (g.capacity_mw * fraction).clamp(g.min_stable_mw, g.capacity_mw)
                }
            })
            .collect();
        GridState::new(outputs)
    }

    /// Apply an action against the demand at `state.time_index` in `window`.
    pub fn step(
        &self,
        state: &GridState,
        action: &Action,
        window: &DemandWindow,
    ) -> Result<SimulatorStep> {
        let Some(demand) = window.demand(state.time_index) else {
            return Ok(SimulatorStep::Exhausted);
        };
        let (next_state, supply, violations) = self.dispatch(state, action, demand)?;
        Ok(SimulatorStep::Dispatched(Dispatch {
            next_state,
            supply,
            demand,
            violations,
        }))
    }

    /// Core transition: `(state, action) -> (next_state, supply, violations)`.
    pub fn dispatch(
        &self,
        state: &GridState,
        action: &Action,
        demand: f64,
    ) -> Result<(GridState, f64, Violations)> {
        let n = self.generators.len();
        action.check_shape(n)?;
        if state.outputs.len() != n {
            return Err(GridError::DimensionMismatch {
                what: "grid state",
                expected: n,
                actual: state.outputs.len(),
            });
        }

        let (action, clamped) = action.clamped();
        let mut violations = Violations {
            clamped_actions: clamped,
            ..Violations::default()
        };

        let outputs: Vec<f64> = self
            .generators
            .iter()
            .zip(&state.outputs)
            .zip(action.values())
            .map(|((g, &current), &a)| self.next_output(g, current, a, &mut violations))
            .collect();

        let supply: f64 = outputs.iter().sum();
        let last_cost = fleet_cost(&self.generators, &outputs);

        let next_state = GridState {
            time_index: state.time_index + 1,
            outputs,
            last_demand: demand,
            last_supply: supply,
            last_cost,
        };
        Ok((next_state, supply, violations))
    }

    fn next_output(
        &self,
        g: &Generator,
        current: f64,
        a: f64,
        violations: &mut Violations,
    ) -> f64 {
        let ramp = g.ramp_rate_mw;
        let raw = current + a * ramp;

        if self.below_min == BelowMinPolicy::ShutDown && g.min_stable_mw > 0.0 {
            if current <= 0.0 {
                // Offline: restart only once the request reaches min stable.
                let start = a * ramp;
                return if start >= g.min_stable_mw {
                    start.min(g.capacity_mw)
                } else {
                    0.0
                };
            }
            if raw < g.min_stable_mw && current <= ramp {
                violations.shutdowns += 1;
                return 0.0;
            }
        }

        let requested = if raw > g.capacity_mw {
            violations.capacity_limited += 1;
            g.capacity_mw
        } else if raw < g.min_stable_mw {
            violations.min_stable_limited += 1;
            g.min_stable_mw
        } else {
            raw
        };

        let delta = requested - current;
        if delta > ramp {
            violations.ramp_limited += 1;
            current + ramp
        } else if delta < -ramp {
            violations.ramp_limited += 1;
            current - ramp
        } else {
            requested
        }
    }
}
