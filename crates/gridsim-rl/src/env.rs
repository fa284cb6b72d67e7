//! Episode controller
//!
//! [`DispatchEnv`] owns one episode at a time: it picks a demand window on
//! `reset`, feeds actions through the [`DispatchSimulator`], scores every
//! transition with the [`RewardModel`] and records a [`Trajectory`]. It is
//! also the surface an external learner drives through `reset`/`step`.

use std::fmt;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use gridsim_core::generator::fleet_cost;
use gridsim_core::types::observation_dimension;
use gridsim_core::{
    Action, DemandSeries, DemandWindow, EnvironmentConfig, Generator, GridError, GridSimConfig,
    GridState, Observation, ObservationScale, Result, TimeEncoding, WindowSelection,
};

use crate::reward::{Reward, RewardComponents, RewardModel};
use crate::simulator::{DispatchSimulator, SimulatorStep, Violations};
use crate::trajectory::{StepRecord, Trajectory};

/// Lifecycle of an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeStatus {
    /// Constructed, never reset
    Init,
    Running,
    Terminated,
}

impl fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpisodeStatus::Init => write!(f, "init"),
            EpisodeStatus::Running => write!(f, "running"),
            EpisodeStatus::Terminated => write!(f, "terminated"),
        }
    }
}

/// Result of one [`DispatchEnv::step`]
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Observation for the next decision
    pub observation: Observation,
    pub reward: Reward,
    pub components: RewardComponents,
    pub supply: f64,
    pub demand: f64,
    pub violations: Violations,
    /// The episode has ended
    pub done: bool,
    /// Ended because the demand data ran out before the horizon
    pub truncated: bool,
}

/// Dispatch episode controller
#[derive(Debug, Clone)]
pub struct DispatchEnv {
    simulator: DispatchSimulator,
    reward_model: RewardModel,
    series: Arc<DemandSeries>,
    config: EnvironmentConfig,
    scale: ObservationScale,
    status: EpisodeStatus,
    state: GridState,
    window: Option<DemandWindow>,
    trajectory: Trajectory,
    seed: u64,
}

impl DispatchEnv {
    /// Build an environment from a validated configuration and a shared series.
    pub fn new(config: &GridSimConfig, series: Arc<DemandSeries>) -> Result<Self> {
        config.validate()?;
        if series.is_empty() {
            return Err(GridError::Data("demand series is empty".to_string()));
        }
        if let WindowSelection::Fixed { offset } = config.environment.window {
            if offset >= series.len() {
                return Err(GridError::Config(format!(
                    "fixed window offset {offset} is outside the {}-sample demand series",
                    series.len()
                )));
            }
        }

        let generators: Arc<[Generator]> = config.generators.clone().into();
        let simulator =
            DispatchSimulator::new(generators.clone(), config.environment.below_min_policy);
        let reward_model = RewardModel::new(generators, config.reward.clone());
        let state = simulator.initial_state(config.environment.initial_output);

        Ok(Self {
            simulator,
            reward_model,
            series,
            config: config.environment.clone(),
            scale: config.observation_scale(),
            status: EpisodeStatus::Init,
            state,
            window: None,
            trajectory: Trajectory::new(),
            seed: 0,
        })
    }

    /// Start a new episode and return its first observation.
    ///
    /// With randomized window selection the offset is drawn from a ChaCha8
    /// generator seeded with `seed`, so the same seed always picks the same
    /// window. A series shorter than the horizon yields a shortened window.
    pub fn reset(&mut self, seed: u64) -> Result<Observation> {
        let horizon = self.config.horizon;
        let offset = match self.config.window {
            WindowSelection::Fixed { offset } => offset,
            WindowSelection::Randomized => {
                let max_offset = self.series.len().saturating_sub(horizon);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.gen_range(0..=max_offset)
            }
        };

        let window = DemandWindow::new(self.series.clone(), offset, horizon)?;
        if window.len() < horizon {
            warn!(
                "Demand window at offset {} holds {} of {} steps, episode will be truncated",
                offset,
                window.len(),
                horizon
            );
        }

        let mut state = self.simulator.initial_state(self.config.initial_output);
        state.last_cost = fleet_cost(self.simulator.generators(), &state.outputs);

        debug!(
            "Episode reset: seed {}, offset {}, {} steps",
            seed,
            offset,
            window.len()
        );

        self.trajectory = Trajectory::with_capacity(window.len());
        self.window = Some(window);
        self.state = state;
        self.seed = seed;
        self.status = EpisodeStatus::Running;

        self.observation()
    }

    /// Apply one action.
    ///
    /// Any error ends the episode; the environment must be reset before it
    /// can be stepped again.
    pub fn step(&mut self, action: &Action) -> Result<StepOutcome> {
        if self.status != EpisodeStatus::Running {
            return Err(GridError::EpisodeNotRunning(self.status.to_string()));
        }
        match self.advance(action) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.status = EpisodeStatus::Terminated;
                Err(e)
            }
        }
    }

    fn advance(&mut self, action: &Action) -> Result<StepOutcome> {
        action.check_shape(self.simulator.num_generators())?;
        let window = self.window()?.clone();
        let horizon = self.config.horizon.min(window.len());
        let t = self.state.time_index;

        let dispatch = match self.simulator.step(&self.state, action, &window)? {
            SimulatorStep::Dispatched(dispatch) => dispatch,
            SimulatorStep::Exhausted => {
                self.terminate(true);
                let demand = self.state.last_demand;
                return Ok(StepOutcome {
                    observation: self.observation()?,
                    reward: 0.0,
                    components: RewardComponents::default(),
                    supply: self.state.last_supply,
                    demand,
                    violations: Violations::default(),
                    done: true,
                    truncated: true,
                });
            }
        };

        let (reward, components) =
            self.reward_model
                .score(&self.state, action, &dispatch.next_state, dispatch.demand)?;

        if dispatch.violations.clamped_actions > 0 {
            debug!(
                "Step {}: {} action values clamped into [-1, 1]",
                t, dispatch.violations.clamped_actions
            );
        }

        self.trajectory.push(StepRecord {
            t,
            timestamp: window.timestamp(t),
            demand: dispatch.demand,
            supply: dispatch.supply,
            cost: components.generation_cost,
            reward,
            components,
            outputs: dispatch.next_state.outputs.clone(),
            violations: dispatch.violations,
        });
        self.state = dispatch.next_state;

        let done = self.state.time_index >= horizon;
        let truncated = done && horizon < self.config.horizon;
        if done {
            self.terminate(truncated);
        }

        Ok(StepOutcome {
            observation: self.observation()?,
            reward,
            components,
            supply: dispatch.supply,
            demand: dispatch.demand,
            violations: dispatch.violations,
            done,
            truncated,
        })
    }

    fn terminate(&mut self, truncated: bool) {
        self.status = EpisodeStatus::Terminated;
        if truncated {
            self.trajectory.mark_truncated();
            warn!(
                "Episode (seed {}) truncated after {} of {} steps: demand data exhausted",
                self.seed,
                self.trajectory.len(),
                self.config.horizon
            );
        }
        let clamped = self.trajectory.violations().clamped_actions;
        if clamped > 0 {
            warn!(
                "Episode (seed {}) clamped {} out-of-range action values",
                self.seed, clamped
            );
        }
    }

    fn window(&self) -> Result<&DemandWindow> {
        self.window
            .as_ref()
            .ok_or_else(|| GridError::EpisodeNotRunning(self.status.to_string()))
    }

    /// Observation of the current state.
    ///
    /// After termination the demand fields repeat the last sample of the
    /// window.
    pub fn observation(&self) -> Result<Observation> {
        let window = self.window()?;
        let t = self.state.time_index;
        let last = window.len().saturating_sub(1);
        let demand_mw = window
            .demand(t)
            .or_else(|| window.demand(last))
            .unwrap_or(0.0);
        let (hour, weekday) = window.calendar(t);

        Ok(Observation {
            time_index: t,
            demand_mw,
            forecast_mw: window.forecast(t.min(last), self.config.forecast_steps),
            outputs_mw: self.state.outputs.clone(),
            time: TimeEncoding::new(hour, weekday),
            recent_cost: self.state.last_cost,
            scale: self.scale,
        })
    }

    pub fn status(&self) -> EpisodeStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == EpisodeStatus::Running
    }

    pub fn state(&self) -> &GridState {
        &self.state
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// Move the trajectory out, leaving an empty one behind.
    pub fn take_trajectory(&mut self) -> Trajectory {
        std::mem::take(&mut self.trajectory)
    }

    pub fn generators(&self) -> &[Generator] {
        self.simulator.generators()
    }

    pub fn num_generators(&self) -> usize {
        self.simulator.num_generators()
    }

    pub fn observation_dimension(&self) -> usize {
        observation_dimension(self.num_generators(), self.config.forecast_steps)
    }

    pub fn horizon(&self) -> usize {
        self.config.horizon
    }

    /// Offset of the current window into the series
    pub fn window_offset(&self) -> Option<usize> {
        self.window.as_ref().map(DemandWindow::offset)
    }

    pub fn step_hours(&self) -> f64 {
        self.series.step_hours()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn series(&self) -> &Arc<DemandSeries> {
        &self.series
    }
}
