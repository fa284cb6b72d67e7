//! State, Action, and Observation types shared by the simulator and policies

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};

/// Lower bound of every action dimension
pub const ACTION_MIN: f64 = -1.0;
/// Upper bound of every action dimension
pub const ACTION_MAX: f64 = 1.0;

/// Number of calendar features (hour sin/cos, weekday sin/cos)
pub const TIME_FEATURES: usize = 4;

/// Grid state owned by one episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridState {
    /// Episode step index
    pub time_index: usize,

    /// Output per generator (MW), in generator-table order
    pub outputs: Vec<f64>,

    /// Demand realized at the previous step (MW)
    pub last_demand: f64,

    /// Total supply at the previous step (MW)
    pub last_supply: f64,

    /// Generation cost at the previous step
    pub last_cost: f64,
}

impl GridState {
    pub fn new(outputs: Vec<f64>) -> Self {
        let last_supply = outputs.iter().sum();
        Self {
            time_index: 0,
            outputs,
            last_demand: 0.0,
            last_supply,
            last_cost: 0.0,
        }
    }

    /// Exact sum of generator outputs
    pub fn total_supply(&self) -> f64 {
        self.outputs.iter().sum()
    }

    pub fn num_generators(&self) -> usize {
        self.outputs.len()
    }
}

/// Fractional ramp request per generator, nominally in `[-1, 1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action(pub Vec<f64>);

impl Action {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// The all-zero (hold) action
    pub fn zeros(num_generators: usize) -> Self {
        Self(vec![0.0; num_generators])
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check the action has one entry per generator.
    pub fn check_shape(&self, num_generators: usize) -> Result<()> {
        if self.0.len() != num_generators {
            return Err(GridError::DimensionMismatch {
                what: "action",
                expected: num_generators,
                actual: self.0.len(),
            });
        }
        Ok(())
    }

    /// Clamp every entry into the action bounds, mapping non-finite entries
    /// to zero. Returns the clamped action and the number of entries changed.
    pub fn clamped(&self) -> (Action, usize) {
        let mut violations = 0;
        let values = self
            .0
            .iter()
            .map(|&v| {
                let c = if v.is_finite() {
                    v.clamp(ACTION_MIN, ACTION_MAX)
                } else {
                    0.0
                };
                if c != v {
                    violations += 1;
                }
                c
            })
            .collect();
        (Action(values), violations)
    }
}

impl From<Vec<f64>> for Action {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Cyclic calendar encoding
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeEncoding {
    pub hour_of_day: u32,
    /// Monday = 0
    pub day_of_week: u32,
}

impl TimeEncoding {
    pub fn new(hour_of_day: u32, day_of_week: u32) -> Self {
        Self {
            hour_of_day,
            day_of_week,
        }
    }

    /// `[hour sin, hour cos, weekday sin, weekday cos]`
    pub fn features(&self) -> [f64; TIME_FEATURES] {
        let hour = 2.0 * PI * f64::from(self.hour_of_day) / 24.0;
        let day = 2.0 * PI * f64::from(self.day_of_week) / 7.0;
        [hour.sin(), hour.cos(), day.sin(), day.cos()]
    }

    pub fn is_weekend(&self) -> bool {
        self.day_of_week >= 5
    }
}

/// Scales applied when flattening an observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationScale {
    pub demand_mw: f64,
    pub output_mw: f64,
    pub cost: f64,
}

impl Default for ObservationScale {
    fn default() -> Self {
        Self {
            demand_mw: 10_000.0,
            output_mw: 1.0,
            cost: 10_000.0,
        }
    }
}

/// What a policy sees before acting.
///
/// `demand_mw` is the demand the next action will be scored against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub time_index: usize,
    pub demand_mw: f64,
    pub forecast_mw: Vec<f64>,
    pub outputs_mw: Vec<f64>,
    pub time: TimeEncoding,
    pub recent_cost: f64,
    pub scale: ObservationScale,
}

impl Observation {
    /// Current total supply
    pub fn supply_mw(&self) -> f64 {
        self.outputs_mw.iter().sum()
    }

    /// Signed gap the next action should close (positive = shortage)
    pub fn gap_mw(&self) -> f64 {
        self.demand_mw - self.supply_mw()
    }

    /// Flatten to a fixed-length vector:
    /// `[demand, forecast.., outputs.., hour sin, hour cos, day sin, day cos, cost]`
    pub fn features(&self) -> Vec<f64> {
        let mut features = Vec::with_capacity(self.dimension());
        features.push(self.demand_mw / self.scale.demand_mw);
        features.extend(self.forecast_mw.iter().map(|f| f / self.scale.demand_mw));
        features.extend(self.outputs_mw.iter().map(|o| o / self.scale.output_mw));
        features.extend(self.time.features());
        features.push(self.recent_cost / self.scale.cost);
        features
    }

    pub fn dimension(&self) -> usize {
        observation_dimension(self.outputs_mw.len(), self.forecast_mw.len())
    }
}

/// Observation length for a generator count and forecast length
pub fn observation_dimension(num_generators: usize, forecast_steps: usize) -> usize {
    1 + forecast_steps + num_generators + TIME_FEATURES + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_observation() -> Observation {
        Observation {
            time_index: 3,
            demand_mw: 600.0,
            forecast_mw: vec![610.0, 620.0, 630.0, 640.0],
            outputs_mw: vec![100.0, 200.0, 250.0],
            time: TimeEncoding::new(6, 0),
            recent_cost: 5_000.0,
            scale: ObservationScale {
                demand_mw: 1_000.0,
                output_mw: 250.0,
                cost: 10_000.0,
            },
        }
    }

    #[test]
    fn test_observation_features() {
        let obs = create_test_observation();
        let features = obs.features();

        assert_eq!(features.len(), obs.dimension());
        assert_eq!(features.len(), 1 + 4 + 3 + 4 + 1);
        assert_eq!(features[0], 0.6);
        assert_eq!(features[5], 0.4);
        assert!((features[8] - 1.0).abs() < 1e-12); // sin(pi/2)
        assert_eq!(*features.last().unwrap(), 0.5);
    }

    #[test]
    fn test_gap() {
        let obs = create_test_observation();
        assert_eq!(obs.supply_mw(), 550.0);
        assert_eq!(obs.gap_mw(), 50.0);
    }

    #[test]
    fn test_action_clamped_counts_violations() {
        let (clamped, violations) = Action::new(vec![0.5, 2.0, -3.0, f64::NAN]).clamped();
        assert_eq!(clamped.values(), &[0.5, 1.0, -1.0, 0.0]);
        assert_eq!(violations, 3);
    }

    #[test]
    fn test_action_shape() {
        assert!(Action::zeros(5).check_shape(5).is_ok());
        assert!(matches!(
            Action::zeros(4).check_shape(5),
            Err(GridError::DimensionMismatch {
                expected: 5,
                actual: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_grid_state_supply() {
        let state = GridState::new(vec![10.0, 20.5]);
        assert_eq!(state.total_supply(), 30.5);
        assert_eq!(state.last_supply, 30.5);
        assert_eq!(state.num_generators(), 2);
    }

    #[test]
    fn test_weekend() {
        assert!(TimeEncoding::new(0, 5).is_weekend());
        assert!(!TimeEncoding::new(0, 4).is_weekend());
    }

    #[test]
    fn test_observation_serialization() {
        let obs = create_test_observation();
        let json = serde_json::to_string(&obs).unwrap();
        let parsed: Observation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, obs);
    }
}
