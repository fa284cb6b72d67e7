//! Policy contract and learned-policy adapters

use std::fmt;
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use gridsim_core::{Action, GridError, Observation, Result};

/// Family a policy belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Learned,
    Greedy,
    RuleBased,
    Random,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::Learned => write!(f, "learned"),
            PolicyKind::Greedy => write!(f, "greedy"),
            PolicyKind::RuleBased => write!(f, "rule_based"),
            PolicyKind::Random => write!(f, "random"),
        }
    }
}

/// Anything that maps an observation to an action
pub trait Policy: Send {
    /// Policy name, used as the key in evaluation reports
    fn name(&self) -> &str;

    fn kind(&self) -> PolicyKind;

    /// Called at the start of every episode with the episode seed
    fn reset(&mut self, _seed: u64) {}

    /// Choose an action for the observation
    fn act(&mut self, observation: &Observation) -> Action;

    /// Check the policy can act in an environment of this shape
    fn check_dimensions(&self, _observation_dim: usize, _num_generators: usize) -> Result<()> {
        Ok(())
    }
}

/// On-disk format of [`LinearPolicy`] weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearWeights {
    /// One row per generator, one column per observation feature
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

/// `tanh(W x + b)` over the observation features
#[derive(Debug, Clone)]
pub struct LinearPolicy {
    name: String,
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl LinearPolicy {
    pub fn new(name: impl Into<String>, weights: Array2<f64>, bias: Array1<f64>) -> Result<Self> {
        if weights.nrows() != bias.len() {
            return Err(GridError::DimensionMismatch {
                what: "linear policy bias",
                expected: weights.nrows(),
                actual: bias.len(),
            });
        }
        if weights.iter().chain(bias.iter()).any(|v| !v.is_finite()) {
            return Err(GridError::Config(
                "linear policy parameters must be finite".to_string(),
            ));
        }
        Ok(Self {
            name: name.into(),
            weights,
            bias,
        })
    }

    /// All-zero parameters: always holds output steady.
    pub fn zeros(num_generators: usize, observation_dim: usize) -> Self {
        Self {
            name: "linear".to_string(),
            weights: Array2::zeros((num_generators, observation_dim)),
            bias: Array1::zeros(num_generators),
        }
    }

    pub fn from_weights(name: impl Into<String>, weights: LinearWeights) -> Result<Self> {
        let rows = weights.weights.len();
        let cols = weights.weights.first().map_or(0, Vec::len);
        if let Some(row) = weights.weights.iter().find(|r| r.len() != cols) {
            return Err(GridError::DimensionMismatch {
                what: "linear policy weight row",
                expected: cols,
                actual: row.len(),
            });
        }
        let flat: Vec<f64> = weights.weights.into_iter().flatten().collect();
        let matrix = Array2::from_shape_vec((rows, cols), flat)
            .map_err(|e| GridError::Config(format!("invalid weight matrix: {e}")))?;
        Self::new(name, matrix, Array1::from(weights.bias))
    }

    /// Load weights from a JSON file of the form `{ "weights": [[..]], "bias": [..] }`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let weights: LinearWeights = serde_json::from_str(&contents)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("linear")
            .to_string();
        let policy = Self::from_weights(name, weights)?;
        info!(
            "Loaded linear policy '{}' ({} x {}) from {:?}",
            policy.name,
            policy.weights.nrows(),
            policy.weights.ncols(),
            path
        );
        Ok(policy)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.to_weights())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn to_weights(&self) -> LinearWeights {
        LinearWeights {
            weights: self.weights.outer_iter().map(|row| row.to_vec()).collect(),
            bias: self.bias.to_vec(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Policy for LinearPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Learned
    }

    fn act(&mut self, observation: &Observation) -> Action {
        let features = Array1::from(observation.features());
        if features.len() != self.weights.ncols() {
            // The environment rejects the empty action as a dimension mismatch.
            warn!(
                "Linear policy '{}' expects {} features, got {}",
                self.name,
                self.weights.ncols(),
                features.len()
            );
            return Action::new(Vec::new());
        }
        let output = (self.weights.dot(&features) + &self.bias).mapv(f64::tanh);
        Action::new(output.to_vec())
    }

    fn check_dimensions(&self, observation_dim: usize, num_generators: usize) -> Result<()> {
        if self.weights.ncols() != observation_dim {
            return Err(GridError::DimensionMismatch {
                what: "linear policy input",
                expected: observation_dim,
                actual: self.weights.ncols(),
            });
        }
        if self.weights.nrows() != num_generators {
            return Err(GridError::DimensionMismatch {
                what: "linear policy output",
                expected: num_generators,
                actual: self.weights.nrows(),
            });
        }
        Ok(())
    }
}

/// Wraps a closure supplied by an external learner
pub struct FnPolicy<F> {
    name: String,
    f: F,
}

impl<F> FnPolicy<F>
where
    F: FnMut(&Observation) -> Action + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Policy for FnPolicy<F>
where
    F: FnMut(&Observation) -> Action + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Learned
    }

    fn act(&mut self, observation: &Observation) -> Action {
        (self.f)(observation)
    }
}

impl<F> fmt::Debug for FnPolicy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPolicy").field("name", &self.name).finish()
    }
}
