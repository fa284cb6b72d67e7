//! Error types for gridsim

use thiserror::Error;

/// Main error type for gridsim
#[derive(Error, Debug)]
pub enum GridError {
    /// Malformed generator table, reward weights or environment settings.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An action or observation does not match the configured generator count.
    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The demand series cannot supply a single step for the requested window.
    #[error("Demand series exhausted: requested {requested} steps from offset {offset}, {available} available")]
    DataExhaustion {
        offset: usize,
        requested: usize,
        available: usize,
    },

    /// A cost or reward computation produced NaN or an infinity.
    #[error("Non-finite {quantity} ({value}) at step {step}{}", .generator.map(|g| format!(", generator {g}")).unwrap_or_default())]
    Numerical {
        quantity: &'static str,
        value: f64,
        step: usize,
        generator: Option<usize>,
    },

    #[error("Episode is not running (status: {0})")]
    EpisodeNotRunning(String),

    #[error("Evaluation cancelled before any episode completed")]
    Cancelled,

    #[error("Demand data error: {0}")]
    Data(String),

    /// A parallel evaluation worker panicked or was shut down.
    #[error("Evaluation worker failed: {0}")]
    Worker(String),

    /// Context wrapper used by the evaluation harness.
    #[error("Evaluation of policy '{policy}' failed on seed {seed}: {source}")]
    Evaluation {
        policy: String,
        seed: u64,
        #[source]
        source: Box<GridError>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for gridsim operations
pub type Result<T> = std::result::Result<T, GridError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numerical_message_includes_generator() {
        let err = GridError::Numerical {
            quantity: "generation cost",
            value: f64::NAN,
            step: 12,
            generator: Some(3),
        };
        let msg = err.to_string();
        assert!(msg.contains("step 12"));
        assert!(msg.contains("generator 3"));
    }

    #[test]
    fn test_numerical_message_without_generator() {
        let err = GridError::Numerical {
            quantity: "reward",
            value: f64::INFINITY,
            step: 0,
            generator: None,
        };
        assert!(!err.to_string().contains("generator"));
    }
}
