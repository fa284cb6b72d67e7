//! gridsim Core - generators, demand series, shared types and configuration
//!
//! This crate provides the foundational types used by the dispatch
//! simulator, the policies and the evaluation harness.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::float_cmp)]

pub mod config;
pub mod demand;
pub mod error;
pub mod generator;
pub mod types;

pub use config::{
    BelowMinPolicy, DemandConfig, DemandSplit, EnvironmentConfig, EvaluationConfig,
    GridSimConfig, InitialOutput, LoggingConfig, RewardConfig, RuleBasedConfig, WindowSelection,
};
pub use demand::{DemandPoint, DemandSeries, DemandStats, DemandWindow, SyntheticDemand};
pub use error::{GridError, Result};
pub use generator::{CostCurve, CostSegment, Generator};
pub use types::{Action, GridState, Observation, ObservationScale, TimeEncoding};
