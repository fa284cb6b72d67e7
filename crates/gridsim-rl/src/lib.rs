//! gridsim RL - dispatch environment, reward model, policies and evaluation
//!
//! This crate provides the episode environment an external learner drives,
//! the baseline comparator policies and the harness that scores any policy
//! against them under identical, reproducible conditions.

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
#![allow(clippy::cast_lossless)]
#![allow(clippy::float_cmp)]
#![allow(clippy::similar_names)]

pub mod baseline;
pub mod env;
pub mod evaluation;
pub mod policy;
pub mod registry;
pub mod reward;
pub mod simulator;
pub mod trajectory;

pub use baseline::{GreedyPolicy, RandomPolicy, RuleBasedPolicy};
pub use env::{DispatchEnv, EpisodeStatus, StepOutcome};
pub use evaluation::{
    run_episode, CancelToken, Comparison, EpisodeSummary, EvaluationHarness, EvaluationResult,
    PolicyReport, SeedSequence,
};
pub use policy::{FnPolicy, LinearPolicy, LinearWeights, Policy, PolicyKind};
pub use registry::{PolicyContext, PolicyFactory, PolicyRegistry};
pub use reward::{Reward, RewardComponents, RewardModel};
pub use simulator::{Dispatch, DispatchSimulator, SimulatorStep, Violations};
pub use trajectory::{StepRecord, Trajectory, TrajectoryView};
