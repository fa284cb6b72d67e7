//! Policy registry - name to constructor lookup

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use gridsim_core::types::observation_dimension;
use gridsim_core::{Generator, GridError, GridSimConfig, Result, RuleBasedConfig};

use crate::baseline::{GreedyPolicy, RandomPolicy, RuleBasedPolicy};
use crate::policy::{LinearPolicy, Policy};

/// Everything a constructor may need to build a policy
#[derive(Debug, Clone)]
pub struct PolicyContext {
    pub generators: Arc<[Generator]>,
    pub rule_based: RuleBasedConfig,
    /// Seed for stochastic policies; episodes reseed through `Policy::reset`
    pub seed: u64,
    /// Weights file for learned policies
    pub weights_path: Option<PathBuf>,
    pub observation_dim: usize,
}

impl PolicyContext {
    pub fn from_config(config: &GridSimConfig) -> Self {
        Self {
            generators: config.generators.clone().into(),
            rule_based: config.rule_based.clone(),
            seed: config.evaluation.base_seed,
            weights_path: None,
            observation_dim: observation_dimension(
                config.num_generators(),
                config.environment.forecast_steps,
            ),
        }
    }

    pub fn with_weights(mut self, path: Option<PathBuf>) -> Self {
        self.weights_path = path;
        self
    }
}

/// Builds a policy from a context
pub type PolicyConstructor =
    Arc<dyn Fn(&PolicyContext) -> Result<Box<dyn Policy>> + Send + Sync>;

/// Builds a fresh policy per call; used by the parallel harness
pub type PolicyFactory = Arc<dyn Fn() -> Result<Box<dyn Policy>> + Send + Sync>;

/// Registry of named policy constructors
pub struct PolicyRegistry {
    constructors: HashMap<String, PolicyConstructor>,
}

impl PolicyRegistry {
    /// Create a registry with the baseline and linear policies
    pub fn new() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
        };

        registry.register("greedy", |ctx| {
            Ok(Box::new(GreedyPolicy::new(ctx.generators.clone())) as Box<dyn Policy>)
        });
        registry.register("rule_based", |ctx| {
            Ok(Box::new(RuleBasedPolicy::new(&ctx.rule_based)?) as Box<dyn Policy>)
        });
        registry.register("random", |ctx| {
            Ok(Box::new(RandomPolicy::new(ctx.seed)) as Box<dyn Policy>)
        });
        registry.register("linear", |ctx| {
            let path = ctx.weights_path.as_deref().ok_or_else(|| {
                GridError::Config("policy 'linear' needs a weights file".to_string())
            })?;
            let policy = LinearPolicy::load(path)?;
            policy.check_dimensions(ctx.observation_dim, ctx.generators.len())?;
            Ok(Box::new(policy) as Box<dyn Policy>)
        });

        registry
    }

    /// Register (or replace) a constructor
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(&PolicyContext) -> Result<Box<dyn Policy>> + Send + Sync + 'static,
    {
        debug!("Registering policy: {}", name);
        self.constructors
            .insert(name.to_string(), Arc::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn constructor(&self, name: &str) -> Result<&PolicyConstructor> {
        self.constructors.get(name).ok_or_else(|| {
            GridError::Config(format!(
                "unknown policy '{name}' (available: {})",
                self.names().join(", ")
            ))
        })
    }

    /// Build one policy
    pub fn create(&self, name: &str, ctx: &PolicyContext) -> Result<Box<dyn Policy>> {
        (self.constructor(name)?)(ctx)
    }

    /// Factory producing a fresh policy per call
    pub fn factory(&self, name: &str, ctx: PolicyContext) -> Result<PolicyFactory> {
        let constructor = self.constructor(name)?.clone();
        Ok(Arc::new(move || constructor(&ctx)))
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
