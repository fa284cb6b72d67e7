//! Configuration loading for gridsim
//!
//! Sources, lowest precedence first: built-in defaults, the config file
//! (`$GRIDSIM_CONFIG`, `./gridsim.toml`, `~/.config/gridsim/gridsim.toml`),
//! then `GRIDSIM__SECTION__KEY` environment variables.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};

use crate::demand::{DemandSeries, SyntheticDemand};
use crate::error::GridError;
use crate::generator::{validate_fleet, CostCurve, CostSegment, Generator};
use crate::types::ObservationScale;

/// Full configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSimConfig {
    pub environment: EnvironmentConfig,
    pub generators: Vec<Generator>,
    pub reward: RewardConfig,
    pub evaluation: EvaluationConfig,
    pub rule_based: RuleBasedConfig,
    pub demand: DemandConfig,
    pub logging: LoggingConfig,
}

/// How an episode picks its demand window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WindowSelection {
    /// Offset drawn from the episode seed
    Randomized,
    /// Always start at the same offset
    Fixed { offset: usize },
}

/// What happens when a generator is asked to go below its minimum stable output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BelowMinPolicy {
    /// Clamp the request up to the minimum stable output
    ClampToMin,
    /// Turn the unit off (0 MW) when the drop is within its ramp limit
    ShutDown,
}

/// Output of every generator right after reset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InitialOutput {
    Midpoint,
    FractionOfCapacity { fraction: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Steps per episode
    pub horizon: usize,
    /// Demand forecast length in the observation
    pub forecast_steps: usize,
    pub window: WindowSelection,
    pub below_min_policy: BelowMinPolicy,
    pub initial_output: InitialOutput,
    /// Divisor for demand and forecast features
    pub demand_scale_mw: f64,
    /// Divisor for the recent-cost feature
    pub cost_scale: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            horizon: 168,
            forecast_steps: 4,
            window: WindowSelection::Randomized,
            below_min_policy: BelowMinPolicy::ClampToMin,
            initial_output: InitialOutput::Midpoint,
            demand_scale_mw: 10_000.0,
            cost_scale: 10_000.0,
        }
    }
}

/// Reward weights and penalty shape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// λ_reliability
    pub reliability_weight: f64,
    /// λ_stability
    pub stability_weight: f64,
    /// λ_carbon
    pub carbon_weight: f64,
    /// Penalty per MW of unmet demand
    pub shortage_weight: f64,
    /// Penalty per MW of excess supply
    pub oversupply_weight: f64,
    /// Gap, as a fraction of demand, above which the severe term applies
    pub severe_fraction: f64,
    /// Extra penalty per MW of gap once the mismatch is severe
    pub severe_multiplier: f64,
    /// Intensity (t/MWh) that earns zero carbon credit
    pub reference_intensity: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            reliability_weight: 10.0,
            stability_weight: 0.1,
            carbon_weight: 0.0,
            shortage_weight: 1.0,
            oversupply_weight: 1.0,
            severe_fraction: 0.1,
            severe_multiplier: 2.0,
            reference_intensity: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub episodes: usize,
    pub base_seed: u64,
    /// Worker pool size for parallel evaluation
    pub workers: usize,
    /// A step counts as matched when |gap| <= tolerance * demand
    pub supply_match_tolerance: f64,
    /// Policy the comparison report measures improvement against
    pub reference_policy: String,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            episodes: 100,
            base_seed: 42,
            workers: 4,
            supply_match_tolerance: 0.03,
            reference_policy: "greedy".to_string(),
        }
    }
}

/// 24-hour adjustment profiles for the rule-based baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleBasedConfig {
    pub weekday_profile: Vec<f64>,
    pub weekend_profile: Vec<f64>,
}

impl Default for RuleBasedConfig {
    fn default() -> Self {
        // Ramp up into the morning peak, hold through the day, ramp down at night.
        let weekday = vec![
            -0.2, -0.2, -0.1, 0.0, 0.1, 0.3, // 00-05
            0.5, 0.5, 0.3, 0.1, 0.0, 0.0, // 06-11
            0.0, 0.0, 0.0, 0.1, 0.2, 0.3, // 12-17
            0.1, -0.1, -0.3, -0.4, -0.4, -0.3, // 18-23
        ];
        let weekend = weekday.iter().map(|v| v * 0.5).collect();
        Self {
            weekday_profile: weekday,
            weekend_profile: weekend,
        }
    }
}

/// Which chronological slice of the demand series to evaluate on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandSplit {
    All,
    Train,
    Validation,
    Test,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemandConfig {
    /// CSV or JSON demand file; synthetic demand is used when absent
    pub path: Option<PathBuf>,
    pub split: DemandSplit,
    pub train_ratio: f64,
    pub val_ratio: f64,
    pub synthetic: SyntheticDemand,
}

impl Default for DemandConfig {
    fn default() -> Self {
        Self {
            path: None,
            split: DemandSplit::Test,
            train_ratio: 0.7,
            val_ratio: 0.15,
            synthetic: SyntheticDemand {
                base_mw: 450.0,
                daily_amplitude_mw: 100.0,
                seasonal_amplitude_mw: 80.0,
                noise_std_mw: 15.0,
                ..SyntheticDemand::default()
            },
        }
    }
}

impl DemandConfig {
    /// Load the configured series (or `path_override`), falling back to
    /// synthetic demand, and return the selected split.
    pub fn load_series(&self, path_override: Option<&Path>) -> crate::Result<DemandSeries> {
        let series = match path_override.or(self.path.as_deref()) {
            Some(path) => DemandSeries::from_path(path)?,
            None => {
                tracing::info!(
                    "No demand file configured, generating {} hours of synthetic demand (seed {})",
                    self.synthetic.hours,
                    self.synthetic.seed
                );
                self.synthetic.generate()?
            }
        };

        if self.split == DemandSplit::All {
            return Ok(series);
        }
        let (train, val, test) = series.split(self.train_ratio, self.val_ratio)?;
        let selected = match self.split {
            DemandSplit::Train => train,
            DemandSplit::Validation => val,
            DemandSplit::Test | DemandSplit::All => test,
        };
        if selected.is_empty() {
            return Err(GridError::Data(format!(
                "{:?} split of a {}-sample series is empty",
                self.split,
                series.len()
            )));
        }
        Ok(selected)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Five-unit reference fleet (770 MW total)
pub fn default_generators() -> Vec<Generator> {
    vec![
        Generator::new("nuclear", 200.0, 80.0, 20.0, CostCurve::Linear { marginal: 10.0 }),
        Generator::new(
            "coal",
            200.0,
            60.0,
            40.0,
            CostCurve::Quadratic {
                a: 200.0,
                b: 25.0,
                c: 0.02,
            },
        )
        .with_emissions(0.95),
        Generator::new(
            "gas_ccgt",
            150.0,
            40.0,
            60.0,
            CostCurve::Quadratic {
                a: 100.0,
                b: 40.0,
                c: 0.03,
            },
        )
        .with_emissions(0.4),
        Generator::new("hydro", 120.0, 0.0, 100.0, CostCurve::Linear { marginal: 5.0 }),
        Generator::new(
            "gas_peaker",
            100.0,
            10.0,
            100.0,
            CostCurve::PiecewiseLinear {
                segments: vec![
                    CostSegment {
                        up_to_mw: 50.0,
                        marginal: 70.0,
                    },
                    CostSegment {
                        up_to_mw: 100.0,
                        marginal: 110.0,
                    },
                ],
            },
        )
        .with_emissions(0.6),
    ]
}

impl Default for GridSimConfig {
    fn default() -> Self {
        Self {
            environment: EnvironmentConfig::default(),
            generators: default_generators(),
            reward: RewardConfig::default(),
            evaluation: EvaluationConfig::default(),
            rule_based: RuleBasedConfig::default(),
            demand: DemandConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl GridSimConfig {
    /// Load configuration from file and environment, then validate it.
    ///
    /// An explicit `path` must exist; otherwise the standard locations are
    /// searched and defaults are used when none is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let source = Self::locate(path)?;
        match &source {
            Some(path) => tracing::info!("Loading config from: {:?}", path),
            None => tracing::info!("No config file found, using defaults"),
        }
        Self::load_from(source.as_deref())
    }

    /// Resolve which file to read: an explicit path (which must exist) or
    /// the first standard location present.
    pub fn locate(path: Option<&Path>) -> Result<Option<PathBuf>> {
        match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                Ok(Some(p.to_path_buf()))
            }
            None => Ok(Self::find_config_file()),
        }
    }

    /// Build from an already located file (or defaults) plus the
    /// environment, without logging.
    pub fn load_from(source: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::<config::builder::DefaultState>::default();

        if let Some(path) = source {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        // Add environment variables with GRIDSIM__ prefix
        builder = builder.add_source(
            Environment::with_prefix("GRIDSIM")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("Failed to parse configuration")?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Render as TOML (used by `config init`).
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Find the configuration file
    pub fn find_config_file() -> Option<PathBuf> {
        // Check in order: GRIDSIM_CONFIG env, ./gridsim.toml, ~/.config/gridsim/gridsim.toml
        if let Ok(path) = std::env::var("GRIDSIM_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let local = PathBuf::from("gridsim.toml");
        if local.exists() {
            return Some(local);
        }

        dirs::config_dir()
            .map(|dir| dir.join("gridsim").join("gridsim.toml"))
            .filter(|path| path.exists())
    }

    /// Reject configurations that would fail at runtime.
    pub fn validate(&self) -> crate::Result<()> {
        validate_fleet(&self.generators)?;

        let mut names = HashSet::new();
        for generator in &self.generators {
            if !names.insert(generator.name.as_str()) {
                return Err(GridError::Config(format!(
                    "duplicate generator name '{}'",
                    generator.name
                )));
            }
        }

        let env = &self.environment;
        if env.horizon == 0 {
            return Err(GridError::Config("horizon must be at least 1".into()));
        }
        if !(env.demand_scale_mw.is_finite() && env.demand_scale_mw > 0.0)
            || !(env.cost_scale.is_finite() && env.cost_scale > 0.0)
        {
            return Err(GridError::Config(
                "observation scales must be positive".into(),
            ));
        }
        if let InitialOutput::FractionOfCapacity { fraction } = env.initial_output {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(GridError::Config(format!(
                    "initial output fraction {fraction} outside [0, 1]"
                )));
            }
        }

        let r = &self.reward;
        let weights = [
            ("reliability_weight", r.reliability_weight),
            ("stability_weight", r.stability_weight),
            ("carbon_weight", r.carbon_weight),
            ("shortage_weight", r.shortage_weight),
            ("oversupply_weight", r.oversupply_weight),
            ("severe_fraction", r.severe_fraction),
            ("severe_multiplier", r.severe_multiplier),
        ];
        if let Some((name, value)) = weights
            .iter()
            .find(|(_, v)| !v.is_finite() || *v < 0.0)
        {
            return Err(GridError::Config(format!(
                "reward.{name} must be finite and non-negative, got {value}"
            )));
        }
        if !r.reference_intensity.is_finite() {
            return Err(GridError::Config(
                "reward.reference_intensity must be finite".into(),
            ));
        }

        let e = &self.evaluation;
        if e.workers == 0 {
            return Err(GridError::Config("evaluation.workers must be at least 1".into()));
        }
        if !(e.supply_match_tolerance.is_finite() && e.supply_match_tolerance >= 0.0) {
            return Err(GridError::Config(
                "evaluation.supply_match_tolerance must be non-negative".into(),
            ));
        }

        for (name, profile) in [
            ("weekday_profile", &self.rule_based.weekday_profile),
            ("weekend_profile", &self.rule_based.weekend_profile),
        ] {
            if profile.len() != 24 {
                return Err(GridError::Config(format!(
                    "rule_based.{name} needs 24 hourly values, got {}",
                    profile.len()
                )));
            }
            if profile.iter().any(|v| !(-1.0..=1.0).contains(v)) {
                return Err(GridError::Config(format!(
                    "rule_based.{name} values must lie in [-1, 1]"
                )));
            }
        }

        let d = &self.demand;
        if d.train_ratio < 0.0 || d.val_ratio < 0.0 || d.train_ratio + d.val_ratio > 1.0 {
            return Err(GridError::Config(format!(
                "invalid demand split ratios: train {}, val {}",
                d.train_ratio, d.val_ratio
            )));
        }

        Ok(())
    }

    /// Observation scales derived from the environment and generator table
    pub fn observation_scale(&self) -> ObservationScale {
        let max_capacity = self
            .generators
            .iter()
            .map(|g| g.capacity_mw)
            .fold(0.0, f64::max);
        ObservationScale {
            demand_mw: self.environment.demand_scale_mw,
            output_mw: if max_capacity > 0.0 { max_capacity } else { 1.0 },
            cost: self.environment.cost_scale,
        }
    }

    pub fn num_generators(&self) -> usize {
        self.generators.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GridSimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_generators(), 5);
        let capacity: f64 = config.generators.iter().map(|g| g.capacity_mw).sum();
        assert_eq!(capacity, 770.0);
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let config = GridSimConfig::default();
        let rendered = config.to_toml_string().unwrap();
        let parsed = GridSimConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed.generators, config.generators);
        assert_eq!(parsed.environment.window, WindowSelection::Randomized);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = GridSimConfig::from_toml_str(
            r#"
[environment]
horizon = 24
below_min_policy = "shut_down"
window = { mode = "fixed", offset = 10 }

[reward]
carbon_weight = 0.5
"#,
        )
        .unwrap();
        assert_eq!(config.environment.horizon, 24);
        assert_eq!(config.environment.forecast_steps, 4);
        assert_eq!(config.environment.below_min_policy, BelowMinPolicy::ShutDown);
        assert_eq!(
            config.environment.window,
            WindowSelection::Fixed { offset: 10 }
        );
        assert_eq!(config.reward.carbon_weight, 0.5);
        assert_eq!(config.reward.reliability_weight, 10.0);
        assert_eq!(config.generators.len(), 5);
    }

    #[test]
    fn test_rejects_zero_horizon() {
        let mut config = GridSimConfig::default();
        config.environment.horizon = 0;
        assert!(matches!(config.validate(), Err(GridError::Config(_))));
    }

    #[test]
    fn test_rejects_negative_weight() {
        let mut config = GridSimConfig::default();
        config.reward.stability_weight = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_generator_names() {
        let mut config = GridSimConfig::default();
        let copy = config.generators[0].clone();
        config.generators.push(copy);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_short_profile() {
        let mut config = GridSimConfig::default();
        config.rule_based.weekend_profile.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_series_selects_split() {
        let mut demand = DemandConfig::default();
        demand.synthetic.hours = 100;
        let test = demand.load_series(None).unwrap();
        assert_eq!(test.len(), 15);

        demand.split = DemandSplit::Train;
        assert_eq!(demand.load_series(None).unwrap().len(), 70);

        demand.split = DemandSplit::All;
        assert_eq!(demand.load_series(None).unwrap().len(), 100);
    }

    #[test]
    fn test_observation_scale_uses_largest_capacity() {
        let scale = GridSimConfig::default().observation_scale();
        assert_eq!(scale.output_mw, 200.0);
        assert_eq!(scale.demand_mw, 10_000.0);
    }
}
