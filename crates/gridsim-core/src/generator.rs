//! Generator table and cost curves

use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};

/// One segment of a piecewise-linear cost curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostSegment {
    /// Upper bound of the segment (MW)
    pub up_to_mw: f64,
    /// Marginal cost inside the segment ($/MWh)
    pub marginal: f64,
}

/// Per-generator cost curve, evaluated at the generator's output in MW.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CostCurve {
    /// `marginal * p`
    Linear { marginal: f64 },

    /// `a + b*p + c*p^2`; the no-load term `a` is only charged while running.
    Quadratic { a: f64, b: f64, c: f64 },

    /// Integral of a step-wise marginal cost from 0 to `p`.
    PiecewiseLinear { segments: Vec<CostSegment> },
}

impl CostCurve {
    /// Cost of producing `output_mw` for one step.
    pub fn evaluate(&self, output_mw: f64) -> f64 {
        if output_mw <= 0.0 {
            return 0.0;
        }
        match self {
            CostCurve::Linear { marginal } => marginal * output_mw,
            CostCurve::Quadratic { a, b, c } => a + b * output_mw + c * output_mw * output_mw,
            CostCurve::PiecewiseLinear { segments } => {
                let mut cost = 0.0;
                let mut lower = 0.0;
                for segment in segments {
                    if output_mw <= lower {
                        break;
                    }
                    let width = output_mw.min(segment.up_to_mw) - lower;
                    cost += width.max(0.0) * segment.marginal;
                    lower = segment.up_to_mw;
                }
                if let Some(last) = segments.last() {
                    if output_mw > last.up_to_mw {
                        cost += (output_mw - last.up_to_mw) * last.marginal;
                    }
                }
                cost
            }
        }
    }

    /// Marginal cost ($/MWh) at `output_mw`.
    pub fn marginal(&self, output_mw: f64) -> f64 {
        let p = output_mw.max(0.0);
        match self {
            CostCurve::Linear { marginal } => *marginal,
            CostCurve::Quadratic { b, c, .. } => b + 2.0 * c * p,
            CostCurve::PiecewiseLinear { segments } => segments
                .iter()
                .find(|s| p < s.up_to_mw)
                .or_else(|| segments.last())
                .map(|s| s.marginal)
                .unwrap_or(0.0),
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let finite = match self {
            CostCurve::Linear { marginal } => marginal.is_finite(),
            CostCurve::Quadratic { a, b, c } => a.is_finite() && b.is_finite() && c.is_finite(),
            CostCurve::PiecewiseLinear { segments } => {
                if segments.is_empty() {
                    return Err(GridError::Config(format!(
                        "generator '{name}': piecewise cost curve needs at least one segment"
                    )));
                }
                if segments
                    .windows(2)
                    .any(|w| w[1].up_to_mw <= w[0].up_to_mw)
                {
                    return Err(GridError::Config(format!(
                        "generator '{name}': cost segments must have increasing breakpoints"
                    )));
                }
                segments
                    .iter()
                    .all(|s| s.up_to_mw.is_finite() && s.marginal.is_finite())
            }
        };
        if finite {
            Ok(())
        } else {
            Err(GridError::Config(format!(
                "generator '{name}': cost curve coefficients must be finite"
            )))
        }
    }
}

/// A dispatchable generating unit. Immutable for the lifetime of a configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub name: String,

    /// Maximum output (MW)
    pub capacity_mw: f64,

    /// Minimum stable output while running (MW)
    pub min_stable_mw: f64,

    /// Maximum change in output between consecutive steps (MW/step)
    pub ramp_rate_mw: f64,

    pub cost: CostCurve,

    /// Emissions intensity (t/MWh)
    #[serde(default)]
    pub emissions_t_per_mwh: f64,
}

impl Generator {
    pub fn new(
        name: impl Into<String>,
        capacity_mw: f64,
        min_stable_mw: f64,
        ramp_rate_mw: f64,
        cost: CostCurve,
    ) -> Self {
        Self {
            name: name.into(),
            capacity_mw,
            min_stable_mw,
            ramp_rate_mw,
            cost,
            emissions_t_per_mwh: 0.0,
        }
    }

    pub fn with_emissions(mut self, t_per_mwh: f64) -> Self {
        self.emissions_t_per_mwh = t_per_mwh;
        self
    }

    /// Midpoint of the stable operating range.
    pub fn midpoint(&self) -> f64 {
        (self.min_stable_mw + self.capacity_mw) / 2.0
    }

    /// Check physical parameters and the cost curve.
    pub fn validate(&self) -> Result<()> {
        let name = &self.name;
        let values = [
            self.capacity_mw,
            self.min_stable_mw,
            self.ramp_rate_mw,
            self.emissions_t_per_mwh,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(GridError::Config(format!(
                "generator '{name}': parameters must be finite"
            )));
        }
        if self.capacity_mw <= 0.0 {
            return Err(GridError::Config(format!(
                "generator '{name}': capacity must be positive"
            )));
        }
        if self.min_stable_mw < 0.0 || self.min_stable_mw > self.capacity_mw {
            return Err(GridError::Config(format!(
                "generator '{name}': min stable output must lie in [0, capacity]"
            )));
        }
        if self.ramp_rate_mw <= 0.0 {
            return Err(GridError::Config(format!(
                "generator '{name}': ramp rate must be positive"
            )));
        }
        self.cost.validate(name)
    }
}

/// Total generation cost of a fleet at the given outputs.
pub fn fleet_cost(generators: &[Generator], outputs: &[f64]) -> f64 {
    generators
        .iter()
        .zip(outputs)
        .map(|(g, &p)| g.cost.evaluate(p))
        .sum()
}

/// Validate a whole generator table.
pub fn validate_fleet(generators: &[Generator]) -> Result<()> {
    if generators.is_empty() {
        return Err(GridError::Config(
            "generator table must contain at least one generator".to_string(),
        ));
    }
    for generator in generators {
        generator.validate()?;
    }
    Ok(())
}
