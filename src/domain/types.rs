//! Shared domain types.
//!
//! These types are kept small and serializable so they can be:
//!
//! - passed between the binner, the solver and the grid scheduler
//! - exported to JSON/CSV
//! - configured from files or the command line

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// One drifter fix: a timestamp (fractional years), a position and one value
/// per channel (e.g. zonal and meridional velocity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub time: f64,
    pub x: f64,
    pub y: f64,
    pub values: Vec<f64>,
}

impl Observation {
    pub fn new(time: f64, x: f64, y: f64, values: Vec<f64>) -> Self {
        Self { time, x, y, values }
    }

    /// `true` when channel `ch` holds a usable value.
    pub fn is_defined(&self, ch: usize, undefined: f64) -> bool {
        self.values
            .get(ch)
            .is_some_and(|&v| v.is_finite() && v != undefined)
    }
}

/// Grid cell address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellIndex {
    pub row: usize,
    pub col: usize,
}

impl CellIndex {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Parametric autocorrelation family of the residual ("eddy") noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Autocorrelation {
    /// `ρ(τ) = exp(-τ/T)`.
    Exponential,
    /// Cosine-modulated exponential, `ρ(τ) = exp(-τ/T) cos(τ/T)`.
    ///
    /// Models the negative lobe typical of eddy-dominated velocity records.
    Eddy,
}

/// Scale of the diagonal prior covariance of the unknowns (`Rxx`).
///
/// The classic choice is `(range / 2)^2`, a weak data-scale prior. It is kept as
/// the default but is no longer a hidden constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorScale {
    /// Prior standard deviation = `factor * (max(y) - min(y))`.
    RangeFactor(f64),
    /// Prior standard deviation fixed in data units.
    Absolute(f64),
}

impl Default for PriorScale {
    fn default() -> Self {
        PriorScale::RangeFactor(0.5)
    }
}

impl PriorScale {
    /// Prior standard deviation for a channel with the given value range.
    pub fn sigma(self, range: f64) -> f64 {
        match self {
            PriorScale::RangeFactor(f) => f * range,
            PriorScale::Absolute(s) => s,
        }
    }

    pub(crate) fn is_valid(self) -> bool {
        match self {
            PriorScale::RangeFactor(v) | PriorScale::Absolute(v) => v.is_finite() && v > 0.0,
        }
    }
}

/// Why a cell/channel produced no estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateReason {
    TooFewSamples,
    ZeroRange,
    ZeroVariance,
}

impl DegenerateReason {
    pub fn display_name(self) -> &'static str {
        match self {
            DegenerateReason::TooFewSamples => "too few samples",
            DegenerateReason::ZeroRange => "zero value range",
            DegenerateReason::ZeroVariance => "zero variance",
        }
    }
}

/// Per-cycle derived quantities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleEstimate {
    pub frequency: f64,
    pub amplitude: f64,
    /// `atan2(sin, cos)` in radians.
    pub phase: f64,
    /// Propagated from the (cos, sin) block of `Pxx`; `None` when errors were not requested.
    pub amplitude_error: Option<f64>,
}

/// Mean-square contribution of each model component at the observation times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceBudget {
    pub mean: f64,
    pub cycles: Vec<f64>,
    /// Present only when spatial terms are fitted.
    pub spatial: Option<f64>,
    pub residual: f64,
    /// Mean square of the centered data minus the sum of the parts above:
    /// cross terms between components that are not orthogonal at the sample times.
    pub cross: f64,
}

impl VarianceBudget {
    /// Sum of the component mean squares, without `cross`.
    pub fn component_sum(&self) -> f64 {
        self.mean + self.cycles.iter().sum::<f64>() + self.spatial.unwrap_or(0.0) + self.residual
    }

    /// Mean square of the centered data.
    pub fn total(&self) -> f64 {
        self.component_sum() + self.cross
    }

    /// Contributions flattened in output order: mean, cycles, [spatial], residual.
    /// `cross` is not an output layer.
    pub fn to_vec(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.cycles.len() + 3);
        out.push(self.mean);
        out.extend_from_slice(&self.cycles);
        if let Some(s) = self.spatial {
            out.push(s);
        }
        out.push(self.residual);
        out
    }
}

/// Estimate for one (cell, channel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResult {
    /// `[mean, cos_1..cos_K, sin_1..sin_K, (dx, dx², dy, dy², dx·dy)]`.
    pub coefficients: Vec<f64>,
    /// `sqrt(diag(Pxx))`, same layout as `coefficients`.
    pub std_errors: Option<Vec<f64>>,
    /// `x̂[0]` plus the channel mean removed before solving.
    pub mean: f64,
    pub cycles: Vec<CycleEstimate>,
    pub variance: VarianceBudget,
    /// Model prediction `A·x̂` at the observation times, in data units.
    pub fitted: Vec<f64>,
    /// Centered data minus the removed components, at the observation times.
    pub residuals: Vec<f64>,
    /// Posterior covariance `Pxx`, row-major `N × N`; `None` when errors were not requested.
    pub error_covariance: Option<Vec<f64>>,
    pub amplitude_reject: bool,
    pub residual_reject: bool,
    pub n_samples: usize,
}

impl SolveResult {
    pub fn rejected(&self) -> bool {
        self.amplitude_reject || self.residual_reject
    }
}

/// Result of a solve: an estimate, or an explicit "undefined" for sparse or flat cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SolveOutcome {
    Solved(SolveResult),
    Undefined(DegenerateReason),
}

impl SolveOutcome {
    pub fn solved(&self) -> Option<&SolveResult> {
        match self {
            SolveOutcome::Solved(r) => Some(r),
            SolveOutcome::Undefined(_) => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, SolveOutcome::Undefined(_))
    }
}
