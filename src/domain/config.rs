//! Run configuration.
//!
//! `AnalysisConfig` is the single configuration surface of a run. It can be
//! loaded from a JSON file, built from CLI flags, or constructed in code; in all
//! cases `validate()` runs before any worker is started.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{Autocorrelation, PriorScale};
use crate::error::AppError;
use crate::fit::SolveOptions;
use crate::models::CycleSpec;

/// Sentinel used for undefined input values and undefined output cells.
pub const DEFAULT_UNDEFINED: f64 = -999.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Cycle frequencies in cycles per year (annual = 1.0, semiannual = 2.0).
    pub frequencies: Vec<f64>,
    /// Decorrelation ("eddy") timescale of the residual noise, in years.
    pub timescale: f64,
    pub autocorrelation: Autocorrelation,
    /// Fit dx, dx², dy, dy², dx·dy terms around each cell center.
    pub spatial_terms: bool,
    /// Fraction of the noise variance treated as white (diagonal only).
    pub white_noise_fraction: f64,
    pub prior: PriorScale,
    pub amplitude_reject_threshold: f64,
    pub residual_reject_threshold: f64,
    pub compute_error: bool,
    /// Number of leading cycles removed in the residual series; `None` removes all.
    pub residual_cycles: Option<usize>,
    pub workers: usize,
    pub undefined: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frequencies: vec![1.0, 2.0],
            timescale: 0.02,
            autocorrelation: Autocorrelation::Exponential,
            spatial_terms: false,
            white_noise_fraction: 0.1,
            prior: PriorScale::default(),
            amplitude_reject_threshold: 1.0,
            residual_reject_threshold: 0.4,
            compute_error: true,
            residual_cycles: None,
            workers: default_workers(),
            undefined: DEFAULT_UNDEFINED,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl AnalysisConfig {
    /// Load a JSON config. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::io(format!("Failed to open config '{}': {e}", path.display())))?;
        let config: AnalysisConfig = serde_json::from_reader(file)
            .map_err(|e| AppError::config(format!("Invalid config JSON '{}': {e}", path.display())))?;
        Ok(config)
    }

    /// Check the scalar settings that are not covered by `CycleSpec::new`.
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.amplitude_reject_threshold.is_finite() && self.amplitude_reject_threshold > 0.0) {
            return Err(AppError::config(format!(
                "Invalid amplitude reject threshold {} (must be finite and > 0).",
                self.amplitude_reject_threshold
            )));
        }
        let r = self.residual_reject_threshold;
        if !(r.is_finite() && r > 0.0 && r <= 1.0) {
            return Err(AppError::config(format!(
                "Invalid residual reject threshold {r} (must be in (0, 1])."
            )));
        }
        if self.workers == 0 {
            return Err(AppError::config("Worker count must be >= 1."));
        }
        if let Some(k) = self.residual_cycles {
            if k > self.frequencies.len() {
                return Err(AppError::config(format!(
                    "residual_cycles={k} exceeds the number of cycles ({}).",
                    self.frequencies.len()
                )));
            }
        }
        if self.undefined.is_nan() {
            return Err(AppError::config("The undefined sentinel must not be NaN."));
        }
        Ok(())
    }

    /// Validated model specification.
    pub fn spec(&self) -> Result<CycleSpec, AppError> {
        self.validate()?;
        CycleSpec::new(
            self.frequencies.clone(),
            self.timescale,
            self.autocorrelation,
            self.spatial_terms,
            self.white_noise_fraction,
            self.prior,
        )
    }

    pub fn solve_options(&self) -> SolveOptions {
        SolveOptions {
            compute_error: self.compute_error,
            amplitude_threshold: self.amplitude_reject_threshold,
            residual_threshold: self.residual_reject_threshold,
            residual_cycles: self.residual_cycles,
        }
    }
}
