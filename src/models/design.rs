//! Cycle model: validated specification, design matrix and covariances.
//!
//! Column layout of the design matrix `A` (n × N):
//!
//! ```text
//! [ 1 | cos(2π f_1 t) .. cos(2π f_K t) | sin(2π f_1 t) .. sin(2π f_K t) | dx dx² dy dy² dx·dy ]
//! ```
//!
//! `N = 2K + 1`, or `2K + 6` when spatial terms are fitted.
//!
//! Noise covariance: `Rnn = var · [(1 - ε) ρ(|t_i - t_j|) + ε δ_ij]`, i.e. a
//! correlated part plus a white fraction `ε` on the diagonal.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};

use crate::domain::{Autocorrelation, PriorScale};
use crate::error::AppError;
use crate::math::autocorrelation;

/// Number of spatial columns (dx, dx², dy, dy², dx·dy).
pub const SPATIAL_TERMS: usize = 5;

/// Relative tolerance under which two frequencies count as duplicates.
const FREQ_DUP_TOL: f64 = 1e-12;

/// Validated model specification shared by every cell of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSpec {
    frequencies: Vec<f64>,
    timescale: f64,
    family: Autocorrelation,
    spatial: bool,
    white_noise: f64,
    prior: PriorScale,
}

impl CycleSpec {
    pub fn new(
        frequencies: Vec<f64>,
        timescale: f64,
        family: Autocorrelation,
        spatial: bool,
        white_noise: f64,
        prior: PriorScale,
    ) -> Result<Self, AppError> {
        if frequencies.is_empty() {
            return Err(AppError::config("At least one cycle frequency is required."));
        }
        if let Some(f) = frequencies.iter().find(|f| !(f.is_finite() && **f > 0.0)) {
            return Err(AppError::config(format!(
                "Invalid frequency {f} (must be finite and > 0)."
            )));
        }
        let mut sorted = frequencies.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        for pair in sorted.windows(2) {
            if (pair[1] - pair[0]).abs() <= FREQ_DUP_TOL * pair[1] {
                return Err(AppError::config(format!("Duplicate frequency {}.", pair[0])));
            }
        }
        if !(timescale.is_finite() && timescale > 0.0) {
            return Err(AppError::config(format!(
                "Invalid timescale {timescale} (must be finite and > 0)."
            )));
        }
        if !(white_noise.is_finite() && (0.0..1.0).contains(&white_noise)) {
            return Err(AppError::config(format!(
                "Invalid white-noise fraction {white_noise} (must be in [0, 1))."
            )));
        }
        if !prior.is_valid() {
            return Err(AppError::config(format!("Invalid prior scale {prior:?}.")));
        }

        Ok(Self {
            frequencies,
            timescale,
            family,
            spatial,
            white_noise,
            prior,
        })
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// `[0, f_1, .., f_K]`, the mean treated as a zero-frequency cycle.
    pub fn fs(&self) -> Vec<f64> {
        std::iter::once(0.0).chain(self.frequencies.iter().copied()).collect()
    }

    pub fn cycle_count(&self) -> usize {
        self.frequencies.len()
    }

    pub fn has_spatial(&self) -> bool {
        self.spatial
    }

    pub fn timescale(&self) -> f64 {
        self.timescale
    }

    pub fn family(&self) -> Autocorrelation {
        self.family
    }

    pub fn prior(&self) -> PriorScale {
        self.prior
    }

    /// Number of unknowns `N`.
    pub fn unknowns(&self) -> usize {
        let base = 2 * self.cycle_count() + 1;
        if self.spatial { base + SPATIAL_TERMS } else { base }
    }

    pub fn cos_col(&self, k: usize) -> usize {
        1 + k
    }

    pub fn sin_col(&self, k: usize) -> usize {
        1 + self.cycle_count() + k
    }

    /// Column range of the spatial block (empty without spatial terms).
    pub fn spatial_cols(&self) -> std::ops::Range<usize> {
        let start = 2 * self.cycle_count() + 1;
        if self.spatial {
            start..start + SPATIAL_TERMS
        } else {
            start..start
        }
    }
}

/// Fill one design row for time `t` and cell offset `(dx, dy)`.
///
/// # Panics
/// Panics if `out.len() != spec.unknowns()`.
pub fn fill_design_row(spec: &CycleSpec, t: f64, offset: (f64, f64), out: &mut [f64]) {
    out[0] = 1.0;
    for (k, &f) in spec.frequencies.iter().enumerate() {
        let arg = 2.0 * PI * f * t;
        out[spec.cos_col(k)] = arg.cos();
        out[spec.sin_col(k)] = arg.sin();
    }
    if spec.spatial {
        let (dx, dy) = offset;
        let s = spec.spatial_cols().start;
        out[s] = dx;
        out[s + 1] = dx * dx;
        out[s + 2] = dy;
        out[s + 3] = dy * dy;
        out[s + 4] = dx * dy;
    }
}

/// Prior and noise covariance for one channel.
#[derive(Debug, Clone)]
pub struct Covariances {
    /// Diagonal of `Rxx`.
    pub rxx: DVector<f64>,
    pub rnn: DMatrix<f64>,
}

/// Design matrix and unit noise correlation for one cell's sample times.
#[derive(Debug, Clone)]
pub struct DesignModel {
    spec: CycleSpec,
    a: DMatrix<f64>,
    corr: DMatrix<f64>,
}

impl DesignModel {
    pub fn build(
        spec: &CycleSpec,
        times: &[f64],
        offsets: Option<&[(f64, f64)]>,
    ) -> Result<Self, AppError> {
        let n = times.len();
        if let Some(t) = times.iter().find(|t| !t.is_finite()) {
            return Err(AppError::input(format!("Non-finite sample time {t}.")));
        }
        match offsets {
            Some(o) if o.len() != n => {
                return Err(AppError::config(format!(
                    "Offsets length {} does not match times length {n}.",
                    o.len()
                )));
            }
            None if spec.spatial && n > 0 => {
                return Err(AppError::config("Spatial terms requested but no offsets supplied."));
            }
            _ => {}
        }

        let p = spec.unknowns();
        let mut a = DMatrix::<f64>::zeros(n, p);
        let mut row = vec![0.0; p];
        for (i, &t) in times.iter().enumerate() {
            let offset = offsets.map(|o| o[i]).unwrap_or((0.0, 0.0));
            fill_design_row(spec, t, offset, &mut row);
            for (j, &v) in row.iter().enumerate() {
                a[(i, j)] = v;
            }
        }

        let eps = spec.white_noise;
        let corr = DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                1.0
            } else {
                (1.0 - eps) * autocorrelation(spec.family, times[i] - times[j], spec.timescale)
            }
        });

        Ok(Self {
            spec: spec.clone(),
            a,
            corr,
        })
    }

    pub fn spec(&self) -> &CycleSpec {
        &self.spec
    }

    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    /// Unit-variance noise correlation matrix.
    pub fn correlation(&self) -> &DMatrix<f64> {
        &self.corr
    }

    pub fn samples(&self) -> usize {
        self.a.nrows()
    }

    pub fn unknowns(&self) -> usize {
        self.a.ncols()
    }

    /// Scale the prior and noise covariances to a channel with the given
    /// value range and sample variance.
    pub fn covariances(&self, range: f64, variance: f64) -> Covariances {
        let sigma = self.spec.prior.sigma(range);
        Covariances {
            rxx: DVector::from_element(self.unknowns(), sigma * sigma),
            rnn: &self.corr * variance,
        }
    }
}
