//! Gauss-Markov (generalized least-squares) estimate for one cell and channel.
//!
//! Given centered data `y` (n), design `A` (n × N), a diagonal prior `Rxx` and a
//! noise covariance `Rnn`:
//!
//! ```text
//! G   = A Rxx Aᵀ + Rnn                  (n × n, SPD)
//! x̂   = Rxx Aᵀ G⁻¹ y
//! Pxx = Rxx - Rxx Aᵀ G⁻¹ A Rxx
//! ```
//!
//! Working in the n × n data space needs a single factorization of `G` (the
//! data and `A Rxx` are solved as one right-hand side) and stays well posed
//! when there are fewer samples than unknowns (the prior regularizes).
//! Because `Rxx` is diagonal, `Rxx Aᵀ = (A Rxx)ᵀ` and we only ever form `A Rxx`.

use nalgebra::DMatrix;

use crate::domain::{CycleEstimate, DegenerateReason, SolveOutcome, SolveResult, VarianceBudget};
use crate::error::AppError;
use crate::math::{DenseSolver, LinearSolver, mean, mean_square, sample_variance, value_range};
use crate::models::DesignModel;

/// Per-solve settings shared by every cell of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveOptions {
    pub compute_error: bool,
    /// Reject when any `|x̂_i| / sqrt(Rxx_ii)` exceeds this.
    pub amplitude_threshold: f64,
    /// Reject when the fraction of whitened residuals above 1 exceeds this.
    pub residual_threshold: f64,
    /// Cycles (in frequency order) removed from the residual series; `None` removes every component.
    pub residual_cycles: Option<usize>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            compute_error: true,
            amplitude_threshold: 1.0,
            residual_threshold: 0.4,
            residual_cycles: None,
        }
    }
}

/// The estimator, generic over the linear-system backend.
#[derive(Debug, Clone, Default)]
pub struct GaussMarkov<L: LinearSolver = DenseSolver> {
    linalg: L,
}

impl<L: LinearSolver> GaussMarkov<L> {
    pub fn new(linalg: L) -> Self {
        Self { linalg }
    }

    /// Center raw channel values, estimate, and report the mean in data units.
    pub fn estimate_series(
        &self,
        values: &[f64],
        design: &DesignModel,
        opts: &SolveOptions,
    ) -> Result<SolveOutcome, AppError> {
        let m = mean(values);
        let centered: Vec<f64> = values.iter().map(|v| v - m).collect();
        let mut outcome = self.estimate(&centered, design, opts)?;
        if let SolveOutcome::Solved(result) = &mut outcome {
            result.mean += m;
            for f in &mut result.fitted {
                *f += m;
            }
        }
        Ok(outcome)
    }

    /// Estimate from mean-centered data `y`.
    ///
    /// Sparse or flat series return `SolveOutcome::Undefined`; only a failed
    /// factorization or a non-finite estimate is an error.
    pub fn estimate(
        &self,
        y: &[f64],
        design: &DesignModel,
        opts: &SolveOptions,
    ) -> Result<SolveOutcome, AppError> {
        let n = y.len();
        if n != design.samples() {
            return Err(AppError::config(format!(
                "Data length {n} does not match design rows {}.",
                design.samples()
            )));
        }
        if n <= 1 {
            return Ok(SolveOutcome::Undefined(DegenerateReason::TooFewSamples));
        }
        let range = value_range(y);
        if range == 0.0 {
            return Ok(SolveOutcome::Undefined(DegenerateReason::ZeroRange));
        }
        let variance = sample_variance(y);
        if variance == 0.0 {
            return Ok(SolveOutcome::Undefined(DegenerateReason::ZeroVariance));
        }

        let spec = design.spec();
        let p = design.unknowns();
        let a = design.a();
        let cov = design.covariances(range, variance);

        // A Rxx: scale each column by its prior variance.
        let mut arxx = a.clone();
        for (j, mut col) in arxx.column_iter_mut().enumerate() {
            col *= cov.rxx[j];
        }

        let at = self.linalg.transpose(a);
        let g = self.linalg.multiply(&arxx, &at) + &cov.rnn;

        // One factorization of G serves both y and, for the error, A Rxx.
        let rhs_cols = if opts.compute_error { 1 + p } else { 1 };
        let rhs = DMatrix::from_fn(n, rhs_cols, |i, j| if j == 0 { y[i] } else { arxx[(i, j - 1)] });
        let solution = self.linalg.solve(&g, &rhs)?;
        let rxxat = self.linalg.transpose(&arxx);

        let xhat = self.linalg.multiply(&rxxat, &solution.columns(0, 1).into_owned());
        let x: Vec<f64> = xhat.iter().copied().collect();
        if x.iter().any(|v| !v.is_finite()) {
            return Err(AppError::numeric("Non-finite Gauss-Markov estimate."));
        }

        let pxx = if opts.compute_error {
            let w = solution.columns(1, p).into_owned();
            let reduction = self.linalg.multiply(&rxxat, &w);
            Some(DMatrix::from_fn(p, p, |i, j| {
                let prior = if i == j { cov.rxx[i] } else { 0.0 };
                prior - reduction[(i, j)]
            }))
        } else {
            None
        };
        let std_errors = pxx
            .as_ref()
            .map(|pxx| (0..p).map(|i| pxx[(i, i)].max(0.0).sqrt()).collect::<Vec<f64>>());
        let error_covariance = pxx
            .as_ref()
            .map(|pxx| (0..p).flat_map(|i| (0..p).map(move |j| pxx[(i, j)])).collect::<Vec<f64>>());

        // Component reconstructions at the observation times.
        let component = |cols: &[usize]| -> Vec<f64> {
            (0..n)
                .map(|i| cols.iter().map(|&j| a[(i, j)] * x[j]).sum::<f64>())
                .collect()
        };

        let k_cycles = spec.cycle_count();
        let mut cycles = Vec::with_capacity(k_cycles);
        let mut cycle_ms = Vec::with_capacity(k_cycles);
        let mut cycle_series = Vec::with_capacity(k_cycles);
        for (k, &frequency) in spec.frequencies().iter().enumerate() {
            let (ci, si) = (spec.cos_col(k), spec.sin_col(k));
            let (c, s) = (x[ci], x[si]);
            let amplitude = c.hypot(s);
            let amplitude_error = pxx
                .as_ref()
                .map(|pxx| amplitude_std_error(c, s, pxx[(ci, ci)], pxx[(si, si)], pxx[(ci, si)]));
            cycles.push(CycleEstimate {
                frequency,
                amplitude,
                phase: s.atan2(c),
                amplitude_error,
            });
            let series = component(&[ci, si]);
            cycle_ms.push(mean_square(&series));
            cycle_series.push(series);
        }

        let spatial_cols: Vec<usize> = spec.spatial_cols().collect();
        let spatial_series = (!spatial_cols.is_empty()).then(|| component(&spatial_cols));

        let fitted: Vec<f64> = self.linalg.multiply(a, &xhat).iter().copied().collect();
        let full_residual: Vec<f64> = (0..n).map(|i| y[i] - fitted[i]).collect();

        let mut variance_budget = VarianceBudget {
            mean: x[0] * x[0],
            cycles: cycle_ms,
            spatial: spatial_series.as_deref().map(mean_square),
            residual: mean_square(&full_residual),
            cross: 0.0,
        };
        variance_budget.cross = mean_square(y) - variance_budget.component_sum();

        let removed_cycles = opts.residual_cycles.unwrap_or(k_cycles).min(k_cycles);
        let residuals = if removed_cycles == k_cycles {
            full_residual.clone()
        } else {
            (0..n)
                .map(|i| {
                    let removed: f64 = cycle_series[..removed_cycles].iter().map(|s| s[i]).sum();
                    y[i] - x[0] - removed
                })
                .collect()
        };

        let amplitude_reject = x
            .iter()
            .zip(cov.rxx.iter())
            .any(|(xi, rxx)| xi.abs() / rxx.sqrt() > opts.amplitude_threshold);

        let exceed = full_residual
            .iter()
            .enumerate()
            .filter(|(i, r)| r.abs() / cov.rnn[(*i, *i)].sqrt() > 1.0)
            .count();
        let residual_reject = exceed as f64 / n as f64 > opts.residual_threshold;

        Ok(SolveOutcome::Solved(SolveResult {
            mean: x[0],
            coefficients: x,
            std_errors,
            cycles,
            variance: variance_budget,
            fitted,
            residuals,
            error_covariance,
            amplitude_reject,
            residual_reject,
            n_samples: n,
        }))
    }
}

/// Standard error of `hypot(c, s)` by first-order propagation through the
/// 2 × 2 covariance of `(c, s)`.
fn amplitude_std_error(c: f64, s: f64, var_c: f64, var_s: f64, cov_cs: f64) -> f64 {
    let amp2 = c * c + s * s;
    let var = if amp2 > 0.0 {
        (c * c * var_c + s * s * var_s + 2.0 * c * s * cov_cs) / amp2
    } else {
        0.5 * (var_c + var_s)
    };
    var.max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::domain::{Autocorrelation, PriorScale};
    use crate::models::CycleSpec;

    fn spec(freqs: Vec<f64>, prior: PriorScale) -> CycleSpec {
        CycleSpec::new(freqs, 0.001, Autocorrelation::Exponential, false, 0.1, prior).unwrap()
    }

    fn uniform_times(n: usize, span: f64) -> Vec<f64> {
        (0..n).map(|i| span * i as f64 / n as f64).collect()
    }

    #[test]
    fn degenerate_series_are_undefined() {
        let s = spec(vec![1.0], PriorScale::default());
        let gm = GaussMarkov::<DenseSolver>::default();
        let opts = SolveOptions::default();

        let one = DesignModel::build(&s, &[0.3], None).unwrap();
        let out = gm.estimate(&[0.0], &one, &opts).unwrap();
        assert_eq!(out, SolveOutcome::Undefined(DegenerateReason::TooFewSamples));

        let empty = DesignModel::build(&s, &[], None).unwrap();
        assert!(gm.estimate(&[], &empty, &opts).unwrap().is_undefined());

        let flat = DesignModel::build(&s, &[0.0, 0.1, 0.2], None).unwrap();
        let out = gm.estimate_series(&[5.0, 5.0, 5.0], &flat, &opts).unwrap();
        assert_eq!(out, SolveOutcome::Undefined(DegenerateReason::ZeroRange));
    }

    #[test]
    fn recovers_noise_free_cycles() {
        // Weak prior so shrinkage is negligible.
        let s = spec(vec![1.0, 2.0], PriorScale::RangeFactor(100.0));
        let times = uniform_times(120, 2.0);
        let (a1, b1, a2, b2, m) = (1.5, -0.7, 0.4, 0.9, 10.0);
        let values: Vec<f64> = times
            .iter()
            .map(|&t| {
                m + a1 * (2.0 * PI * t).cos()
                    + b1 * (2.0 * PI * t).sin()
                    + a2 * (4.0 * PI * t).cos()
                    + b2 * (4.0 * PI * t).sin()
            })
            .collect();
        let design = DesignModel::build(&s, &times, None).unwrap();
        let out = GaussMarkov::<DenseSolver>::default()
            .estimate_series(&values, &design, &SolveOptions::default())
            .unwrap();
        let r = out.solved().expect("solved");

        for (cycle, (a, b)) in r.cycles.iter().zip([(a1, b1), (a2, b2)]) {
            let amp = f64::hypot(a, b);
            assert!(
                (cycle.amplitude - amp).abs() / amp < 1e-3,
                "amplitude {} vs {amp}",
                cycle.amplitude
            );
            assert!((cycle.phase - b.atan2(a)).abs() < 1e-3, "phase {} vs {}", cycle.phase, b.atan2(a));
        }
        assert!((r.mean - m).abs() < 1e-3);
        assert!(!r.amplitude_reject);
        assert!(!r.residual_reject);
    }

    #[test]
    fn variance_budget_closes_under_default_prior() {
        // Run defaults: T = 0.02, prior sigma = half the range.
        let s = CycleSpec::new(vec![1.0], 0.02, Autocorrelation::Exponential, false, 0.1, PriorScale::default())
            .unwrap();
        let times = uniform_times(200, 2.0);
        // Deterministic small wiggle standing in for noise.
        let values: Vec<f64> = times
            .iter()
            .enumerate()
            .map(|(i, &t)| 2.0 * (2.0 * PI * t).cos() + 0.05 * ((i * 7919 % 13) as f64 / 13.0 - 0.5))
            .collect();
        let design = DesignModel::build(&s, &times, None).unwrap();
        let m = mean(&values);
        let centered: Vec<f64> = values.iter().map(|v| v - m).collect();
        let out = GaussMarkov::<DenseSolver>::default()
            .estimate(&centered, &design, &SolveOptions::default())
            .unwrap();
        let r = out.solved().unwrap();
        let total = mean_square(&centered);

        assert!(
            (r.variance.total() - total).abs() <= 1e-12 * total,
            "budget {} vs mean square {total}",
            r.variance.total()
        );
        // Shrinkage leaves a few percent in the cross term.
        assert!(r.variance.cross.abs() < 0.1 * total, "cross {}", r.variance.cross);
        assert_eq!(r.variance.to_vec().len(), 3);
    }

    #[test]
    fn weak_prior_leaves_little_cross_term() {
        let s = spec(vec![1.0], PriorScale::RangeFactor(5.0));
        let times = uniform_times(200, 2.0);
        let values: Vec<f64> = times
            .iter()
            .enumerate()
            .map(|(i, &t)| 2.0 * (2.0 * PI * t).cos() + 0.05 * ((i * 7919 % 13) as f64 / 13.0 - 0.5))
            .collect();
        let design = DesignModel::build(&s, &times, None).unwrap();
        let r = GaussMarkov::<DenseSolver>::default()
            .estimate_series(&values, &design, &SolveOptions::default())
            .unwrap();
        let budget = &r.solved().unwrap().variance;
        assert!(
            budget.cross.abs() < 1e-2 * budget.total(),
            "cross {} of {}",
            budget.cross,
            budget.total()
        );
    }

    #[test]
    fn fitted_plus_residual_reproduces_data() {
        let s = spec(vec![1.0], PriorScale::default());
        let times = uniform_times(40, 1.0);
        let values: Vec<f64> = times
            .iter()
            .enumerate()
            .map(|(i, &t)| 7.0 + (2.0 * PI * t).sin() + 0.1 * ((i % 3) as f64 - 1.0))
            .collect();
        let design = DesignModel::build(&s, &times, None).unwrap();
        let out = GaussMarkov::<DenseSolver>::default()
            .estimate_series(&values, &design, &SolveOptions::default())
            .unwrap();
        let r = out.solved().unwrap();

        assert_eq!(r.fitted.len(), values.len());
        for ((f, res), v) in r.fitted.iter().zip(&r.residuals).zip(&values) {
            assert!((f + res - v).abs() < 1e-9, "{f} + {res} != {v}");
        }

        let p = design.unknowns();
        let cov = r.error_covariance.as_ref().expect("error covariance");
        let se = r.std_errors.as_ref().unwrap();
        assert_eq!(cov.len(), p * p);
        for i in 0..p {
            assert!((cov[i * p + i].sqrt() - se[i]).abs() < 1e-12);
            for j in 0..p {
                assert!((cov[i * p + j] - cov[j * p + i]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn error_outputs_absent_without_compute_error() {
        let s = spec(vec![1.0], PriorScale::default());
        let times = uniform_times(20, 1.0);
        let values: Vec<f64> = times.iter().map(|&t| (2.0 * PI * t).cos()).collect();
        let design = DesignModel::build(&s, &times, None).unwrap();
        let opts = SolveOptions {
            compute_error: false,
            ..SolveOptions::default()
        };
        let out = GaussMarkov::<DenseSolver>::default()
            .estimate_series(&values, &design, &opts)
            .unwrap();
        let r = out.solved().unwrap();
        assert!(r.std_errors.is_none());
        assert!(r.error_covariance.is_none());
        assert!(r.cycles[0].amplitude_error.is_none());
        assert_eq!(r.fitted.len(), 20);
    }

    #[test]
    fn standard_errors_shrink_below_prior() {
        let s = spec(vec![1.0], PriorScale::default());
        let times = uniform_times(60, 1.0);
        let values: Vec<f64> = times.iter().map(|&t| (2.0 * PI * t).sin()).collect();
        let design = DesignModel::build(&s, &times, None).unwrap();
        let r = GaussMarkov::<DenseSolver>::default()
            .estimate_series(&values, &design, &SolveOptions::default())
            .unwrap();
        let r = r.solved().unwrap();
        let se = r.std_errors.as_ref().unwrap();
        // Prior sigma is half the range = 1.0.
        assert!(se.iter().all(|&e| e > 0.0 && e < 1.0), "std errors {se:?}");
        assert!(r.cycles[0].amplitude_error.unwrap() > 0.0);
    }

    #[test]
    fn partial_residual_keeps_later_cycles() {
        let s = spec(vec![1.0, 3.0], PriorScale::RangeFactor(100.0));
        let times = uniform_times(90, 1.0);
        let values: Vec<f64> = times
            .iter()
            .map(|&t| (2.0 * PI * t).cos() + 0.5 * (6.0 * PI * t).cos())
            .collect();
        let design = DesignModel::build(&s, &times, None).unwrap();
        let opts = SolveOptions {
            residual_cycles: Some(1),
            ..SolveOptions::default()
        };
        let out = GaussMarkov::<DenseSolver>::default()
            .estimate_series(&values, &design, &opts)
            .unwrap();
        let r = out.solved().unwrap();
        for (res, &t) in r.residuals.iter().zip(times.iter()) {
            let expected = 0.5 * (6.0 * PI * t).cos();
            assert!((res - expected).abs() < 1e-3, "residual {res} vs {expected}");
        }
    }

    #[test]
    fn tight_prior_triggers_amplitude_reject() {
        let s = spec(vec![1.0], PriorScale::Absolute(0.1));
        let times = uniform_times(50, 1.0);
        let values: Vec<f64> = times.iter().map(|&t| 3.0 * (2.0 * PI * t).cos()).collect();
        let design = DesignModel::build(&s, &times, None).unwrap();
        let out = GaussMarkov::<DenseSolver>::default()
            .estimate_series(&values, &design, &SolveOptions::default())
            .unwrap();
        assert!(out.solved().unwrap().amplitude_reject);
    }

    #[test]
    fn spiky_series_triggers_residual_reject_only() {
        // Repeating [0, 0, 1, -1, ±1]: no energy at the fitted frequency, and
        // 60% of the samples sit above one standard deviation.
        let s = spec(vec![1.0], PriorScale::default());
        let times = uniform_times(50, 1.0);
        let values: Vec<f64> = (0..50)
            .map(|i| match i % 5 {
                2 => 1.0,
                3 => -1.0,
                4 if (i / 5) % 2 == 0 => 1.0,
                4 => -1.0,
                _ => 0.0,
            })
            .collect();
        let design = DesignModel::build(&s, &times, None).unwrap();
        let out = GaussMarkov::<DenseSolver>::default()
            .estimate_series(&values, &design, &SolveOptions::default())
            .unwrap();
        let r = out.solved().unwrap();
        assert!(r.residual_reject);
        assert!(!r.amplitude_reject);
        assert!(r.rejected());
    }

    #[test]
    fn spatial_terms_pick_up_offset_gradients() {
        let s = CycleSpec::new(vec![1.0], 0.001, Autocorrelation::Exponential, true, 0.1, PriorScale::default())
            .unwrap();
        let times = uniform_times(60, 1.0);
        let offsets: Vec<(f64, f64)> = (0..60)
            .map(|i| (((i * 7) % 11) as f64 / 5.5 - 1.0, ((i * 5) % 13) as f64 / 6.5 - 1.0))
            .collect();
        let values: Vec<f64> = times
            .iter()
            .zip(&offsets)
            .map(|(&t, &(dx, dy))| 2.0 * (2.0 * PI * t).cos() + 1.5 * dx - dy * dy)
            .collect();
        let design = DesignModel::build(&s, &times, Some(offsets.as_slice())).unwrap();
        let out = GaussMarkov::<DenseSolver>::default()
            .estimate_series(&values, &design, &SolveOptions::default())
            .unwrap();
        let r = out.solved().unwrap();

        let first = s.spatial_cols().start;
        let dx_coef = r.coefficients[first];
        let dy2_coef = r.coefficients[first + 3];
        assert!((1.2..=1.8).contains(&dx_coef), "dx coefficient {dx_coef}");
        assert!((-1.2..=-0.7).contains(&dy2_coef), "dy² coefficient {dy2_coef}");
        assert!((r.cycles[0].amplitude - 2.0).abs() < 0.2, "amplitude {}", r.cycles[0].amplitude);
        let spatial = r.variance.spatial.expect("spatial share");
        assert!(spatial > 0.1 * r.variance.total(), "spatial {spatial}");
        assert_eq!(r.variance.to_vec().len(), 4);
    }

    #[derive(Default)]
    struct CountingSolver {
        solves: AtomicUsize,
    }

    impl LinearSolver for CountingSolver {
        fn solve(&self, a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>, AppError> {
            self.solves.fetch_add(1, Ordering::SeqCst);
            DenseSolver.solve(a, b)
        }
    }

    #[test]
    fn factorizes_once_per_estimate() {
        let s = spec(vec![1.0, 2.0], PriorScale::default());
        let times = uniform_times(30, 1.0);
        let values: Vec<f64> = times.iter().map(|&t| (2.0 * PI * t).cos()).collect();
        let design = DesignModel::build(&s, &times, None).unwrap();
        let gm = GaussMarkov::new(CountingSolver::default());

        let with_error = gm.estimate_series(&values, &design, &SolveOptions::default()).unwrap();
        assert!(with_error.solved().unwrap().std_errors.is_some());
        assert_eq!(gm.linalg.solves.load(Ordering::SeqCst), 1);

        let opts = SolveOptions {
            compute_error: false,
            ..SolveOptions::default()
        };
        gm.estimate_series(&values, &design, &opts).unwrap();
        assert_eq!(gm.linalg.solves.load(Ordering::SeqCst), 2);
    }
}
