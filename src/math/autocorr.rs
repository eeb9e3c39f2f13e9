//! Parametric autocorrelation functions for the residual noise model.
//!
//! Both families are positive-definite in one dimension, so any set of sample
//! times yields a valid correlation matrix:
//!
//! - exponential: `ρ(τ) = exp(-τ/T)`
//! - eddy: `ρ(τ) = exp(-τ/T) cos(τ/T)` (its spectrum is a sum of two Lorentzians)

use crate::domain::Autocorrelation;

/// Evaluate `ρ(|lag|)` for the given family and timescale `T > 0`.
pub fn autocorrelation(family: Autocorrelation, lag: f64, timescale: f64) -> f64 {
    let x = lag.abs() / timescale;
    match family {
        Autocorrelation::Exponential => (-x).exp(),
        Autocorrelation::Eddy => (-x).exp() * x.cos(),
    }
}
