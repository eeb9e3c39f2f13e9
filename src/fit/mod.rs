//! Per-cell estimation.
//!
//! Responsibilities:
//!
//! - center a channel series and guard degenerate input
//! - solve the Gauss-Markov system against a `DesignModel`
//! - derive amplitudes, phases, errors, variance budget and rejection flags

pub mod gauss_markov;

pub use gauss_markov::*;
