//! `cycle-grid` library crate.
//!
//! Gauss-Markov estimation of a mean plus harmonic cycles in every cell of a
//! spatial grid of irregularly sampled observations.
//!
//! The binary (`cyclefit`) is a thin wrapper around this library so that the
//! engine is testable without spawning processes and usable from other
//! front-ends.
//!
//! Pipeline: `binning` -> `models` (design + covariances) -> `fit`
//! (per-series solve) -> `grid` (row scheduler + dense output).

pub mod app;
pub mod binning;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod grid;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
