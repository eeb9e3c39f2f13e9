//! Harmonic cycle model.
//!
//! Builds the per-cell design matrix and noise correlation from a validated
//! `CycleSpec`, so the solver and the scheduler stay generic over the model.

pub mod design;

pub use design::*;
