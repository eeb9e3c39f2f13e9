//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - input records (`Observation`, `CellIndex`)
//! - model configuration enums (`Autocorrelation`, `PriorScale`)
//! - solve outputs (`SolveResult`, `SolveOutcome`, `VarianceBudget`)
//! - the run configuration (`AnalysisConfig`)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
