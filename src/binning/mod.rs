//! Spatial binning of drifter observations.
//!
//! - grid geometry and position → cell mapping (`grid`)
//! - two-pass count-then-fill binning (`binner`)

pub mod binner;
pub mod grid;

pub use binner::*;
pub use grid::*;
