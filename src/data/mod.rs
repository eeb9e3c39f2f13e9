//! Data sources for the engine that are not file formats.
//!
//! - synthetic drifter scenarios with known signals (`sample`)
//! - timestamp → fractional-year conversion (`time`)

pub mod sample;
pub mod time;

pub use sample::*;
pub use time::*;
