//! Input/output helpers.
//!
//! - CSV observation ingest (`ingest`)
//! - grid exports (CSV/JSON) (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
