//! Mathematical utilities: noise autocorrelation, dense solves and summary statistics.

pub mod autocorr;
pub mod linalg;
pub mod stats;

pub use autocorr::*;
pub use linalg::*;
pub use stats::*;
