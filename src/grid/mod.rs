//! Whole-grid estimation.
//!
//! - explicitly sized worker pool (`pool`)
//! - row-sequential concurrent scheduler (`scheduler`)
//! - dense output fields (`assembler`)

pub mod assembler;
pub mod pool;
pub mod scheduler;

pub use assembler::*;
pub use pool::*;
pub use scheduler::*;
