//! Basic error-model formulas.
//!
//! Kept as small, pure functions over whole columns so the binner, the
//! orchestrator and the refinement passes share one definition.

pub mod deviation;

pub use deviation::*;
