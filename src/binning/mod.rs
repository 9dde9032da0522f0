//! Intensity binning of filtered reflections.
//!
//! - `binner`: bin construction and per-update bin variances
//! - `summary`: immutable snapshots handed to the orchestrator and reports

pub mod binner;
pub mod summary;

pub use binner::*;
pub use summary::*;
