//! Parameter refinement.
//!
//! Responsibilities:
//!
//! - parameter managers (get/set/resolve over a shared model)
//! - alternating individual refinement of `a` and `b`
//! - one-shot regression of bin variances
//! - dispatch on the configured strategy

pub mod individual;
pub mod managers;
pub mod refine;
pub mod regression;

pub use individual::*;
pub use managers::*;
pub use refine::*;
pub use regression::*;
