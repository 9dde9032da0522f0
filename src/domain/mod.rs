//! Domain types used throughout the engine.
//!
//! This module defines:
//!
//! - configuration enums (`ErrorModelKind`, `Minimisation`, `Grouping`)
//! - model parameters and run options
//! - the column-oriented `ObservationTable`

pub mod table;
pub mod types;

pub use table::*;
pub use types::*;
