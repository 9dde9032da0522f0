//! Reporting: binned variance tables, model details and run summaries.

pub mod format;

pub use format::*;
