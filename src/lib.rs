//! `error-model` library crate.
//!
//! Estimates and applies the two-parameter error model `σ'² = a²(σ² + (bI)²)`
//! for scaled diffraction intensities. The binary (`errmod`) is a thin wrapper
//! around this library so the engine is testable without spawning processes.

pub mod app;
pub mod binning;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod filter;
pub mod fit;
pub mod io;
pub mod math;
pub mod model;
pub mod models;
pub mod plot;
pub mod report;
