//! Error-model orchestration: state, parameters and the applied correction.

pub mod basic;

pub use basic::*;
