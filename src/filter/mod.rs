//! Reflection filtering ahead of error-model fitting.

pub mod reflections;

pub use reflections::*;
