//! Shared domain types.
//!
//! These types are kept small and serializable so they can be:
//!
//! - built from CLI flags
//! - passed across threads to per-group refinements
//! - exported to JSON alongside fitted models

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ErrorModelError;

/// Default starting value for `a`.
pub const DEFAULT_A: f64 = 1.0;
/// Default starting value for `b`.
pub const DEFAULT_B: f64 = 0.02;
/// Default intensity floor (scaled consensus intensity) for filtering.
pub const DEFAULT_MIN_IH: f64 = 25.0;
/// Default partiality floor for filtering.
pub const DEFAULT_MIN_PARTIALITY: f64 = 0.4;
/// Default requested number of intensity bins.
pub const DEFAULT_N_BINS: usize = 10;
/// Default minimum number of reflections needed to fit a model.
pub const DEFAULT_MIN_REFLECTIONS: usize = 250;

/// Which error model to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ErrorModelKind {
    /// Two-parameter model `σ'² = a²(σ² + (bI)²)`.
    Basic,
    /// Leave variances uncorrected.
    None,
}

/// Fitting strategy for the model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Minimisation {
    /// Alternate single-parameter passes for `a` and `b`.
    Individual,
    /// One-shot linear regression of bin variances.
    Regression,
    /// Keep starting parameters.
    None,
}

/// How datasets (sweeps) are grouped into independent error models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    /// One model per dataset.
    Individual,
    /// One model per explicit dataset group (`error_model_group`).
    Grouped,
    /// One model for everything.
    Combined,
}

/// A model parameter, used to describe active (refined) subsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parameter {
    A,
    B,
}

/// Error-model parameters `(a, b)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub a: f64,
    pub b: f64,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            a: DEFAULT_A,
            b: DEFAULT_B,
        }
    }
}

impl ModelParameters {
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    /// Identity correction (`V' = V`).
    pub fn identity() -> Self {
        Self { a: 1.0, b: 0.0 }
    }

    /// Check `a > 0`, `b >= 0`, both finite.
    pub fn validate(self) -> Result<Self, ErrorModelError> {
        if self.a.is_finite() && self.b.is_finite() && self.a > 0.0 && self.b >= 0.0 {
            Ok(self)
        } else {
            Err(ErrorModelError::InvalidParameters { a: self.a, b: self.b })
        }
    }

    /// Estimated asymptotic I/σ, `1/(a·b)`. `None` when `b` is zero.
    pub fn asymptotic_isigma(self) -> Option<f64> {
        let ab = self.a * self.b;
        (ab > 0.0 && ab.is_finite()).then(|| 1.0 / ab)
    }
}

/// Options consumed when building and running error models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorModelConfig {
    pub error_model: ErrorModelKind,
    /// Fixed `a` (excluded from refinement) when set.
    pub a: Option<f64>,
    /// Fixed `b` (excluded from refinement) when set.
    pub b: Option<f64>,
    pub minimisation: Minimisation,
    pub min_ih: f64,
    pub min_partiality: f64,
    pub n_bins: usize,
    pub min_reflections_required: usize,
    /// Ignore supplied `a`/`b` and start from defaults.
    pub reset_error_model: bool,
    pub grouping: Grouping,
    /// Dataset partitions for `Grouping::Grouped`.
    pub error_model_group: Vec<Vec<usize>>,
    pub refine: RefineOptions,
}

impl Default for ErrorModelConfig {
    fn default() -> Self {
        Self {
            error_model: ErrorModelKind::Basic,
            a: None,
            b: None,
            minimisation: Minimisation::Individual,
            min_ih: DEFAULT_MIN_IH,
            min_partiality: DEFAULT_MIN_PARTIALITY,
            n_bins: DEFAULT_N_BINS,
            min_reflections_required: DEFAULT_MIN_REFLECTIONS,
            reset_error_model: false,
            grouping: Grouping::Combined,
            error_model_group: Vec::new(),
            refine: RefineOptions::default(),
        }
    }
}

impl ErrorModelConfig {
    /// Fixed parameters as supplied, honouring `reset_error_model`.
    pub fn fixed_a(&self) -> Option<f64> {
        if self.reset_error_model { None } else { self.a }
    }

    pub fn fixed_b(&self) -> Option<f64> {
        if self.reset_error_model { None } else { self.b }
    }
}

/// Controls for the individual-parameter refinement loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefineOptions {
    /// Maximum number of a-pass + b-pass cycles.
    pub max_cycles: usize,
    /// Stop when both relative parameter changes fall below this.
    pub tolerance: f64,
    /// Upper bound of the `b` search interval.
    pub b_max: f64,
    /// Iteration cap for the one-dimensional `b` search.
    pub b_max_iters: u64,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            max_cycles: 10,
            tolerance: 1e-5,
            b_max: 0.5,
            b_max_iters: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_non_positive_a_and_negative_b() {
        assert!(ModelParameters::new(1.0, 0.0).validate().is_ok());
        assert!(ModelParameters::new(0.0, 0.1).validate().is_err());
        assert!(ModelParameters::new(1.0, -0.1).validate().is_err());
        assert!(ModelParameters::new(f64::NAN, 0.1).validate().is_err());
    }

    #[test]
    fn asymptotic_limit_needs_non_zero_b() {
        assert_eq!(ModelParameters::identity().asymptotic_isigma(), None);
        let lim = ModelParameters::new(1.25, 0.04).asymptotic_isigma().unwrap();
        assert!((lim - 20.0).abs() < 1e-12);
    }

    #[test]
    fn reset_ignores_supplied_parameters() {
        let mut config = ErrorModelConfig {
            a: Some(1.5),
            b: Some(0.05),
            ..ErrorModelConfig::default()
        };
        assert_eq!(config.fixed_a(), Some(1.5));
        config.reset_error_model = true;
        assert_eq!(config.fixed_a(), None);
        assert_eq!(config.fixed_b(), None);
    }
}
