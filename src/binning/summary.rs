//! Immutable snapshots of binning results.
//!
//! The binner hands these out instead of exposing mutable report state, so the
//! orchestrator (and reports) can hold on to them after the table is released.

use serde::{Deserialize, Serialize};

use crate::domain::ModelParameters;

/// Layout of the intensity bins, fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinningSummary {
    /// `n_bins + 1` boundaries in scaled intensity, strictly decreasing.
    /// Bin `k` covers `(boundaries[k + 1], boundaries[k]]`.
    pub boundaries: Vec<f64>,
    pub occupancy: Vec<usize>,
    /// Mean scaled intensity per bin.
    pub mean_intensity: Vec<f64>,
    pub n_reflections: usize,
    /// Bin count asked for; pruning may leave fewer.
    pub requested_bins: usize,
    pub min_per_bin: usize,
}

impl BinningSummary {
    pub fn n_bins(&self) -> usize {
        self.occupancy.len()
    }

    /// `(upper, lower)` boundary pairs, highest intensity first.
    pub fn ranges(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.boundaries.windows(2).map(|w| (w[0], w[1]))
    }
}

/// Per-bin variance of the normalised deviations at one parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinVariances {
    pub parameters: ModelParameters,
    pub variances: Vec<f64>,
}

impl BinVariances {
    /// Sum of squared departures from unit variance, `Σ (1 − v_k)²`.
    pub fn unit_variance_residual(&self) -> f64 {
        self.variances.iter().map(|v| (1.0 - v).powi(2)).sum()
    }
}
