//! Synthetic observation tables drawn from a known error model.
//!
//! Each redundancy group has a true value `Ih`; its observations are
//!
//! ```text
//! I = g·(Ih + s·σ·z),   σ = a·sqrt(V + (b·g·Ih)²) / g,   V = g·Ih
//! ```
//!
//! with `s = sqrt(m/(m−1))` for multiplicity `m`, so that the normalised
//! deviation of every observation is `z` itself. `z` is either a standard normal
//! draw or, for reproducible small datasets, a rotated set of standardised
//! normal scores (every group then has exactly unit sample variance).
//! The consensus value handed to the engine is the true `Ih`.

use clap::ValueEnum;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::domain::{ModelParameters, ObservationTable};
use crate::error::AppError;
use crate::math::standardized_normal_scores;

/// How group consensus values are spread over the intensity range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IntensityLayout {
    /// Uniform random draws.
    Random,
    /// Evenly spaced group centres.
    Even,
}

/// How per-observation deviations are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NoiseKind {
    Random,
    NormalScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSpec {
    pub n_groups: usize,
    pub multiplicity: usize,
    pub truth: ModelParameters,
    pub ih_min: f64,
    pub ih_max: f64,
    pub layout: IntensityLayout,
    pub noise: NoiseKind,
    /// Inverse scale factors are drawn uniformly from this range.
    pub scale_range: (f64, f64),
    /// Groups are dealt round-robin to this many datasets.
    pub n_datasets: usize,
    pub with_partiality: bool,
    pub seed: u64,
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self {
            n_groups: 300,
            multiplicity: 5,
            truth: ModelParameters::new(1.2, 0.03),
            ih_min: 30.0,
            ih_max: 10_000.0,
            layout: IntensityLayout::Random,
            noise: NoiseKind::Random,
            scale_range: (1.0, 1.0),
            n_datasets: 1,
            with_partiality: false,
            seed: 42,
        }
    }
}

/// Generate an observation table for `spec`.
pub fn generate_table(spec: &SampleSpec) -> Result<ObservationTable, AppError> {
    if spec.n_groups == 0 || spec.multiplicity < 2 {
        return Err(AppError::new(2, "Need at least one group and multiplicity >= 2."));
    }
    if !(spec.ih_min.is_finite() && spec.ih_max.is_finite() && spec.ih_min > 0.0 && spec.ih_max >= spec.ih_min) {
        return Err(AppError::new(2, "Invalid intensity range for sample generation."));
    }
    let (g_lo, g_hi) = spec.scale_range;
    if !(g_lo.is_finite() && g_hi.is_finite() && g_lo > 0.0 && g_hi >= g_lo) {
        return Err(AppError::new(2, "Invalid scale range for sample generation."));
    }
    let truth = spec
        .truth
        .validate()
        .map_err(|e| AppError::new(2, format!("Invalid true model: {e}")))?;

    let mut rng = StdRng::seed_from_u64(spec.seed);
    let normal = Normal::new(0.0, 1.0).map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;
    let m = spec.multiplicity;
    let spread = (m as f64 / (m as f64 - 1.0)).sqrt();
    let scores = standardized_normal_scores(m);
    let n_datasets = spec.n_datasets.max(1);

    let n = spec.n_groups * m;
    let mut intensity = Vec::with_capacity(n);
    let mut variance = Vec::with_capacity(n);
    let mut inverse_scale = Vec::with_capacity(n);
    let mut ih = Vec::with_capacity(n);
    let mut group = Vec::with_capacity(n);
    let mut partiality = Vec::with_capacity(n);
    let mut dataset = Vec::with_capacity(n);

    for k in 0..spec.n_groups {
        let mu = match spec.layout {
            IntensityLayout::Random => rng.gen_range(spec.ih_min..=spec.ih_max),
            IntensityLayout::Even => {
                spec.ih_min + (spec.ih_max - spec.ih_min) * (k as f64 + 0.5) / spec.n_groups as f64
            }
        };
        for j in 0..m {
            let g = rng.gen_range(g_lo..=g_hi);
            let v = g * mu;
            let bi = truth.b * g * mu;
            let sigma = truth.a * (v + bi * bi).sqrt() / g;
            let z = match spec.noise {
                NoiseKind::Random => normal.sample(&mut rng),
                NoiseKind::NormalScores => scores[(j + k) % m],
            };
            intensity.push(g * (mu + spread * sigma * z));
            variance.push(v);
            inverse_scale.push(g);
            ih.push(mu);
            group.push(k);
            dataset.push(k % n_datasets);
            if spec.with_partiality {
                partiality.push(rng.gen_range(0.2..=1.0));
            }
        }
    }

    let table = ObservationTable::new(intensity, variance, inverse_scale, ih, group)
        .and_then(|t| t.with_dataset(dataset))
        .map_err(|e| AppError::new(4, e.to_string()))?;
    if spec.with_partiality {
        table
            .with_partiality(partiality)
            .map_err(|e| AppError::new(4, e.to_string()))
    } else {
        Ok(table)
    }
}
