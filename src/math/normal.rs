//! Standard-normal quantiles and plotting positions.

use std::f64::consts::SQRT_2;

use statrs::function::erf::erf_inv;

/// Inverse CDF of the standard normal distribution.
pub fn normal_quantile(p: f64) -> f64 {
    SQRT_2 * erf_inv(2.0 * p - 1.0)
}

/// Continuity-corrected plotting positions `(i + 1 - c) / (n + 1 - 2c)`, with
/// `c = 3/8` for `n <= 10` and `c = 1/2` otherwise.
pub fn plotting_positions(n: usize) -> Vec<f64> {
    let c = if n <= 10 { 3.0 / 8.0 } else { 0.5 };
    let denom = n as f64 + 1.0 - 2.0 * c;
    (0..n).map(|i| (i as f64 + 1.0 - c) / denom).collect()
}

/// Expected normal order statistics for a sample of size `n`.
pub fn expected_normal_scores(n: usize) -> Vec<f64> {
    plotting_positions(n).into_iter().map(normal_quantile).collect()
}

/// Normal scores at `(i + 0.5) / n`, rescaled to zero mean and unit population
/// variance. Used to build deterministic unit-variance deviation patterns.
pub fn standardized_normal_scores(n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![0.0; n];
    }
    let raw: Vec<f64> = (0..n)
        .map(|i| normal_quantile((i as f64 + 0.5) / n as f64))
        .collect();
    let mean = raw.iter().sum::<f64>() / n as f64;
    let var = raw.iter().map(|z| (z - mean).powi(2)).sum::<f64>() / n as f64;
    let sd = var.sqrt();
    raw.into_iter().map(|z| (z - mean) / sd).collect()
}
