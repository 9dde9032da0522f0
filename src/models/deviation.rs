//! Corrected uncertainties and normalised deviations.
//!
//! For an observation with intensity `I`, variance `V`, inverse scale `g` in a
//! group of `n_h` observations with consensus value `Ih`:
//!
//! ```text
//! σ' = a·sqrt(V + (b·I)²) / g
//! δ  = sqrt((n_h − 1) / n_h) · (I/g − Ih) / σ'
//! ```
//!
//! Under a correct model `δ` is standard normal; the `sqrt((n_h−1)/n_h)` factor
//! accounts for `Ih` being estimated from the same observations.

use crate::domain::{ModelParameters, ObservationTable};

/// Corrected variance `a²(V + (bI)²)` of a single observation (unscaled).
pub fn corrected_variance(params: ModelParameters, variance: f64, intensity: f64) -> f64 {
    let bi = params.b * intensity;
    params.a * params.a * (variance + bi * bi)
}

/// Corrected, scale-normalised uncertainty `σ'` for every row.
pub fn sigma_prime(params: ModelParameters, table: &ObservationTable) -> Vec<f64> {
    table
        .variance
        .iter()
        .zip(&table.intensity)
        .zip(&table.inverse_scale)
        .map(|((&v, &i), &g)| corrected_variance(params, v, i).sqrt() / g)
        .collect()
}

/// Normalised deviation `δ` for every row.
///
/// `multiplicity` is the group size `n_h` of each row's group.
pub fn normalised_deviations(
    params: ModelParameters,
    table: &ObservationTable,
    multiplicity: &[f64],
) -> Vec<f64> {
    let sigma = sigma_prime(params, table);
    table
        .intensity
        .iter()
        .zip(&table.inverse_scale)
        .zip(&table.ih)
        .zip(multiplicity)
        .zip(&sigma)
        .map(|((((&i, &g), &ih), &n), &s)| ((n - 1.0) / n).sqrt() * (i / g - ih) / s)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_row(i: f64, v: f64, g: f64, ih: f64) -> ObservationTable {
        ObservationTable::new(vec![i], vec![v], vec![g], vec![ih], vec![0]).unwrap()
    }

    #[test]
    fn corrected_variance_adds_intensity_term() {
        let v = corrected_variance(ModelParameters::new(2.0, 0.1), 9.0, 40.0);
        assert!((v - 4.0 * (9.0 + 16.0)).abs() < 1e-12);
        assert_eq!(corrected_variance(ModelParameters::identity(), 9.0, 40.0), 9.0);
    }

    #[test]
    fn sigma_prime_divides_by_inverse_scale() {
        let t = one_row(40.0, 9.0, 2.0, 20.0);
        let s = sigma_prime(ModelParameters::new(2.0, 0.1), &t);
        assert!((s[0] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn deviation_carries_multiplicity_correction() {
        let t = one_row(44.0, 16.0, 2.0, 20.0);
        let d = normalised_deviations(ModelParameters::identity(), &t, &[4.0]);
        // (44/2 - 20) / (4/2) * sqrt(3/4)
        assert!((d[0] - 0.75f64.sqrt()).abs() < 1e-12);
    }
}
