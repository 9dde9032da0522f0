//! Selection of reflections suitable for error-model fitting.
//!
//! Steps run in order; each works on the survivors of the previous one:
//!
//! 0. drop rows that cannot define a deviation (non-finite values, `V <= 0`, `g <= 0`)
//! 1. partiality above `min_partiality` (when present)
//! 2. groups with mean `I/V > 0.85`
//! 3. multiplicity and scaled intensity `Ih·g` on the survivors
//! 4. `Ih·g > min_Ih`, `n_h > 1`, `I > 0.001`
//! 5. recompute `n_h`, again require `n_h > 1`
//! 6. drop groups whose internal scatter is far above what their variances predict
//! 7. fail if fewer than `min_reflections_required` rows remain

use tracing::debug;

use crate::domain::{DEFAULT_MIN_IH, DEFAULT_MIN_PARTIALITY, DEFAULT_MIN_REFLECTIONS, ObservationTable};
use crate::error::ErrorModelError;

/// Minimum mean `I/V` over a group.
const MIN_GROUP_I_OVER_V: f64 = 0.85;
/// Minimum intensity of an individual observation.
const MIN_INTENSITY: f64 = 0.001;
/// Floor of the group scatter-ratio cut-off.
const MIN_RATIO_CUTOFF: f64 = 50.0;
/// The cut-off grows as `max(Ih) / RATIO_INTENSITY_DIVISOR` for strong data.
const RATIO_INTENSITY_DIVISOR: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterOptions {
    pub min_ih: f64,
    pub min_partiality: f64,
    pub min_reflections_required: usize,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            min_ih: DEFAULT_MIN_IH,
            min_partiality: DEFAULT_MIN_PARTIALITY,
            min_reflections_required: DEFAULT_MIN_REFLECTIONS,
        }
    }
}

/// Filter `table` down to reflections usable for error-model fitting.
///
/// The input is not modified. Fails with `InsufficientData` when fewer than
/// `min_reflections_required` rows survive.
pub fn filter_reflections(
    table: &ObservationTable,
    options: &FilterOptions,
) -> Result<ObservationTable, ErrorModelError> {
    let n_input = table.len();

    // 0 + 1
    let keep: Vec<bool> = (0..table.len())
        .map(|i| {
            let (v, g) = (table.variance[i], table.inverse_scale[i]);
            let finite = table.intensity[i].is_finite() && v.is_finite() && g.is_finite() && table.ih[i].is_finite();
            let partial_ok = table
                .partiality
                .as_ref()
                .is_none_or(|p| p[i] > options.min_partiality);
            finite && v > 0.0 && g > 0.0 && partial_ok
        })
        .collect();
    let table = table.select(&keep);

    // 2
    let groups = table.group_incidence();
    let i_over_v: Vec<f64> = table.intensity.iter().zip(&table.variance).map(|(i, v)| i / v).collect();
    let group_ok: Vec<bool> = groups.mean(&i_over_v).into_iter().map(|m| m > MIN_GROUP_I_OVER_V).collect();
    let table = table.select(&groups.expand(&group_ok));

    // 3 + 4
    let n_h = table.group_incidence().row_counts();
    let scaled = table.scaled_ih();
    let keep: Vec<bool> = (0..table.len())
        .map(|i| scaled[i] > options.min_ih && n_h[i] > 1 && table.intensity[i] > MIN_INTENSITY)
        .collect();
    let table = table.select(&keep);

    // 5
    let n_h = table.group_incidence().row_counts();
    let keep: Vec<bool> = n_h.iter().map(|&n| n > 1).collect();
    let table = table.select(&keep);

    // 6
    let table = drop_high_scatter_groups(&table);

    debug!(
        n_input,
        n_selected = table.len(),
        "Selected reflections for error model analysis"
    );

    if table.len() < options.min_reflections_required {
        return Err(ErrorModelError::InsufficientData {
            actual: table.len(),
            required: options.min_reflections_required,
        });
    }
    Ok(table)
}

/// Ratio of observed intra-group variance to the mean expected variance:
///
/// ```text
/// [Σ (I/g − Ih)² / (n_h − 1)] / [Σ (V/g²) / n_h]
/// ```
///
/// Groups whose ratio is not below `max(50, max(Ih)/40)` are removed.
fn drop_high_scatter_groups(table: &ObservationTable) -> ObservationTable {
    if table.is_empty() {
        return table.clone();
    }
    let groups = table.group_incidence();
    let sq_dev: Vec<f64> = (0..table.len())
        .map(|i| (table.intensity[i] / table.inverse_scale[i] - table.ih[i]).powi(2))
        .collect();
    let scaled_var: Vec<f64> = (0..table.len())
        .map(|i| table.variance[i] / table.inverse_scale[i].powi(2))
        .collect();

    let scatter = groups.sum(&sq_dev);
    let expected = groups.sum(&scaled_var);
    let max_ih = table.ih.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let cutoff = MIN_RATIO_CUTOFF.max(max_ih / RATIO_INTENSITY_DIVISOR);

    let group_ok: Vec<bool> = groups
        .counts()
        .iter()
        .enumerate()
        .map(|(c, &n)| {
            let n = n as f64;
            let ratio = (scatter[c] / (n - 1.0)) / (expected[c] / n);
            ratio < cutoff
        })
        .collect();

    let n_excluded = group_ok.iter().filter(|ok| !**ok).count();
    debug!(
        n_excluded,
        cutoff, "Excluded groups with high internal variance from error model analysis"
    );

    table.select(&groups.expand(&group_ok))
}
