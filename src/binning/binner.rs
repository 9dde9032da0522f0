//! Adaptive intensity binning with incremental variance updates.
//!
//! Construction (once per configured table):
//!
//! 1. rank rows by scaled intensity `s = Ih·g`, highest first
//! 2. lay `n_bins + 1` boundaries evenly in `ln s` between `max s` and
//!    `max(1, min s)`; the last boundary is `min s − 0.01`
//! 3. walk the bins from the top; a bin holding fewer than `min_per_bin` rows
//!    lowers its lower boundary to take in the next ranked rows
//! 4. prune bins with fewer than `min_per_bin − 5` rows, folding their rows into
//!    the neighbouring retained bin
//!
//! The resulting row → bin incidence never changes. `update` only recomputes the
//! deviations and the per-bin variance `E[δ²] − E[δ]²`.

use tracing::debug;

use crate::binning::{BinVariances, BinningSummary};
use crate::domain::{ModelParameters, ObservationTable};
use crate::math::GroupIncidence;
use crate::models::normalised_deviations;

/// Bins falling this far below `min_per_bin` are pruned.
const PRUNE_SLACK: usize = 5;
/// The lowest boundary sits this far below the weakest scaled intensity.
const LOWER_EDGE_OFFSET: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct IntensityBinner {
    table: ObservationTable,
    multiplicity: Vec<f64>,
    bins: GroupIncidence,
    summary: BinningSummary,
    /// Per-bin mean of `I²/V`, the regressor for the variance regression.
    mean_i2_over_v: Vec<f64>,
    deltas: Vec<f64>,
    initial: BinVariances,
    current: BinVariances,
}

impl IntensityBinner {
    pub fn new(table: ObservationTable, min_reflections_required: usize, n_bins: usize) -> Self {
        let scaled = table.scaled_ih();
        let (bins, summary) = assign_bins(&scaled, min_reflections_required, n_bins);

        let multiplicity: Vec<f64> = table
            .group_incidence()
            .row_counts()
            .into_iter()
            .map(|n| n as f64)
            .collect();
        let i2_over_v: Vec<f64> = table
            .intensity
            .iter()
            .zip(&table.variance)
            .map(|(i, v)| i * i / v)
            .collect();
        let mean_i2_over_v = bins.mean(&i2_over_v);

        debug!(
            n_reflections = summary.n_reflections,
            n_bins = summary.n_bins(),
            requested = summary.requested_bins,
            min_per_bin = summary.min_per_bin,
            "Binned reflections by intensity"
        );

        let identity = ModelParameters::identity();
        let deltas = normalised_deviations(identity, &table, &multiplicity);
        let initial = BinVariances {
            parameters: identity,
            variances: bin_variances(&bins, &deltas),
        };

        Self {
            table,
            multiplicity,
            bins,
            summary,
            mean_i2_over_v,
            deltas,
            current: initial.clone(),
            initial,
        }
    }

    /// Recompute deviations and bin variances for new parameters.
    pub fn update(&mut self, params: ModelParameters) -> &BinVariances {
        self.deltas = normalised_deviations(params, &self.table, &self.multiplicity);
        self.current = BinVariances {
            parameters: params,
            variances: bin_variances(&self.bins, &self.deltas),
        };
        &self.current
    }

    pub fn table(&self) -> &ObservationTable {
        &self.table
    }

    pub fn summary(&self) -> &BinningSummary {
        &self.summary
    }

    pub fn incidence(&self) -> &GroupIncidence {
        &self.bins
    }

    pub fn deltas(&self) -> &[f64] {
        &self.deltas
    }

    /// Bin variances at `(a, b) = (1, 0)`.
    pub fn initial_variances(&self) -> &BinVariances {
        &self.initial
    }

    /// Bin variances at the parameters of the last `update`.
    pub fn variances(&self) -> &BinVariances {
        &self.current
    }

    pub fn mean_i2_over_v(&self) -> &[f64] {
        &self.mean_i2_over_v
    }
}

/// `Σδ²/n − (Σδ)²/n²` per bin.
fn bin_variances(bins: &GroupIncidence, deltas: &[f64]) -> Vec<f64> {
    let sq: Vec<f64> = deltas.iter().map(|d| d * d).collect();
    let sum = bins.sum(deltas);
    let sum_sq = bins.sum(&sq);
    bins.counts()
        .iter()
        .zip(sum.iter().zip(&sum_sq))
        .map(|(&n, (s, s2))| {
            let n = n as f64;
            s2 / n - (s / n).powi(2)
        })
        .collect()
}

fn assign_bins(
    scaled: &[f64],
    min_reflections_required: usize,
    n_bins: usize,
) -> (GroupIncidence, BinningSummary) {
    let n = scaled.len();
    let requested_bins = n_bins.max(1);
    if n == 0 {
        let summary = BinningSummary {
            boundaries: Vec::new(),
            occupancy: Vec::new(),
            mean_intensity: Vec::new(),
            n_reflections: 0,
            requested_bins,
            min_per_bin: 0,
        };
        return (GroupIncidence::from_columns(Vec::new(), 0), summary);
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scaled[b].total_cmp(&scaled[a]));

    let mut required = min_reflections_required;
    if n > 100 * required {
        required = n / 100;
    }
    let min_per_bin = required.min(n / (3 * requested_bins));

    let s_max = scaled[order[0]];
    let s_min = scaled[order[n - 1]];
    let lower_edge = s_min - LOWER_EDGE_OFFSET;
    let ln_max = s_max.ln();
    let step = (ln_max - s_min.max(1.0).ln()) / requested_bins as f64;
    let mut boundaries: Vec<f64> = (0..=requested_bins)
        .map(|k| match k {
            0 => s_max,
            k if k == requested_bins => lower_edge,
            k => (ln_max - k as f64 * step).exp(),
        })
        .collect();

    let mut row_bin = vec![0usize; n];
    let mut cursor = 0;
    for k in 0..requested_bins {
        let upper = boundaries[k];
        let last = k + 1 == requested_bins;
        let mut lower = if last { lower_edge } else { boundaries[k + 1].min(upper) };

        let mut end = advance(scaled, &order, cursor, lower);
        if !last && end - cursor < min_per_bin && cursor + min_per_bin < n {
            lower = scaled[order[cursor + min_per_bin]];
            end = advance(scaled, &order, cursor, lower);
        }
        boundaries[k + 1] = lower;

        for &row in &order[cursor..end] {
            row_bin[row] = k;
        }
        cursor = end;
    }

    let raw = GroupIncidence::from_columns(row_bin, requested_bins);
    let (mapping, retained) = prune_bins(raw.counts(), min_per_bin);
    let bins = raw.remap(&mapping, retained.len());

    let mut pruned_boundaries: Vec<f64> = retained.iter().map(|&(first, _)| boundaries[first]).collect();
    pruned_boundaries.push(lower_edge);

    let summary = BinningSummary {
        boundaries: pruned_boundaries,
        occupancy: bins.counts().to_vec(),
        mean_intensity: bins.mean(scaled),
        n_reflections: n,
        requested_bins,
        min_per_bin,
    };
    (bins, summary)
}

/// First rank at or after `from` whose scaled intensity is not above `lower`.
fn advance(scaled: &[f64], order: &[usize], from: usize, lower: f64) -> usize {
    let mut end = from;
    while end < order.len() && scaled[order[end]] > lower {
        end += 1;
    }
    end
}

/// Decide which bins survive and where the rows of pruned bins go.
///
/// Returns the old → new bin mapping and, per retained bin, the `(first, last)`
/// range of original bins it absorbed. Pruned bins join the retained bin above
/// them; pruned bins before the first retained one join that one.
fn prune_bins(counts: &[usize], min_per_bin: usize) -> (Vec<usize>, Vec<(usize, usize)>) {
    let threshold = min_per_bin.saturating_sub(PRUNE_SLACK);
    let mut keep: Vec<bool> = counts.iter().map(|&c| c > 0 && c >= threshold).collect();
    if !keep.iter().any(|&k| k) {
        if let Some(first) = counts.iter().position(|&c| c > 0) {
            keep[first] = true;
        }
    }

    let mut mapping = vec![0usize; counts.len()];
    let mut retained: Vec<(usize, usize)> = Vec::new();
    for (k, &kept) in keep.iter().enumerate() {
        if kept {
            // The first retained bin also absorbs any pruned bins above it.
            let first = if retained.is_empty() { 0 } else { k };
            retained.push((first, k));
        } else if let Some(last) = retained.last_mut() {
            last.1 = k;
        }
        mapping[k] = retained.len().saturating_sub(1);
    }
    (mapping, retained)
}
