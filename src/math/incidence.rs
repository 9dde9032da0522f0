//! Sparse row → column incidence.
//!
//! Rows are observations, columns are redundancy groups (filtering) or intensity
//! bins (binning). Every row belongs to exactly one column, so the 0/1 matrix is
//! stored as one column index per row plus per-column counts. Grouped sums are a
//! single scatter-add pass over the rows.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct GroupIncidence {
    row_cols: Vec<usize>,
    counts: Vec<usize>,
}

impl GroupIncidence {
    /// Build from arbitrary group labels, numbering columns in order of first
    /// appearance.
    pub fn from_labels(labels: &[usize]) -> Self {
        let mut index: HashMap<usize, usize> = HashMap::new();
        let mut row_cols = Vec::with_capacity(labels.len());
        let mut counts = Vec::new();
        for &label in labels {
            let next = index.len();
            let col = *index.entry(label).or_insert(next);
            if col == counts.len() {
                counts.push(0);
            }
            counts[col] += 1;
            row_cols.push(col);
        }
        Self { row_cols, counts }
    }

    /// Build from explicit column indices. Columns without rows get a zero count.
    pub fn from_columns(row_cols: Vec<usize>, n_cols: usize) -> Self {
        let n_cols = row_cols.iter().map(|&c| c + 1).max().unwrap_or(0).max(n_cols);
        let mut counts = vec![0; n_cols];
        for &c in &row_cols {
            counts[c] += 1;
        }
        Self { row_cols, counts }
    }

    pub fn n_rows(&self) -> usize {
        self.row_cols.len()
    }

    pub fn n_cols(&self) -> usize {
        self.counts.len()
    }

    pub fn column_of(&self, row: usize) -> usize {
        self.row_cols[row]
    }

    pub fn row_columns(&self) -> &[usize] {
        &self.row_cols
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Per-column sums of a per-row quantity.
    pub fn sum(&self, values: &[f64]) -> Vec<f64> {
        debug_assert_eq!(values.len(), self.row_cols.len());
        let mut out = vec![0.0; self.counts.len()];
        for (&c, &v) in self.row_cols.iter().zip(values) {
            out[c] += v;
        }
        out
    }

    /// Per-column means; empty columns give NaN.
    pub fn mean(&self, values: &[f64]) -> Vec<f64> {
        self.sum(values)
            .into_iter()
            .zip(&self.counts)
            .map(|(s, &n)| if n > 0 { s / n as f64 } else { f64::NAN })
            .collect()
    }

    /// Spread a per-column quantity back onto rows.
    pub fn expand<T: Copy>(&self, per_col: &[T]) -> Vec<T> {
        self.row_cols.iter().map(|&c| per_col[c]).collect()
    }

    /// Row counts of each row's column (the group multiplicity for every row).
    pub fn row_counts(&self) -> Vec<usize> {
        self.expand(&self.counts)
    }

    /// Re-target columns: column `c` becomes `mapping[c]` in a structure with
    /// `n_new` columns. Used to merge pruned bins into their neighbours.
    pub fn remap(&self, mapping: &[usize], n_new: usize) -> Self {
        let row_cols = self.row_cols.iter().map(|&c| mapping[c]).collect();
        Self::from_columns(row_cols, n_new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_compacted_in_order_of_appearance() {
        let inc = GroupIncidence::from_labels(&[7, 3, 7, 9, 3, 7]);
        assert_eq!(inc.n_cols(), 3);
        assert_eq!(inc.row_columns(), &[0, 1, 0, 2, 1, 0]);
        assert_eq!(inc.counts(), &[3, 2, 1]);
        assert_eq!(inc.row_counts(), vec![3, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn sums_and_means_are_grouped() {
        let inc = GroupIncidence::from_labels(&[0, 1, 0, 1]);
        assert_eq!(inc.sum(&[1.0, 2.0, 3.0, 4.0]), vec![4.0, 6.0]);
        assert_eq!(inc.mean(&[1.0, 2.0, 3.0, 4.0]), vec![2.0, 3.0]);
        assert_eq!(inc.expand(&[10.0, 20.0]), vec![10.0, 20.0, 10.0, 20.0]);
    }

    #[test]
    fn remap_merges_columns() {
        let inc = GroupIncidence::from_columns(vec![0, 1, 2, 2], 4);
        assert_eq!(inc.counts(), &[1, 1, 2, 0]);
        let merged = inc.remap(&[0, 0, 1, 1], 2);
        assert_eq!(merged.counts(), &[2, 2]);
        assert_eq!(merged.row_columns(), &[0, 0, 1, 1]);
    }
}
