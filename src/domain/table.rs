//! Column-oriented observation table.
//!
//! One row per reflection observation. Columns are aligned by row index and are
//! validated to have equal length on construction.

use serde::{Deserialize, Serialize};

use crate::error::ErrorModelError;
use crate::math::GroupIncidence;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationTable {
    /// Observed intensity `I`.
    pub intensity: Vec<f64>,
    /// Variance `V` of the observed intensity.
    pub variance: Vec<f64>,
    /// Inverse scale factor `g`.
    pub inverse_scale: Vec<f64>,
    /// Consensus value `Ih` of the row's redundancy group.
    pub ih: Vec<f64>,
    /// Redundancy group label.
    pub group: Vec<usize>,
    pub partiality: Option<Vec<f64>>,
    /// Dataset (sweep) index, used to split the table into error-model groups.
    pub dataset: Option<Vec<usize>>,
}

impl ObservationTable {
    pub fn new(
        intensity: Vec<f64>,
        variance: Vec<f64>,
        inverse_scale: Vec<f64>,
        ih: Vec<f64>,
        group: Vec<usize>,
    ) -> Result<Self, ErrorModelError> {
        let table = Self {
            intensity,
            variance,
            inverse_scale,
            ih,
            group,
            partiality: None,
            dataset: None,
        };
        table.validate()?;
        Ok(table)
    }

    pub fn with_partiality(mut self, partiality: Vec<f64>) -> Result<Self, ErrorModelError> {
        self.partiality = Some(partiality);
        self.validate()?;
        Ok(self)
    }

    pub fn with_dataset(mut self, dataset: Vec<usize>) -> Result<Self, ErrorModelError> {
        self.dataset = Some(dataset);
        self.validate()?;
        Ok(self)
    }

    /// Check every column has as many rows as `intensity`.
    pub fn validate(&self) -> Result<(), ErrorModelError> {
        let expected = self.intensity.len();
        let check = |column: &'static str, len: usize| {
            if len == expected {
                Ok(())
            } else {
                Err(ErrorModelError::ColumnLength { column, len, expected })
            }
        };
        check("variance", self.variance.len())?;
        check("inverse_scale_factor", self.inverse_scale.len())?;
        check("ih", self.ih.len())?;
        check("group", self.group.len())?;
        if let Some(p) = &self.partiality {
            check("partiality", p.len())?;
        }
        if let Some(d) = &self.dataset {
            check("dataset", d.len())?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.intensity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensity.is_empty()
    }

    /// Keep rows where `keep[i]` is true.
    pub fn select(&self, keep: &[bool]) -> Self {
        debug_assert_eq!(keep.len(), self.len());
        fn pick<T: Copy>(col: &[T], keep: &[bool]) -> Vec<T> {
            col.iter().zip(keep).filter(|(_, k)| **k).map(|(v, _)| *v).collect()
        }
        Self {
            intensity: pick(&self.intensity, keep),
            variance: pick(&self.variance, keep),
            inverse_scale: pick(&self.inverse_scale, keep),
            ih: pick(&self.ih, keep),
            group: pick(&self.group, keep),
            partiality: self.partiality.as_deref().map(|p| pick(p, keep)),
            dataset: self.dataset.as_deref().map(|d| pick(d, keep)),
        }
    }

    /// Keep rows whose dataset index is in `datasets`. Tables without a dataset
    /// column are treated as a single dataset `0`.
    pub fn select_datasets(&self, datasets: &[usize]) -> Self {
        let keep: Vec<bool> = self.dataset_ids().iter().map(|d| datasets.contains(d)).collect();
        self.select(&keep)
    }

    /// Dataset index per row (`0` everywhere when the column is absent).
    pub fn dataset_ids(&self) -> Vec<usize> {
        self.dataset.clone().unwrap_or_else(|| vec![0; self.len()])
    }

    /// Distinct dataset indices in ascending order.
    pub fn datasets(&self) -> Vec<usize> {
        let mut ids = self.dataset_ids();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn group_incidence(&self) -> GroupIncidence {
        GroupIncidence::from_labels(&self.group)
    }

    /// Scaled consensus intensity `Ih·g` per row.
    pub fn scaled_ih(&self) -> Vec<f64> {
        self.ih.iter().zip(&self.inverse_scale).map(|(ih, g)| ih * g).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ObservationTable {
        ObservationTable::new(
            vec![10.0, 20.0, 30.0],
            vec![1.0, 2.0, 3.0],
            vec![1.0, 2.0, 0.5],
            vec![11.0, 21.0, 31.0],
            vec![4, 4, 9],
        )
        .unwrap()
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let err = ObservationTable::new(vec![1.0], vec![], vec![1.0], vec![1.0], vec![0]).unwrap_err();
        assert_eq!(
            err,
            ErrorModelError::ColumnLength {
                column: "variance",
                len: 0,
                expected: 1
            }
        );
        assert!(table().with_partiality(vec![1.0]).is_err());
    }

    #[test]
    fn select_subsets_every_column() {
        let t = table().with_dataset(vec![0, 1, 1]).unwrap();
        let s = t.select(&[false, true, true]);
        assert_eq!(s.intensity, vec![20.0, 30.0]);
        assert_eq!(s.group, vec![4, 9]);
        assert_eq!(s.dataset, Some(vec![1, 1]));
        assert_eq!(t.select_datasets(&[0]).len(), 1);
        assert_eq!(t.datasets(), vec![0, 1]);
    }

    #[test]
    fn scaled_ih_multiplies_inverse_scale() {
        assert_eq!(table().scaled_ih(), vec![11.0, 42.0, 15.5]);
    }
}
