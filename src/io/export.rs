//! Export observation tables to CSV.
//!
//! The layout matches what `ingest` reads, so a simulated table or a table
//! with corrected variances can be fed straight back in.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::ObservationTable;
use crate::error::AppError;

/// Write `table` to a CSV file, optionally with a `corrected_variance` column.
pub fn write_observations_csv(
    path: &Path,
    table: &ObservationTable,
    corrected: Option<&[f64]>,
) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    write_observations(BufWriter::new(file), table, corrected)
}

/// Write `table` as CSV to any sink.
pub fn write_observations<W: Write>(
    mut out: W,
    table: &ObservationTable,
    corrected: Option<&[f64]>,
) -> Result<(), AppError> {
    if let Some(c) = corrected.filter(|c| c.len() != table.len()) {
        return Err(AppError::new(
            4,
            format!("{} corrected variances for {} rows.", c.len(), table.len()),
        ));
    }

    let mut header = String::from("intensity,variance,inverse_scale_factor,ih,group,dataset");
    if table.partiality.is_some() {
        header.push_str(",partiality");
    }
    if corrected.is_some() {
        header.push_str(",corrected_variance");
    }
    writeln!(out, "{header}").map_err(|e| AppError::new(2, format!("Failed to write export CSV header: {e}")))?;

    let datasets = table.dataset_ids();
    for r in 0..table.len() {
        let mut line = format!(
            "{:.6},{:.6},{:.6},{:.6},{},{}",
            table.intensity[r], table.variance[r], table.inverse_scale[r], table.ih[r], table.group[r], datasets[r],
        );
        if let Some(p) = &table.partiality {
            line.push_str(&format!(",{:.4}", p[r]));
        }
        if let Some(c) = corrected {
            line.push_str(&format!(",{:.6}", c[r]));
        }
        writeln!(out, "{line}").map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }

    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::read_observations;

    #[test]
    fn export_can_be_ingested_again() {
        let table = ObservationTable::new(
            vec![100.0, 90.0, 40.0],
            vec![95.0, 95.0, 38.0],
            vec![1.0, 1.0, 0.5],
            vec![96.0, 96.0, 41.0],
            vec![0, 0, 1],
        )
        .unwrap()
        .with_partiality(vec![1.0, 0.75, 0.5])
        .unwrap();

        let mut buf = Vec::new();
        write_observations(&mut buf, &table, Some(&[110.0, 109.0, 40.0])).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("intensity,variance,inverse_scale_factor,ih,group,dataset,partiality,corrected_variance\n"));
        assert!(text.contains("40.000000,38.000000,0.500000,41.000000,1,0,0.5000,40.000000"));

        let back = read_observations(text.as_bytes()).unwrap();
        assert_eq!(back.table.group, table.group);
        assert_eq!(back.table.partiality, table.partiality);
        assert_eq!(back.table.dataset, Some(vec![0, 0, 0]));
    }

    #[test]
    fn corrected_length_must_match() {
        let table = ObservationTable::new(vec![1.0], vec![1.0], vec![1.0], vec![1.0], vec![0]).unwrap();
        let err = write_observations(Vec::new(), &table, Some(&[])).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
