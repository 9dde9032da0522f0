//! CSV ingest of observation tables.
//!
//! One row per observation. Required columns:
//! `intensity, variance, inverse_scale_factor, ih, group`; optional:
//! `partiality, dataset`. Group labels are arbitrary strings (e.g. a Miller
//! index) and are compacted to indices in order of first appearance.
//!
//! - Missing required columns fail the whole load (exit code 2).
//! - Unparseable rows are skipped and reported as `RowError`s.
//! - Value screening (non-positive variances etc.) is left to the filter.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;

use crate::domain::ObservationTable;
use crate::error::AppError;

const REQUIRED_COLUMNS: [&str; 5] = ["intensity", "variance", "inverse_scale_factor", "ih", "group"];

/// Accepted spellings per canonical column name.
const ALIASES: [(&str, &str); 6] = [
    ("i", "intensity"),
    ("var", "variance"),
    ("inverse_scale", "inverse_scale_factor"),
    ("g", "inverse_scale_factor"),
    ("miller_index", "group"),
    ("sweep", "dataset"),
];

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub group: Option<String>,
    pub message: String,
}

/// Ingest output: the table, the label of each group index and row errors.
#[derive(Debug, Clone)]
pub struct IngestedObservations {
    pub table: ObservationTable,
    pub group_labels: Vec<String>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

#[derive(Debug, Default)]
struct Columns {
    intensity: Vec<f64>,
    variance: Vec<f64>,
    inverse_scale: Vec<f64>,
    ih: Vec<f64>,
    group: Vec<usize>,
    partiality: Vec<f64>,
    dataset: Vec<usize>,
}

struct ParsedRow {
    intensity: f64,
    variance: f64,
    inverse_scale: f64,
    ih: f64,
    group: String,
    partiality: Option<f64>,
    dataset: Option<usize>,
}

/// Load an observation table from a CSV file.
pub fn load_observations(path: &Path) -> Result<IngestedObservations, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    read_observations(file)
}

/// Parse an observation table from any CSV source.
pub fn read_observations<R: Read>(source: R) -> Result<IngestedObservations, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    for name in REQUIRED_COLUMNS {
        if !header_map.contains_key(name) {
            return Err(AppError::new(2, format!("Missing required column: `{name}`")));
        }
    }
    let has_partiality = header_map.contains_key("partiality");
    let has_dataset = header_map.contains_key("dataset");

    let mut columns = Columns::default();
    let mut labels: HashMap<String, usize> = HashMap::new();
    let mut group_labels = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    group: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let row = match parse_row(&record, &header_map, has_partiality, has_dataset) {
            Ok(row) => row,
            Err(message) => {
                row_errors.push(RowError {
                    line,
                    group: get_optional(&record, &header_map, "group").map(str::to_string),
                    message,
                });
                continue;
            }
        };

        let next = labels.len();
        let group = *labels.entry(row.group.clone()).or_insert_with(|| {
            group_labels.push(row.group.clone());
            next
        });

        columns.intensity.push(row.intensity);
        columns.variance.push(row.variance);
        columns.inverse_scale.push(row.inverse_scale);
        columns.ih.push(row.ih);
        columns.group.push(group);
        if let Some(p) = row.partiality {
            columns.partiality.push(p);
        }
        if let Some(d) = row.dataset {
            columns.dataset.push(d);
        }
    }

    let rows_used = columns.intensity.len();
    if rows_used == 0 {
        return Err(AppError::new(3, "No valid observation rows in CSV."));
    }

    let mut table = ObservationTable::new(
        columns.intensity,
        columns.variance,
        columns.inverse_scale,
        columns.ih,
        columns.group,
    )?;
    if has_partiality {
        table = table.with_partiality(columns.partiality)?;
    }
    if has_dataset {
        table = table.with_dataset(columns.dataset)?;
    }

    Ok(IngestedObservations {
        table,
        group_labels,
        row_errors,
        rows_read,
        rows_used,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports may prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    let name: String = name
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c.to_ascii_lowercase() })
        .collect();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map_or(name, |(_, canonical)| canonical.to_string())
}

fn parse_row(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
    has_partiality: bool,
    has_dataset: bool,
) -> Result<ParsedRow, String> {
    let group = get_required(record, header_map, "group")?.to_string();
    let partiality = if has_partiality {
        Some(parse_f64(get_required(record, header_map, "partiality")?, "partiality")?)
    } else {
        None
    };
    let dataset = if has_dataset {
        let raw = get_required(record, header_map, "dataset")?;
        Some(
            raw.parse::<usize>()
                .map_err(|_| format!("Invalid `dataset` value: '{raw}'"))?,
        )
    } else {
        None
    };

    Ok(ParsedRow {
        intensity: parse_f64(get_required(record, header_map, "intensity")?, "intensity")?,
        variance: parse_f64(get_required(record, header_map, "variance")?, "variance")?,
        inverse_scale: parse_f64(
            get_required(record, header_map, "inverse_scale_factor")?,
            "inverse_scale_factor",
        )?,
        ih: parse_f64(get_required(record, header_map, "ih")?, "ih")?,
        group,
        partiality,
        dataset,
    })
}

fn parse_f64(s: &str, name: &str) -> Result<f64, String> {
    s.parse::<f64>()
        .map_err(|_| format!("Invalid `{name}` value: '{s}'"))
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}
