//! Fitted error models as JSON.
//!
//! One entry per dataset group: the parameters applied, the asymptotic I/σ
//! and, for groups that were fitted, the finalised report with its bins.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::pipeline::{GroupStatus, RunOutput};
use crate::domain::{ErrorModelConfig, ModelParameters};
use crate::error::AppError;
use crate::fit::RefinementOutcome;
use crate::model::ErrorModelReport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub tool: String,
    pub created_at: DateTime<Utc>,
    pub config: ErrorModelConfig,
    pub groups: Vec<GroupModel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupModel {
    pub datasets: Vec<usize>,
    pub status: GroupStatus,
    pub n_observations: usize,
    pub parameters: ModelParameters,
    pub asymptotic_isigma: Option<f64>,
    pub refinement: Option<RefinementOutcome>,
    pub report: Option<ErrorModelReport>,
}

impl ModelFile {
    pub fn from_run(run: &RunOutput, config: &ErrorModelConfig, created_at: DateTime<Utc>) -> Self {
        let groups = run
            .groups
            .iter()
            .map(|g| GroupModel {
                datasets: g.datasets.clone(),
                status: g.status,
                n_observations: g.rows.len(),
                parameters: g.parameters,
                asymptotic_isigma: g.parameters.asymptotic_isigma(),
                refinement: g.refinement,
                report: g.report.clone(),
            })
            .collect();
        Self {
            tool: "errmod".to_string(),
            created_at,
            config: config.clone(),
            groups,
        }
    }
}

/// Write the fitted models of `run` as pretty JSON.
pub fn write_model_json(path: &Path, run: &RunOutput, config: &ErrorModelConfig) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create model JSON '{}': {e}", path.display())))?;
    let model = ModelFile::from_run(run, config, Utc::now());
    serde_json::to_writer_pretty(file, &model)
        .map_err(|e| AppError::new(2, format!("Failed to write model JSON: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::run_error_models;
    use crate::data::{SampleSpec, generate_table};
    use chrono::TimeZone;

    #[test]
    fn model_file_serialises_groups() {
        let table = generate_table(&SampleSpec::default()).unwrap();
        let config = ErrorModelConfig::default();
        let run = run_error_models(&table, &config).unwrap();
        let created = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let file = ModelFile::from_run(&run, &config, created);

        assert_eq!(file.groups.len(), 1);
        assert_eq!(file.groups[0].n_observations, table.len());
        assert_eq!(file.groups[0].status, GroupStatus::Fitted);

        let json = serde_json::to_string(&file).unwrap();
        assert!(json.contains("\"created_at\":\"2025-01-01T00:00:00Z\""));
        assert!(json.contains("\"status\":\"fitted\""));
        let back: ModelFile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.groups[0].parameters, file.groups[0].parameters);
    }
}
