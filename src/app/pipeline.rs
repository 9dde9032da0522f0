//! Error-model estimation over a whole observation table.
//!
//! The table is partitioned by dataset according to the configured grouping;
//! each group gets its own model which is configured, refined and finalised
//! independently (in parallel). Groups with too little data, or whose
//! refinement diverges, are logged and still contribute corrected variances:
//! uncorrected for the former, starting parameters for the latter.

use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{ErrorModelConfig, ErrorModelKind, Grouping, ModelParameters, ObservationTable};
use crate::error::{AppError, ErrorModelError};
use crate::fit::{RefinementOutcome, refine};
use crate::model::{BasicErrorModel, ErrorModelReport, NormalProbabilityPlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    /// Model refined (or fixed) and finalised.
    Fitted,
    /// Too few usable reflections; variances left uncorrected.
    Skipped,
    /// Refinement diverged; starting parameters applied.
    Failed,
}

/// Result for one group of datasets.
#[derive(Debug, Clone)]
pub struct GroupOutcome {
    pub datasets: Vec<usize>,
    pub status: GroupStatus,
    pub message: Option<String>,
    /// Parameters used for the corrected variances.
    pub parameters: ModelParameters,
    pub refinement: Option<RefinementOutcome>,
    pub report: Option<ErrorModelReport>,
    pub normal_plot: NormalProbabilityPlot,
    /// Row indices into the input table.
    pub rows: Vec<usize>,
    pub corrected: Vec<f64>,
}

/// All computed outputs of one run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub groups: Vec<GroupOutcome>,
    /// Corrected variance per input row.
    pub corrected_variances: Vec<f64>,
}

/// Split `datasets` into model groups.
///
/// For `Grouped`, each listed dataset belongs to the first group naming it;
/// datasets not present in the table are ignored and datasets never listed
/// share one extra group.
pub fn partition_datasets(datasets: &[usize], grouping: Grouping, groups: &[Vec<usize>]) -> Vec<Vec<usize>> {
    match grouping {
        Grouping::Combined => vec![datasets.to_vec()],
        Grouping::Individual => datasets.iter().map(|&d| vec![d]).collect(),
        Grouping::Grouped => {
            let mut listed = HashSet::new();
            let mut out = Vec::new();
            for group in groups {
                let members: Vec<usize> = group
                    .iter()
                    .copied()
                    .filter(|d| datasets.contains(d) && listed.insert(*d))
                    .collect();
                if !members.is_empty() {
                    out.push(members);
                }
            }
            let rest: Vec<usize> = datasets.iter().copied().filter(|d| !listed.contains(d)).collect();
            if !rest.is_empty() {
                out.push(rest);
            }
            out
        }
    }
}

/// Estimate error models for every group and correct all variances.
pub fn run_error_models(table: &ObservationTable, config: &ErrorModelConfig) -> Result<RunOutput, AppError> {
    table.validate()?;
    if config.error_model == ErrorModelKind::None {
        info!("No error model requested; variances left unchanged.");
        return Ok(RunOutput {
            groups: Vec::new(),
            corrected_variances: table.variance.clone(),
        });
    }

    let partition = partition_datasets(&table.datasets(), config.grouping, &config.error_model_group);
    info!(groups = partition.len(), grouping = ?config.grouping, "Running error models");

    let groups = partition
        .par_iter()
        .map(|datasets| run_group(table, datasets, config))
        .collect::<Result<Vec<_>, _>>()?;

    let mut corrected_variances = table.variance.clone();
    for group in &groups {
        for (&row, &v) in group.rows.iter().zip(&group.corrected) {
            corrected_variances[row] = v;
        }
    }

    Ok(RunOutput {
        groups,
        corrected_variances,
    })
}

fn run_group(
    table: &ObservationTable,
    datasets: &[usize],
    config: &ErrorModelConfig,
) -> Result<GroupOutcome, ErrorModelError> {
    let rows: Vec<usize> = table
        .dataset_ids()
        .iter()
        .enumerate()
        .filter(|(_, d)| datasets.contains(d))
        .map(|(r, _)| r)
        .collect();
    let sub = table.select_datasets(datasets);

    let mut model = BasicErrorModel::new(config)?;
    let start = model.parameters();

    if let Err(err) = model.configure(&sub, config.min_partiality) {
        return match err {
            ErrorModelError::InsufficientData { .. } => {
                warn!(?datasets, "{err}");
                Ok(GroupOutcome {
                    datasets: datasets.to_vec(),
                    status: GroupStatus::Skipped,
                    message: Some(err.to_string()),
                    parameters: ModelParameters::identity(),
                    refinement: None,
                    report: None,
                    normal_plot: NormalProbabilityPlot::default(),
                    rows,
                    corrected: sub.variance,
                })
            }
            other => Err(other),
        };
    }

    let (status, message, refinement) = match refine(&mut model, config.minimisation, &config.refine) {
        Ok(outcome) => (GroupStatus::Fitted, None, Some(outcome)),
        Err(
            err @ (ErrorModelError::NegativeParameter { .. }
            | ErrorModelError::Regression(_)
            | ErrorModelError::Minimiser(_)),
        ) => {
            warn!(?datasets, "{err} Using starting parameters a = {}, b = {}.", start.a, start.b);
            model.update(start)?;
            (GroupStatus::Failed, Some(err.to_string()), None)
        }
        Err(err) => return Err(err),
    };

    model.finalize()?;
    let corrected = model.update_variances(&sub.variance, &sub.intensity)?;
    model.clear_table();

    Ok(GroupOutcome {
        datasets: datasets.to_vec(),
        status,
        message,
        parameters: model.parameters(),
        refinement,
        report: model.report().cloned(),
        normal_plot: model.normal_plot().clone(),
        rows,
        corrected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SampleSpec, generate_table};
    use crate::domain::Minimisation;

    #[test]
    fn partition_follows_grouping() {
        let ds = [0, 1, 2, 3];
        assert_eq!(partition_datasets(&ds, Grouping::Combined, &[]), vec![vec![0, 1, 2, 3]]);
        assert_eq!(
            partition_datasets(&ds, Grouping::Individual, &[]),
            vec![vec![0], vec![1], vec![2], vec![3]]
        );
        assert_eq!(
            partition_datasets(&ds, Grouping::Grouped, &[vec![2, 0], vec![0, 9]]),
            vec![vec![2, 0], vec![1, 3]]
        );
        assert_eq!(
            partition_datasets(&ds, Grouping::Grouped, &[vec![0, 1, 2, 3]]),
            vec![vec![0, 1, 2, 3]]
        );
    }

    #[test]
    fn no_error_model_leaves_variances() {
        let table = generate_table(&SampleSpec::default()).unwrap();
        let config = ErrorModelConfig {
            error_model: ErrorModelKind::None,
            ..ErrorModelConfig::default()
        };
        let run = run_error_models(&table, &config).unwrap();
        assert!(run.groups.is_empty());
        assert_eq!(run.corrected_variances, table.variance);
    }

    #[test]
    fn individual_grouping_fits_each_dataset() {
        let spec = SampleSpec {
            n_groups: 400,
            n_datasets: 2,
            ..SampleSpec::default()
        };
        let table = generate_table(&spec).unwrap();
        let config = ErrorModelConfig {
            grouping: Grouping::Individual,
            ..ErrorModelConfig::default()
        };
        let run = run_error_models(&table, &config).unwrap();
        assert_eq!(run.groups.len(), 2);
        let ids = table.dataset_ids();
        for group in &run.groups {
            assert_eq!(group.status, GroupStatus::Fitted);
            assert_eq!(group.rows.len(), 1000);
            assert_eq!(group.corrected.len(), group.rows.len());
            assert!(group.rows.iter().all(|&r| group.datasets.contains(&ids[r])));
            assert!(group.report.is_some());
        }
        // Every row was corrected with a > 1.
        assert!(
            run.corrected_variances
                .iter()
                .zip(&table.variance)
                .all(|(c, v)| c > v)
        );
    }

    #[test]
    fn small_groups_are_skipped_and_uncorrected() {
        let spec = SampleSpec {
            n_groups: 20,
            ..SampleSpec::default()
        };
        let table = generate_table(&spec).unwrap();
        let config = ErrorModelConfig {
            minimisation: Minimisation::Regression,
            ..ErrorModelConfig::default()
        };
        let run = run_error_models(&table, &config).unwrap();
        assert_eq!(run.groups.len(), 1);
        assert_eq!(run.groups[0].status, GroupStatus::Skipped);
        assert_eq!(run.groups[0].parameters, ModelParameters::identity());
        assert_eq!(run.corrected_variances, table.variance);
    }
}
