//! The basic two-parameter error model.
//!
//! ```text
//! σ'² = a²(σ² + (bI)²)
//! ```
//!
//! Lifecycle: `Unconfigured → Filtered → Binned → Refining → Finalized`.
//! `configure` filters and bins a table, `update` moves the parameters (driven by
//! a parameter manager), `finalize` freezes them and snapshots a report.
//! `update_variances` only needs the parameters and works in any state.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::binning::{BinVariances, BinningSummary, IntensityBinner};
use crate::domain::{ErrorModelConfig, ModelParameters, ObservationTable, Parameter};
use crate::error::ErrorModelError;
use crate::filter::{FilterOptions, filter_reflections};
use crate::math::expected_normal_scores;
use crate::models::corrected_variance;

/// Only deviations within this many σ of the centre enter the probability plot.
const NORMAL_PLOT_LIMIT: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    Unconfigured,
    Filtered,
    Binned,
    Refining,
    Finalized,
}

/// Sorted deviations against expected normal order statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalProbabilityPlot {
    pub expected: Vec<f64>,
    pub observed: Vec<f64>,
}

impl NormalProbabilityPlot {
    pub fn from_deviations(deltas: &[f64]) -> Self {
        let mut sorted = deltas.to_vec();
        sorted.sort_by(f64::total_cmp);
        let expected = expected_normal_scores(sorted.len());
        let (expected, observed) = expected
            .into_iter()
            .zip(sorted)
            .filter(|(x, _)| x.abs() < NORMAL_PLOT_LIMIT)
            .unzip();
        Self { expected, observed }
    }

    pub fn len(&self) -> usize {
        self.expected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }
}

/// Snapshot taken at `finalize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorModelReport {
    pub parameters: ModelParameters,
    pub refined: Vec<Parameter>,
    pub asymptotic_isigma: Option<f64>,
    pub binning: Option<BinningSummary>,
    pub initial_variances: Option<BinVariances>,
    pub corrected_variances: Option<BinVariances>,
}

#[derive(Debug, Clone)]
pub struct BasicErrorModel {
    parameters: ModelParameters,
    active: Vec<Parameter>,
    min_ih: f64,
    n_bins: usize,
    min_reflections_required: usize,
    state: ModelState,
    binner: Option<IntensityBinner>,
    binning: Option<BinningSummary>,
    normal_plot: NormalProbabilityPlot,
    report: Option<ErrorModelReport>,
}

impl BasicErrorModel {
    /// Build from configuration. Parameters supplied in the config are fixed and
    /// left out of refinement; the others start from their defaults.
    pub fn new(config: &ErrorModelConfig) -> Result<Self, ErrorModelError> {
        let defaults = ModelParameters::default();
        let fixed_a = config.fixed_a();
        let fixed_b = config.fixed_b();
        let parameters =
            ModelParameters::new(fixed_a.unwrap_or(defaults.a), fixed_b.unwrap_or(defaults.b)).validate()?;

        let mut active = Vec::new();
        if fixed_a.is_none() {
            active.push(Parameter::A);
        }
        if fixed_b.is_none() {
            active.push(Parameter::B);
        }

        Ok(Self {
            parameters,
            active,
            min_ih: config.min_ih,
            n_bins: config.n_bins.max(1),
            min_reflections_required: config.min_reflections_required,
            state: ModelState::Unconfigured,
            binner: None,
            binning: None,
            normal_plot: NormalProbabilityPlot::default(),
            report: None,
        })
    }

    /// A model with known parameters and nothing to refine.
    pub fn with_parameters(parameters: ModelParameters) -> Result<Self, ErrorModelError> {
        let config = ErrorModelConfig {
            a: Some(parameters.a),
            b: Some(parameters.b),
            ..ErrorModelConfig::default()
        };
        Self::new(&config)
    }

    /// Filter and bin `table`. On failure the model stays unconfigured.
    pub fn configure(&mut self, table: &ObservationTable, min_partiality: f64) -> Result<(), ErrorModelError> {
        if self.state == ModelState::Finalized {
            return Err(ErrorModelError::Finalized);
        }
        self.state = ModelState::Unconfigured;
        self.binner = None;
        self.binning = None;

        let options = FilterOptions {
            min_ih: self.min_ih,
            min_partiality,
            min_reflections_required: self.min_reflections_required,
        };
        let filtered = filter_reflections(table, &options)?;
        self.state = ModelState::Filtered;

        let mut binner = IntensityBinner::new(filtered, self.min_reflections_required, self.n_bins);
        binner.update(self.parameters);
        self.normal_plot = NormalProbabilityPlot::from_deviations(binner.deltas());
        self.binning = Some(binner.summary().clone());
        self.binner = Some(binner);
        self.state = ModelState::Binned;
        debug!(n_refl = self.n_refl(), "Error model configured");
        Ok(())
    }

    /// Store new parameters and refresh bin variances and the probability plot.
    pub fn update(&mut self, parameters: ModelParameters) -> Result<&BinVariances, ErrorModelError> {
        self.ensure_open()?;
        let parameters = parameters.validate()?;
        let binner = self.binner.as_mut().ok_or(ErrorModelError::NotConfigured)?;
        binner.update(parameters);
        self.normal_plot = NormalProbabilityPlot::from_deviations(binner.deltas());
        self.parameters = parameters;
        self.state = ModelState::Refining;
        Ok(binner.variances())
    }

    /// Evaluate bin variances at trial parameters without committing them.
    pub fn trial(&mut self, parameters: ModelParameters) -> Result<&BinVariances, ErrorModelError> {
        self.ensure_open()?;
        let binner = self.binner.as_mut().ok_or(ErrorModelError::NotConfigured)?;
        Ok(binner.update(parameters))
    }

    /// Freeze parameters and snapshot the report.
    pub fn finalize(&mut self) -> Result<&ErrorModelReport, ErrorModelError> {
        self.ensure_open()?;
        // Bins must reflect the committed parameters, not the last trial.
        if let Some(binner) = self.binner.as_mut() {
            binner.update(self.parameters);
        }
        let report = ErrorModelReport {
            parameters: self.parameters,
            refined: self.active.clone(),
            asymptotic_isigma: self.parameters.asymptotic_isigma(),
            binning: self.binning.clone(),
            initial_variances: self.binner.as_ref().map(|b| b.initial_variances().clone()),
            corrected_variances: self.binner.as_ref().map(|b| b.variances().clone()),
        };
        self.state = ModelState::Finalized;
        info!("{self}");
        if report.binning.is_some() {
            info!("{}", crate::report::format_binned_variances(&report));
        }
        Ok(self.report.insert(report))
    }

    /// Apply the model: `V' = a²(V + (bI)²)`.
    pub fn update_variances(&self, variances: &[f64], intensities: &[f64]) -> Result<Vec<f64>, ErrorModelError> {
        if variances.len() != intensities.len() {
            return Err(ErrorModelError::ColumnLength {
                column: "intensity",
                len: intensities.len(),
                expected: variances.len(),
            });
        }
        Ok(variances
            .iter()
            .zip(intensities)
            .map(|(&v, &i)| corrected_variance(self.parameters, v, i))
            .collect())
    }

    /// Drop the filtered table and incidence. The binning summary and any
    /// report stay available.
    pub fn clear_table(&mut self) {
        self.binner = None;
    }

    pub fn parameters(&self) -> ModelParameters {
        self.parameters
    }

    pub fn active_parameters(&self) -> &[Parameter] {
        &self.active
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    /// Number of reflections used for fitting.
    pub fn n_refl(&self) -> usize {
        self.binning.as_ref().map_or(0, |b| b.n_reflections)
    }

    pub fn binner(&self) -> Option<&IntensityBinner> {
        self.binner.as_ref()
    }

    pub fn binning(&self) -> Option<&BinningSummary> {
        self.binning.as_ref()
    }

    /// Bin variances at the most recently evaluated parameters.
    pub fn bin_variances(&self) -> Result<&BinVariances, ErrorModelError> {
        self.binner
            .as_ref()
            .map(IntensityBinner::variances)
            .ok_or(ErrorModelError::NotConfigured)
    }

    pub fn normal_plot(&self) -> &NormalProbabilityPlot {
        &self.normal_plot
    }

    pub fn report(&self) -> Option<&ErrorModelReport> {
        self.report.as_ref()
    }

    fn ensure_open(&self) -> Result<(), ErrorModelError> {
        if self.state == ModelState::Finalized {
            Err(ErrorModelError::Finalized)
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for BasicErrorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::report::format_model_details(self.parameters))
    }
}
