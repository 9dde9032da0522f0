//! Command-line parsing for the error-model estimator.
//!
//! Argument parsing and command dispatch stay separate from the modelling
//! code; `app` turns these structs into `ErrorModelConfig` / `SampleSpec`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::data::{IntensityLayout, NoiseKind};
use crate::domain::{
    DEFAULT_MIN_IH, DEFAULT_MIN_PARTIALITY, DEFAULT_MIN_REFLECTIONS, DEFAULT_N_BINS, ErrorModelKind, Grouping,
    Minimisation,
};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "errmod", version, about = "Error model estimation for scaled diffraction intensities")]
pub struct Cli {
    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit error models to an observation CSV, print diagnostics, and optionally plot/export.
    Fit(FitArgs),
    /// Write a synthetic observation CSV drawn from a known error model.
    Simulate(SimulateArgs),
    /// Simulate a table and fit it in memory.
    Demo(DemoArgs),
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Observation CSV (intensity, variance, inverse_scale_factor, ih, group[, partiality, dataset]).
    #[arg(long, value_name = "CSV")]
    pub input: PathBuf,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub sample: SampleArgs,

    /// Destination CSV.
    #[arg(long, value_name = "CSV")]
    pub output: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    #[command(flatten)]
    pub sample: SampleArgs,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Error model options.
#[derive(Debug, Args, Clone)]
pub struct ModelArgs {
    #[arg(long, value_enum, default_value_t = ErrorModelKind::Basic)]
    pub error_model: ErrorModelKind,

    /// Fix `a` at this value (excluded from refinement).
    #[arg(long)]
    pub a: Option<f64>,

    /// Fix `b` at this value (excluded from refinement).
    #[arg(long)]
    pub b: Option<f64>,

    #[arg(long, value_enum, default_value_t = Minimisation::Individual)]
    pub minimisation: Minimisation,

    /// Minimum scaled consensus intensity used for fitting.
    #[arg(long, default_value_t = DEFAULT_MIN_IH)]
    pub min_ih: f64,

    /// Minimum partiality used for fitting.
    #[arg(long, default_value_t = DEFAULT_MIN_PARTIALITY)]
    pub min_partiality: f64,

    /// Requested number of intensity bins.
    #[arg(long, default_value_t = DEFAULT_N_BINS)]
    pub n_bins: usize,

    /// Minimum reflections needed to fit a model.
    #[arg(long, default_value_t = DEFAULT_MIN_REFLECTIONS)]
    pub min_reflections: usize,

    /// Ignore --a/--b and refine from defaults.
    #[arg(long)]
    pub reset_error_model: bool,

    #[arg(long, value_enum, default_value_t = Grouping::Combined)]
    pub grouping: Grouping,

    /// Comma-separated dataset indices forming one model group (repeatable).
    #[arg(long = "error-model-group", value_name = "DATASETS")]
    pub error_model_group: Vec<String>,

    /// Maximum a/b refinement cycles.
    #[arg(long, default_value_t = 10)]
    pub max_cycles: usize,
}

/// Terminal output and export options.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Render the normal probability plot (enabled by default).
    #[arg(long, default_value_t = true)]
    pub plot: bool,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 72)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 24)]
    pub height: usize,

    /// Export observations with corrected variances to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export fitted models to JSON.
    #[arg(long = "export-model")]
    pub export_model: Option<PathBuf>,
}

/// Synthetic data options.
#[derive(Debug, Args, Clone)]
pub struct SampleArgs {
    /// Number of redundancy groups.
    #[arg(long, default_value_t = 300)]
    pub groups: usize,

    /// Observations per group.
    #[arg(long, default_value_t = 5)]
    pub multiplicity: usize,

    /// True `a` of the generating model.
    #[arg(long, default_value_t = 1.2)]
    pub true_a: f64,

    /// True `b` of the generating model.
    #[arg(long, default_value_t = 0.03)]
    pub true_b: f64,

    #[arg(long, default_value_t = 30.0)]
    pub ih_min: f64,

    #[arg(long, default_value_t = 10_000.0)]
    pub ih_max: f64,

    #[arg(long, default_value_t = 1.0)]
    pub scale_min: f64,

    #[arg(long, default_value_t = 1.0)]
    pub scale_max: f64,

    /// Number of datasets the groups are dealt to.
    #[arg(long, default_value_t = 1)]
    pub datasets: usize,

    #[arg(long, value_enum, default_value_t = IntensityLayout::Random)]
    pub layout: IntensityLayout,

    #[arg(long, value_enum, default_value_t = NoiseKind::Random)]
    pub noise: NoiseKind,

    /// Add a random partiality column.
    #[arg(long)]
    pub partiality: bool,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_command_parses_model_options() {
        let cli = Cli::parse_from([
            "errmod",
            "fit",
            "--input",
            "obs.csv",
            "--b",
            "0.02",
            "--minimisation",
            "regression",
            "--grouping",
            "grouped",
            "--error-model-group",
            "0,1",
            "--error-model-group",
            "2",
            "--no-plot",
            "-v",
        ]);
        assert!(cli.verbose);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.model.b, Some(0.02));
        assert_eq!(args.model.a, None);
        assert_eq!(args.model.minimisation, Minimisation::Regression);
        assert_eq!(args.model.grouping, Grouping::Grouped);
        assert_eq!(args.model.error_model_group, vec!["0,1".to_string(), "2".to_string()]);
        assert!(args.output.no_plot);
    }

    #[test]
    fn demo_uses_defaults() {
        let cli = Cli::parse_from(["errmod", "demo"]);
        let Command::Demo(args) = cli.command else {
            panic!("expected demo");
        };
        assert_eq!(args.sample.groups, 300);
        assert_eq!(args.model.n_bins, DEFAULT_N_BINS);
        assert_eq!(args.sample.noise, NoiseKind::Random);
    }
}
