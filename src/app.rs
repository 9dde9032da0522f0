//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - loads or simulates observations
//! - runs the grouped error models
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, DemoArgs, FitArgs, ModelArgs, OutputArgs, SampleArgs, SimulateArgs};
use crate::data::{SampleSpec, generate_table};
use crate::domain::{ErrorModelConfig, ModelParameters, ObservationTable, RefineOptions};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `errmod` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Demo(args) => handle_demo(args),
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = model_config_from_args(&args.model)?;
    let ingest = crate::io::load_observations(&args.input)?;
    info!(
        rows_read = ingest.rows_read,
        rows_used = ingest.rows_used,
        groups = ingest.group_labels.len(),
        "Loaded observations from {}",
        args.input.display()
    );
    for err in &ingest.row_errors {
        warn!(line = err.line, group = err.group.as_deref().unwrap_or(""), "{}", err.message);
    }
    fit_and_report(&ingest.table, &config, &args.output)
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let spec = sample_spec_from_args(&args.sample);
    let table = generate_table(&spec)?;
    crate::io::write_observations_csv(&args.output, &table, None)?;
    info!(
        rows = table.len(),
        a = spec.truth.a,
        b = spec.truth.b,
        "Wrote synthetic observations to {}",
        args.output.display()
    );
    Ok(())
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let spec = sample_spec_from_args(&args.sample);
    let config = model_config_from_args(&args.model)?;
    let table = generate_table(&spec)?;
    println!(
        "Simulated {} observations with a = {:.5}, b = {:.5}\n",
        table.len(),
        spec.truth.a,
        spec.truth.b
    );
    fit_and_report(&table, &config, &args.output)
}

fn fit_and_report(table: &ObservationTable, config: &ErrorModelConfig, output: &OutputArgs) -> Result<(), AppError> {
    let run = pipeline::run_error_models(table, config)?;

    println!("{}", crate::report::format_run_summary(&run, config, table.len()));

    if output.plot && !output.no_plot {
        for (i, group) in run.groups.iter().enumerate() {
            if group.normal_plot.is_empty() {
                continue;
            }
            println!("Group {i}:");
            println!(
                "{}",
                crate::plot::render_normal_probability_plot(&group.normal_plot, output.width, output.height)
            );
        }
    }

    if let Some(path) = &output.export {
        crate::io::write_observations_csv(path, table, Some(&run.corrected_variances))?;
        debug!("Wrote corrected variances to {}", path.display());
    }
    if let Some(path) = &output.export_model {
        crate::io::write_model_json(path, &run, config)?;
        debug!("Wrote error models to {}", path.display());
    }
    Ok(())
}

pub fn model_config_from_args(args: &ModelArgs) -> Result<ErrorModelConfig, AppError> {
    let error_model_group = args
        .error_model_group
        .iter()
        .map(|s| parse_dataset_list(s))
        .collect::<Result<Vec<_>, _>>()?;

    let config = ErrorModelConfig {
        error_model: args.error_model,
        a: args.a,
        b: args.b,
        minimisation: args.minimisation,
        min_ih: args.min_ih,
        min_partiality: args.min_partiality,
        n_bins: args.n_bins,
        min_reflections_required: args.min_reflections,
        reset_error_model: args.reset_error_model,
        grouping: args.grouping,
        error_model_group,
        refine: RefineOptions {
            max_cycles: args.max_cycles,
            ..RefineOptions::default()
        },
    };

    // Fail early on unusable fixed parameters.
    let defaults = ModelParameters::default();
    ModelParameters::new(
        config.fixed_a().unwrap_or(defaults.a),
        config.fixed_b().unwrap_or(defaults.b),
    )
    .validate()?;
    Ok(config)
}

pub fn sample_spec_from_args(args: &SampleArgs) -> SampleSpec {
    SampleSpec {
        n_groups: args.groups,
        multiplicity: args.multiplicity,
        truth: ModelParameters::new(args.true_a, args.true_b),
        ih_min: args.ih_min,
        ih_max: args.ih_max,
        layout: args.layout,
        noise: args.noise,
        scale_range: (args.scale_min, args.scale_max),
        n_datasets: args.datasets,
        with_partiality: args.partiality,
        seed: args.seed,
    }
}

/// Parse `"0,1, 3"` into dataset indices.
fn parse_dataset_list(s: &str) -> Result<Vec<usize>, AppError> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<usize>()
                .map_err(|_| AppError::new(2, format!("Invalid dataset index '{t}' in --error-model-group '{s}'.")))
        })
        .collect()
}
