//! Formatted terminal output.
//!
//! Formatting lives here so the model and fitting code stay free of
//! presentation concerns and output changes are localised.

use crate::app::pipeline::{GroupOutcome, GroupStatus, RunOutput};
use crate::domain::{ErrorModelConfig, ModelParameters};
use crate::model::ErrorModelReport;

/// Parameters, formula and asymptotic I/σ of a basic error model.
pub fn format_model_details(parameters: ModelParameters) -> String {
    let limit = match parameters.asymptotic_isigma() {
        Some(v) => format!("{v:.3}"),
        None => "Unable to estimate".to_string(),
    };
    format!(
        "Error model details:\n  Type: basic\n  Parameters: a = {:.5}, b = {:.5}\n  Error model formula: \u{3c3}'\u{b2} = a\u{b2}(\u{3c3}\u{b2} + (bI)\u{b2})\n  estimated I/sigma asymptotic limit: {limit}",
        parameters.a, parameters.b,
    )
}

/// Per-bin variances of the normalised deviations before and after correction.
pub fn format_binned_variances(report: &ErrorModelReport) -> String {
    let (Some(binning), Some(initial), Some(corrected)) = (
        report.binning.as_ref(),
        report.initial_variances.as_ref(),
        report.corrected_variances.as_ref(),
    ) else {
        return "No binned variances available.\n".to_string();
    };

    let mut out = String::new();
    out.push_str("Results of the error model minimisation, binned by intensity.\n");
    out.push_str("The uncorrected variances use a = 1, b = 0; a good model brings the\n");
    out.push_str("corrected variance of the normalised deviations close to 1.0 in every bin.\n");
    if binning.n_bins() < binning.requested_bins {
        out.push_str(&format!(
            "({} of {} requested bins kept after merging sparse bins)\n",
            binning.n_bins(),
            binning.requested_bins
        ));
    }
    out.push('\n');

    out.push_str(
        format!(
            "{:<24} {:>8} {:>22} {:>20}",
            "Intensity range (<Ih>)", "n_refl", "Uncorrected variance", "Corrected variance"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<24} {:-<8} {:-<22} {:-<20}", "", "", "", "").trim_end());
    out.push('\n');

    for (k, (upper, lower)) in binning.ranges().enumerate() {
        out.push_str(
            format!(
                "{:<24} {:>8} {:>22} {:>20}",
                format!("{upper:.2} - {lower:.2}"),
                binning.occupancy.get(k).copied().unwrap_or(0),
                fmt_variance(initial.variances.get(k).copied()),
                fmt_variance(corrected.variances.get(k).copied()),
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Summary of a full run: configuration, one block per group.
pub fn format_run_summary(run: &RunOutput, config: &ErrorModelConfig, n_rows: usize) -> String {
    let mut out = String::new();
    out.push_str("=== errmod - intensity error model ===\n");
    out.push_str(&format!(
        "Model: {:?} | minimisation: {:?} | grouping: {:?}\n",
        config.error_model, config.minimisation, config.grouping
    ));
    out.push_str(&format!(
        "Filter: min Ih = {:.1} | min partiality = {:.2} | bins = {} | min reflections = {}\n",
        config.min_ih, config.min_partiality, config.n_bins, config.min_reflections_required
    ));
    out.push_str(&format!("Observations: n={n_rows} | groups={}\n", run.groups.len()));

    for (i, group) in run.groups.iter().enumerate() {
        out.push('\n');
        out.push_str(&format_group(i, group));
    }
    out
}

fn format_group(index: usize, group: &GroupOutcome) -> String {
    let mut out = String::new();
    let status = match group.status {
        GroupStatus::Fitted => "fitted",
        GroupStatus::Skipped => "skipped",
        GroupStatus::Failed => "failed",
    };
    out.push_str(&format!(
        "--- Group {index}: datasets {} | rows={} | {status}\n",
        fmt_list(&group.datasets),
        group.rows.len()
    ));
    if let Some(message) = &group.message {
        out.push_str(&format!("  {message}\n"));
    }
    if let Some(refinement) = &group.refinement {
        out.push_str(&format!(
            "  Refinement: {:?}, {} cycle(s), start a = {:.5}, b = {:.5}\n",
            refinement.strategy, refinement.cycles, refinement.start.a, refinement.start.b
        ));
    }
    if let Some(report) = &group.report {
        out.push('\n');
        out.push_str(&format_binned_variances(report));
        out.push('\n');
        out.push_str(&format_model_details(report.parameters));
        out.push('\n');
    }
    out
}

fn fmt_variance(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{v:.5}"),
        _ => "n/a".to_string(),
    }
}

fn fmt_list(v: &[usize]) -> String {
    let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
    format!("[{}]", parts.join(", "))
}
