//! Strategy dispatch for parameter refinement.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Minimisation, ModelParameters, RefineOptions};
use crate::error::ErrorModelError;
use crate::fit::{refine_individual, refine_regression};
use crate::model::BasicErrorModel;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefinementOutcome {
    pub strategy: Minimisation,
    /// Cycles run (`1` for a regression, `0` when nothing was refined).
    pub cycles: usize,
    pub start: ModelParameters,
    pub parameters: ModelParameters,
}

/// Refine the active parameters of a configured model with `strategy`.
pub fn refine(
    model: &mut BasicErrorModel,
    strategy: Minimisation,
    options: &RefineOptions,
) -> Result<RefinementOutcome, ErrorModelError> {
    let start = model.parameters();
    let cycles = if model.active_parameters().is_empty() {
        0
    } else {
        match strategy {
            Minimisation::None => 0,
            Minimisation::Regression => {
                refine_regression(model)?;
                1
            }
            Minimisation::Individual => refine_individual(model, options)?,
        }
    };
    let parameters = model.parameters();
    debug!(?strategy, cycles, a = parameters.a, b = parameters.b, "Error model refined");
    Ok(RefinementOutcome {
        strategy,
        cycles,
        start,
        parameters,
    })
}
