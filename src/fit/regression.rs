//! One-shot regression of bin variances.
//!
//! At `(a, b) = (1, 0)` the variance of the deviations in bin `k` estimates
//!
//! ```text
//! v_k ≈ a² + a²b² · ⟨I²/V⟩_k
//! ```
//!
//! so a weighted linear fit (rows scaled by `√n_k`) of the initial bin variances
//! against the per-bin mean of `I²/V` yields `(a², a²b²)` directly. With one of
//! the parameters fixed the fit collapses to a single column.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::domain::{ModelParameters, Parameter};
use crate::error::ErrorModelError;
use crate::fit::managers::{ParameterManager, RegressionManager};
use crate::math::solve_least_squares;
use crate::model::BasicErrorModel;

/// Fit the active parameters by regression and commit them to `model`.
pub fn refine_regression(model: &mut BasicErrorModel) -> Result<ModelParameters, ErrorModelError> {
    let binner = model.binner().ok_or(ErrorModelError::NotConfigured)?;
    let current = model.parameters();
    let active = model.active_parameters().to_vec();
    if active.is_empty() {
        return Ok(current);
    }

    let counts = binner.incidence().counts();
    let initial = &binner.initial_variances().variances;
    let regressor = binner.mean_i2_over_v();

    let mut design = Vec::new();
    let mut rhs = Vec::new();
    for k in 0..counts.len() {
        let (y, m) = (initial[k], regressor[k]);
        if !(y.is_finite() && m.is_finite()) {
            continue;
        }
        let w = (counts[k] as f64).sqrt();
        match active.as_slice() {
            [Parameter::A, Parameter::B] => {
                design.extend([w, w * m]);
                rhs.push(w * y);
            }
            [Parameter::A] => {
                design.push(w * (1.0 + current.b * current.b * m));
                rhs.push(w * y);
            }
            [Parameter::B] => {
                design.push(w * m);
                rhs.push(w * (y / (current.a * current.a) - 1.0));
            }
            other => {
                return Err(ErrorModelError::Regression(format!(
                    "unsupported parameter set {other:?}"
                )));
            }
        }
    }

    let n_cols = active.len();
    let n_rows = rhs.len();
    if n_rows < n_cols {
        return Err(ErrorModelError::Regression(format!(
            "{n_rows} usable bins for {n_cols} parameters"
        )));
    }
    let x = DMatrix::from_row_slice(n_rows, n_cols, &design);
    let y = DVector::from_vec(rhs);
    let solution = solve_least_squares(&x, &y)
        .ok_or_else(|| ErrorModelError::Regression("singular design".to_string()))?;
    debug!(solution = ?solution.as_slice(), "Error model regression");

    let mut manager = RegressionManager::new(model);
    manager.set(solution.as_slice())?;
    manager.resolve()
}
