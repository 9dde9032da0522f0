//! Least squares solver.
//!
//! Both fitting strategies reduce to tiny linear problems over the intensity
//! bins (one or two unknowns, at most `n_bins` rows):
//!
//! ```text
//! minimize Σ (y_k - x_k^T β)^2
//! ```
//!
//! Weighted variants scale rows by `sqrt(w_k)` before calling in.
//! We solve via SVD since the design is tall and can be near rank-deficient when
//! all bins share a similar mean intensity.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Progressively looser singular-value cut-offs.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}
