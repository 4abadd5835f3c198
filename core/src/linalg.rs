//! Dense linear algebra helpers on top of nalgebra.

use nalgebra::{DMatrix, SymmetricEigen};

/// Singular values below this (relative to the largest) are treated as zero
/// by the least-squares fallback.
const SVD_RELATIVE_EPS: f64 = 1e-12;

const SVD_MAX_ITERATIONS: usize = 10_000;

/// How [`solve_linear_system`] obtained its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveMethod {
    /// Exact solve by LU decomposition with partial pivoting.
    Lu,
    /// Minimum-norm least squares by SVD; `A` was singular.
    LeastSquares,
}

/// Check whether `m` is positive semi-definite.
///
/// Only the symmetric part contributes to `xᵀ M x`, so the check runs on
/// `(M + Mᵀ) / 2`. Eigenvalues slightly below zero within a tolerance scaled
/// by the matrix norm are accepted.
pub fn is_positive_semi_definite(m: &DMatrix<f64>) -> bool {
    if !m.is_square() || m.iter().any(|v| !v.is_finite()) {
        return false;
    }
    if m.nrows() == 0 {
        return true;
    }

    let sym = (m + m.transpose()) * 0.5;
    let tol = 1e-12 * m.norm().max(1.0);
    let eig = SymmetricEigen::new(sym);
    eig.eigenvalues.iter().all(|&l| l >= -tol)
}

/// Solve `A X = B` for `X`.
///
/// Tries LU first; when `A` is singular falls back to the SVD pseudo-inverse
/// solution, which is still defined for rank-deficient systems.
pub fn solve_linear_system(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
) -> crate::Result<(DMatrix<f64>, SolveMethod)> {
    if !a.is_square() {
        return Err(crate::Error::shape_mismatch(
            (a.nrows(), a.nrows()),
            a.shape(),
            "linear system matrix",
        ));
    }
    if a.nrows() != b.nrows() {
        return Err(crate::Error::dimension_mismatch(
            a.nrows(),
            b.nrows(),
            "linear system right-hand side",
        ));
    }

    if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
        return Err(crate::Error::Numerical(
            "linear system has non-finite entries".to_string(),
        ));
    }

    if let Some(x) = a.clone().lu().solve(b) {
        if x.iter().all(|v| v.is_finite()) {
            return Ok((x, SolveMethod::Lu));
        }
    }

    let svd = a
        .clone()
        .try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)
        .ok_or_else(|| crate::Error::Numerical("SVD did not converge".to_string()))?;
    let max_sv = svd.singular_values.max();
    let eps = (SVD_RELATIVE_EPS * max_sv).max(f64::MIN_POSITIVE);
    let x = svd
        .solve(b, eps)
        .map_err(|e| crate::Error::Numerical(format!("SVD solve failed: {e}")))?;
    if x.iter().any(|v| !v.is_finite()) {
        return Err(crate::Error::Numerical(
            "linear system solution is not finite".to_string(),
        ));
    }
    Ok((x, SolveMethod::LeastSquares))
}
