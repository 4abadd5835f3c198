//! Gaussian kernel helpers for deformable transform models.

use lgcpd_core::point_cloud::PointMatrix;
use lgcpd_core::{Error, Result};
use nalgebra::{DMatrix, DVector, SymmetricEigen};

/// Gaussian affinity `G[i, j] = exp(-|x_i - y_j|^2 / (2 beta^2))`.
///
/// With `y = None` the kernel of `x` with itself is returned.
pub fn gaussian_kernel(x: &PointMatrix, beta: f64, y: Option<&PointMatrix>) -> Result<DMatrix<f64>> {
    if !(beta > 0.0) || !beta.is_finite() {
        return Err(Error::invalid_parameter("beta", beta, "a positive finite value"));
    }
    let y = y.unwrap_or(x);
    if x.ncols() != y.ncols() {
        return Err(Error::dimension_mismatch(x.ncols(), y.ncols(), "gaussian kernel"));
    }

    let two_beta2 = 2.0 * beta * beta;
    Ok(DMatrix::from_fn(x.nrows(), y.nrows(), |i, j| {
        let dist = (x.row(i) - y.row(j)).norm_squared();
        (-dist / two_beta2).exp()
    }))
}

/// Leading eigenpairs of a symmetric kernel matrix.
///
/// Returns `(Q, S)` with the `num_eig` eigenvectors as columns of `Q` and
/// their eigenvalues in `S`, ordered by decreasing magnitude. The fast Gauss
/// transform approximation is not available and fails instead of silently
/// falling back to the exact decomposition.
pub fn low_rank_eigen(
    g: &DMatrix<f64>,
    num_eig: usize,
    fast_gauss_transform: bool,
) -> Result<(DMatrix<f64>, DVector<f64>)> {
    if fast_gauss_transform {
        return Err(Error::NotImplemented(
            "fast Gauss transform for low-rank eigendecomposition".to_string(),
        ));
    }
    if !g.is_square() {
        return Err(Error::shape_mismatch(
            (g.nrows(), g.nrows()),
            g.shape(),
            "kernel matrix",
        ));
    }
    if num_eig == 0 || num_eig > g.nrows() {
        return Err(Error::invalid_parameter(
            "num_eig",
            num_eig,
            "a count between 1 and the kernel size",
        ));
    }

    let eig = SymmetricEigen::new(g.clone());
    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| {
        eig.eigenvalues[b]
            .abs()
            .total_cmp(&eig.eigenvalues[a].abs())
    });
    order.truncate(num_eig);

    let q = DMatrix::from_fn(g.nrows(), num_eig, |i, j| eig.eigenvectors[(i, order[j])]);
    let s = DVector::from_iterator(num_eig, order.iter().map(|&i| eig.eigenvalues[i]));
    Ok((q, s))
}
