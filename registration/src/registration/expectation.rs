//! Expectation step: soft correspondences between source and target points.

use lgcpd_core::point_cloud::{sub_row, PointMatrix};
use lgcpd_core::Backend;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::f64::consts::PI;

/// Output of one expectation step.
///
/// `p` is `(M+K) x (N+K)`: row `m`, column `n` is the responsibility of
/// target point `n` for source point `m`. The landmark block (rows `M..`,
/// columns `N..`) is `(sigma2 / ss2) * I` when landmarks are present.
#[derive(Debug, Clone)]
pub struct Correspondence {
    pub p: DMatrix<f64>,
    /// Row sums of `p`, length `M+K`.
    pub p1: DVector<f64>,
    /// Column sums of `p`, length `N+K`.
    pub pt1: DVector<f64>,
    pub np_with_landmarks: f64,
    pub np_without_landmarks: f64,
    /// `p * [X; X_landmarks]`, `(M+K) x D`.
    pub px: DMatrix<f64>,
}

impl Correspondence {
    pub fn zeros(m: usize, n: usize, k: usize, dim: usize) -> Self {
        Self {
            p: DMatrix::zeros(m + k, n + k),
            p1: DVector::zeros(m + k),
            pt1: DVector::zeros(n + k),
            np_with_landmarks: 0.0,
            np_without_landmarks: 0.0,
            px: DMatrix::zeros(m + k, dim),
        }
    }
}

/// Inputs of the expectation step, all in the working frame.
pub struct ExpectationInput<'a> {
    /// Target points without landmarks, `N x D`.
    pub x: &'a PointMatrix,
    /// Target points followed by target landmarks, `(N+K) x D`.
    pub x_with_landmarks: &'a PointMatrix,
    /// Transformed source points followed by transformed landmarks, `(M+K) x D`.
    pub ty: &'a PointMatrix,
    /// Number of source points `M` (rows of `ty` before the landmarks).
    pub num_source: usize,
    pub num_landmarks: usize,
    pub sigma2: f64,
    pub outlier_weight: f64,
    pub ss2: f64,
}

/// Constant outlier term of the column denominator:
/// `(2 pi sigma2)^(D/2) * w / (1 - w) * M / N`.
pub fn outlier_constant(sigma2: f64, dim: usize, w: f64, m: usize, n: usize) -> f64 {
    (2.0 * PI * sigma2).powf(dim as f64 / 2.0) * w / (1.0 - w) * m as f64 / n as f64
}

/// Run the expectation step.
pub fn expectation(input: &ExpectationInput<'_>, backend: Backend) -> Correspondence {
    let n = input.x.nrows();
    let m = input.num_source;
    let k = input.num_landmarks;
    let dim = input.x.ncols();

    let c = outlier_constant(input.sigma2, dim, input.outlier_weight, m, n);
    let two_sigma2 = 2.0 * input.sigma2;
    let x = input.x;
    let ty = input.ty;

    let rows = m + k;
    let mut p = DMatrix::<f64>::zeros(rows, n + k);

    // Column-major: one chunk per target column, normalized on its own.
    let fill_column = |(col, column): (usize, &mut [f64])| {
        let mut den = 0.0;
        for (row, value) in column.iter_mut().take(m).enumerate() {
            let mut dist = 0.0;
            for j in 0..dim {
                let diff = x[(col, j)] - ty[(row, j)];
                dist += diff * diff;
            }
            *value = (-dist / two_sigma2).exp();
            den += *value;
        }
        den += c;
        if den == 0.0 {
            den = f64::EPSILON;
        }
        for value in column.iter_mut().take(m) {
            *value /= den;
        }
    };

    {
        let data = p.as_mut_slice();
        let target_columns = &mut data[..rows * n];
        match backend {
            Backend::Serial => target_columns
                .chunks_mut(rows)
                .enumerate()
                .for_each(fill_column),
            Backend::Parallel => target_columns
                .par_chunks_mut(rows)
                .enumerate()
                .for_each(fill_column),
        }
    }

    let anchor = input.sigma2 / input.ss2;
    for i in 0..k {
        p[(m + i, n + i)] = anchor;
    }

    let pt1 = p.row_sum().transpose();
    let p1 = p.column_sum();
    let np_with_landmarks = p1.sum();
    let np_without_landmarks = p1.rows(0, m).sum();
    let px = &p * input.x_with_landmarks;

    Correspondence {
        p,
        p1,
        pt1,
        np_with_landmarks,
        np_without_landmarks,
        px,
    }
}

/// Initial variance: mean squared distance over all target/source pairs,
/// `sum_{m,n} |x_n - y_m|^2 / (D M N)`.
pub fn initialize_sigma2(x: &PointMatrix, y: &PointMatrix) -> f64 {
    let (n, dim) = x.shape();
    let m = y.nrows();
    if n == 0 || m == 0 || dim == 0 {
        return 0.0;
    }

    // Pairwise distances are translation invariant; centering on the pooled
    // mean keeps the expanded sum from cancelling far from the origin.
    let offset = (x.row_sum() + y.row_sum()) / (n + m) as f64;
    let x = sub_row(x, &offset);
    let y = sub_row(y, &offset);

    let x_sum = x.row_sum();
    let y_sum = y.row_sum();
    let total = m as f64 * x.norm_squared() + n as f64 * y.norm_squared()
        - 2.0 * x_sum.dot(&y_sum);
    total.max(0.0) / (dim * m * n) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use lgcpd_core::point_cloud::stack_rows;

    fn square() -> PointMatrix {
        DMatrix::from_row_slice(4, 2, &[0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0])
    }

    fn run(x: &PointMatrix, ty: &PointMatrix, sigma2: f64, w: f64, backend: Backend) -> Correspondence {
        expectation(
            &ExpectationInput {
                x,
                x_with_landmarks: x,
                ty,
                num_source: ty.nrows(),
                num_landmarks: 0,
                sigma2,
                outlier_weight: w,
                ss2: 0.1,
            },
            backend,
        )
    }

    #[test]
    fn test_columns_sum_to_one_without_outliers() {
        let x = square();
        let ty = &x * 1.1;
        let corr = run(&x, &ty, 0.5, 0.0, Backend::Serial);
        for s in corr.pt1.iter() {
            assert!((s - 1.0).abs() < 1e-12);
        }
        assert!((corr.np_with_landmarks - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_outlier_mass_reduces_column_sums() {
        let x = square();
        let corr = run(&x, &x, 0.5, 0.3, Backend::Serial);
        assert!(corr.p.iter().all(|v| *v >= 0.0));
        for s in corr.pt1.iter() {
            assert!(*s < 1.0);
            assert!(*s > 0.0);
        }
    }

    #[test]
    fn test_matches_direct_formula() {
        let x = square();
        let ty = DMatrix::from_row_slice(2, 2, &[0.1, 0.0, 0.9, 1.2]);
        let sigma2 = 0.7;
        let w = 0.2;
        let corr = run(&x, &ty, sigma2, w, Backend::Serial);

        let c = outlier_constant(sigma2, 2, w, 2, 4);
        for col in 0..4 {
            let k: Vec<f64> = (0..2)
                .map(|row| {
                    let d = (x.row(col) - ty.row(row)).norm_squared();
                    (-d / (2.0 * sigma2)).exp()
                })
                .collect();
            let den: f64 = k.iter().sum::<f64>() + c;
            for row in 0..2 {
                assert!((corr.p[(row, col)] - k[row] / den).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_serial_and_parallel_agree() {
        let x = square();
        let ty = &x * 0.8;
        let a = run(&x, &ty, 0.3, 0.1, Backend::Serial);
        let b = run(&x, &ty, 0.3, 0.1, Backend::Parallel);
        assert_eq!(a.p, b.p);
        assert_eq!(a.px, b.px);
    }

    #[test]
    fn test_far_points_use_epsilon_denominator() {
        let x = DMatrix::from_row_slice(1, 2, &[1e6, 1e6]);
        let ty = DMatrix::from_row_slice(1, 2, &[0.0, 0.0]);
        let corr = run(&x, &ty, 1e-3, 0.0, Backend::Serial);
        assert!(corr.p.iter().all(|v| v.is_finite()));
        assert_eq!(corr.p[(0, 0)], 0.0);
    }

    #[test]
    fn test_landmark_block_is_scaled_identity() {
        let x = square();
        let xl = DMatrix::from_row_slice(2, 2, &[0.5, 0.5, 2.0, 2.0]);
        let yl = DMatrix::from_row_slice(2, 2, &[0.4, 0.6, 1.9, 2.1]);
        let x_aug = stack_rows(&x, &xl).unwrap();
        let ty = stack_rows(&x, &yl).unwrap();
        let sigma2 = 0.25;
        let ss2 = 0.05;

        let corr = expectation(
            &ExpectationInput {
                x: &x,
                x_with_landmarks: &x_aug,
                ty: &ty,
                num_source: 4,
                num_landmarks: 2,
                sigma2,
                outlier_weight: 0.0,
                ss2,
            },
            Backend::Serial,
        );

        assert_eq!(corr.p.shape(), (6, 6));
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { sigma2 / ss2 } else { 0.0 };
                assert_eq!(corr.p[(4 + i, 4 + j)], expected);
            }
        }
        // Cross blocks stay empty.
        assert!(corr.p.view((0, 4), (4, 2)).iter().all(|v| *v == 0.0));
        assert!(corr.p.view((4, 0), (2, 4)).iter().all(|v| *v == 0.0));
        assert!((corr.np_with_landmarks - corr.np_without_landmarks - 2.0 * sigma2 / ss2).abs() < 1e-9);
        // Landmark rows of PX pull exactly toward their own target landmark.
        assert!((corr.px[(4, 0)] - sigma2 / ss2 * 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_initialize_sigma2_matches_brute_force() {
        let x = square();
        let y = DMatrix::from_row_slice(3, 2, &[0.5, 0.5, 2.0, -1.0, 3.0, 0.0]);
        let mut total = 0.0;
        for i in 0..x.nrows() {
            for j in 0..y.nrows() {
                total += (x.row(i) - y.row(j)).norm_squared();
            }
        }
        let expected = total / (2 * 4 * 3) as f64;
        assert!((initialize_sigma2(&x, &y) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_initialize_sigma2_far_from_origin() {
        let x = square();
        let y = DMatrix::from_row_slice(3, 2, &[0.5, 0.5, 2.0, -1.0, 3.0, 0.0]);
        let near = initialize_sigma2(&x, &y);

        let far_x = x.map(|v| v + 1e9);
        let far_y = y.map(|v| v + 1e9);
        let far = initialize_sigma2(&far_x, &far_y);
        assert!((far - near).abs() / near < 1e-5, "near={near} far={far}");
    }
}
