//! Affine transform model: `T(Y) = Y B + t`.
//!
//! Update rules follow Fig. 3 of "Point Set Registration: Coherent Point
//! Drift" (Myronenko and Song), extended with landmark rows.

use super::normalization::Normalization;
use super::state::EmState;
use super::transform::{TransformFn, TransformModel};
use lgcpd_core::linalg::{is_positive_semi_definite, solve_linear_system, SolveMethod};
use lgcpd_core::point_cloud::{add_row, squared_row_norms, sub_row, PointMatrix};
use lgcpd_core::{Error, Result};
use nalgebra::{DMatrix, DVector, RowDVector};

/// Affine parameters in real coordinates.
///
/// Points are row vectors, so a point `y` maps to `y B + t`.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineParameters {
    /// `D x D` linear part.
    pub b: DMatrix<f64>,
    /// `1 x D` translation.
    pub t: RowDVector<f64>,
}

impl AffineParameters {
    pub fn identity(dim: usize) -> Self {
        Self {
            b: DMatrix::identity(dim, dim),
            t: RowDVector::zeros(dim),
        }
    }

    pub fn dim(&self) -> usize {
        self.b.nrows()
    }

    /// Map every row of `points` through the transform.
    pub fn apply(&self, points: &PointMatrix) -> Result<PointMatrix> {
        if points.ncols() != self.dim() {
            return Err(Error::dimension_mismatch(
                self.dim(),
                points.ncols(),
                "affine transform input",
            ));
        }
        Ok(add_row(&(points * &self.b), &self.t))
    }
}

/// Affine CPD transform model.
#[derive(Debug, Clone, Default)]
pub struct AffineTransform {
    b: Option<DMatrix<f64>>,
    t: Option<RowDVector<f64>>,
}

impl AffineTransform {
    /// Start from `B = I`, `t = 0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a prior transform.
    ///
    /// `b` must be square and positive semi-definite; `t` must be a single
    /// row. Both are checked against the cloud dimensionality again when the
    /// engine is constructed.
    pub fn with_initial(b: Option<DMatrix<f64>>, t: Option<RowDVector<f64>>) -> Result<Self> {
        if let Some(b) = &b {
            if !b.is_square() {
                return Err(Error::shape_mismatch(
                    (b.nrows(), b.nrows()),
                    b.shape(),
                    "initial affine matrix B",
                ));
            }
            if !is_positive_semi_definite(b) {
                return Err(Error::NotPositiveSemiDefinite(format!(
                    "initial affine matrix B must be positive semi-definite, got {b}"
                )));
            }
        }
        if let (Some(b), Some(t)) = (&b, &t) {
            if t.ncols() != b.nrows() {
                return Err(Error::shape_mismatch(
                    (1, b.nrows()),
                    t.shape(),
                    "initial translation t",
                ));
            }
        }
        Ok(Self { b, t })
    }

    /// Current parameters in the working frame.
    pub fn working_parameters(&self, dim: usize) -> AffineParameters {
        AffineParameters {
            b: self
                .b
                .clone()
                .unwrap_or_else(|| DMatrix::identity(dim, dim)),
            t: self.t.clone().unwrap_or_else(|| RowDVector::zeros(dim)),
        }
    }

    fn dim_hint(&self) -> Option<usize> {
        self.b
            .as_ref()
            .map(|b| b.nrows())
            .or_else(|| self.t.as_ref().map(|t| t.ncols()))
    }
}

impl TransformModel for AffineTransform {
    type Parameters = AffineParameters;

    fn prepare(&mut self, dim: usize) -> Result<()> {
        if let Some(b) = &self.b {
            if b.shape() != (dim, dim) {
                return Err(Error::shape_mismatch(
                    (dim, dim),
                    b.shape(),
                    "initial affine matrix B",
                ));
            }
        }
        if let Some(t) = &self.t {
            if t.ncols() != dim {
                return Err(Error::shape_mismatch((1, dim), t.shape(), "initial translation t"));
            }
        }

        let params = self.working_parameters(dim);
        self.b = Some(params.b);
        self.t = Some(params.t);
        Ok(())
    }

    fn update_transform(&mut self, state: &EmState) -> Result<()> {
        let corr = &state.correspondence;
        let np = corr.np_with_landmarks.max(f64::EPSILON);

        // Responsibility-weighted means, landmarks included.
        let mu_x: RowDVector<f64> = corr.px.row_sum() / np;
        let mu_y: RowDVector<f64> = state.y_with_landmarks.tr_mul(&corr.p1).transpose() / np;

        let x_hat = sub_row(&state.x_with_landmarks, &mu_x);
        let y_hat = sub_row(&state.y_with_landmarks, &mu_y);

        // A = X̂ᵀ Pᵀ Ŷ
        let a = (&corr.p * &x_hat).tr_mul(&y_hat);
        // YPY = Ŷᵀ diag(P1) Ŷ
        let weighted_y = DMatrix::from_fn(y_hat.nrows(), y_hat.ncols(), |i, j| {
            y_hat[(i, j)] * corr.p1[i]
        });
        let ypy = y_hat.tr_mul(&weighted_y);

        let (b, method) = solve_linear_system(&ypy.transpose(), &a.transpose())?;
        if method == SolveMethod::LeastSquares {
            tracing::warn!(
                "YPY is singular at iteration {}, using least-squares affine update",
                state.iteration
            );
        }

        let t = &mu_x - &mu_y * &b;
        self.b = Some(b);
        self.t = Some(t);
        Ok(())
    }

    fn transform_point_cloud(&self, points: &PointMatrix) -> PointMatrix {
        let params = self.working_parameters(points.ncols());
        add_row(&(points * &params.b), &params.t)
    }

    fn update_variance(&mut self, state: &mut EmState) {
        let (m, n, d) = (state.m, state.n, state.d);
        let corr = &state.correspondence;

        let x_norms = squared_row_norms(&state.x_points);
        let ty = state.ty.rows(0, m);
        let ty_norms = DVector::from_iterator(m, ty.row_iter().map(|row| row.norm_squared()));

        let x_px = corr.pt1.rows(0, n).dot(&x_norms);
        let y_py = corr.p1.rows(0, m).dot(&ty_norms);
        let tr_pxy = ty.component_mul(&corr.px.rows(0, m)).sum();

        let np = corr.np_without_landmarks.max(f64::EPSILON);
        let sigma2 = (x_px - 2.0 * tr_pxy + y_py) / (np * d as f64);

        // Not tracked for the affine model.
        state.objective = f64::INFINITY;
        state.accept_variance(sigma2);
    }

    fn registration_parameters(&self, normalization: &Normalization) -> AffineParameters {
        let dim = self.dim_hint().unwrap_or(normalization.x_mean.ncols());
        let params = self.working_parameters(dim);
        if !normalization.enabled {
            return params;
        }

        let b = params.b * (normalization.x_scale / normalization.y_scale);
        let t = params.t * normalization.x_scale + &normalization.x_mean
            - &normalization.y_mean * &b;
        AffineParameters { b, t }
    }

    fn transformation_function(&self, normalization: &Normalization) -> TransformFn {
        let params = self.registration_parameters(normalization);
        Box::new(move |points: &PointMatrix| params.apply(points))
    }
}
