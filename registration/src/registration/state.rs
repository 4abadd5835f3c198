//! Mutable state shared between the engine and its transform model.

use super::expectation::Correspondence;
use lgcpd_core::point_cloud::PointMatrix;
use nalgebra::DMatrixView;

/// Working-frame state of a registration.
///
/// All point arrays are normalized. Landmark rows come after the regular
/// points in every `*_with_landmarks` array and in `ty`.
#[derive(Debug, Clone)]
pub struct EmState {
    /// Target points, `N x D`.
    pub x_points: PointMatrix,
    /// Target landmarks, `K x D`.
    pub x_landmarks: PointMatrix,
    /// Target points followed by target landmarks, `(N+K) x D`.
    pub x_with_landmarks: PointMatrix,
    /// Source points, `M x D`.
    pub y_points: PointMatrix,
    /// Source landmarks, `K x D`.
    pub y_landmarks: PointMatrix,
    /// Source points followed by source landmarks, `(M+K) x D`.
    pub y_with_landmarks: PointMatrix,
    /// Transformed source points and landmarks, `(M+K) x D`.
    pub ty: PointMatrix,

    pub n: usize,
    pub m: usize,
    pub d: usize,
    pub k: usize,

    pub sigma2: f64,
    pub tolerance: f64,
    pub outlier_weight: f64,
    pub ss2: f64,
    /// Absolute change of `sigma2` in the last maximization step.
    pub diff: f64,
    /// Objective reported to callbacks. Models that do not track it leave it
    /// at infinity.
    pub objective: f64,
    pub iteration: usize,

    pub correspondence: Correspondence,
}

impl EmState {
    /// Transformed source points without landmarks.
    pub fn transformed_points(&self) -> DMatrixView<'_, f64> {
        self.ty.rows(0, self.m)
    }

    /// Transformed source landmarks.
    pub fn transformed_landmarks(&self) -> DMatrixView<'_, f64> {
        self.ty.rows(self.m, self.k)
    }

    /// Smallest variance the state accepts: `tolerance / 10`, or machine
    /// epsilon when the tolerance is zero.
    pub fn variance_floor(&self) -> f64 {
        variance_floor(self.tolerance)
    }

    /// Store a new variance estimate and record its change.
    ///
    /// Non-positive or non-finite estimates are replaced by the floor, so
    /// `sigma2 > 0` holds after every call.
    pub fn accept_variance(&mut self, sigma2: f64) {
        let previous = self.sigma2;
        self.sigma2 = if sigma2 > 0.0 && sigma2.is_finite() {
            sigma2
        } else {
            let floor = self.variance_floor();
            tracing::warn!(
                "Variance update produced {}, flooring to {}",
                sigma2,
                floor
            );
            floor
        };
        self.diff = (self.sigma2 - previous).abs();
    }
}

pub(crate) fn variance_floor(tolerance: f64) -> f64 {
    let floor = tolerance / 10.0;
    if floor > 0.0 {
        floor
    } else {
        f64::EPSILON
    }
}
