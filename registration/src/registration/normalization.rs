//! Centering and scaling of the two clouds into the working frame.

use lgcpd_core::point_cloud::{add_row, row_mean, stack_rows, sub_row, PointMatrix};
use lgcpd_core::Result;
use nalgebra::RowDVector;

/// Which cloud's parameters to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Target cloud `X`.
    Target,
    /// Source cloud `Y`.
    Source,
}

/// Per-cloud mean and scale.
///
/// Maps real coordinates to the working frame with `(p - mean) / scale` and
/// back with `p * scale + mean`. When normalization is disabled the means
/// are zero and the scales one, so both maps are the identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalization {
    pub x_mean: RowDVector<f64>,
    pub y_mean: RowDVector<f64>,
    pub x_scale: f64,
    pub y_scale: f64,
    pub enabled: bool,
}

impl Normalization {
    pub fn identity(dim: usize) -> Self {
        Self {
            x_mean: RowDVector::zeros(dim),
            y_mean: RowDVector::zeros(dim),
            x_scale: 1.0,
            y_scale: 1.0,
            enabled: false,
        }
    }

    /// Compute parameters from the landmark-augmented clouds.
    ///
    /// In joint mode both clouds are pooled so they share one mean and scale.
    pub fn compute(
        x: &PointMatrix,
        y: &PointMatrix,
        normalize: bool,
        joint: bool,
    ) -> Result<Self> {
        let dim = x.ncols();
        if !normalize {
            return Ok(Self::identity(dim));
        }

        if joint {
            let pooled = stack_rows(x, y)?;
            let mean = row_mean(&pooled);
            let scale = rms_norm(&sub_row(&pooled, &mean));
            Ok(Self {
                x_mean: mean.clone(),
                y_mean: mean,
                x_scale: scale,
                y_scale: scale,
                enabled: true,
            })
        } else {
            let x_mean = row_mean(x);
            let y_mean = row_mean(y);
            let x_scale = rms_norm(&sub_row(x, &x_mean));
            let y_scale = rms_norm(&sub_row(y, &y_mean));
            Ok(Self {
                x_mean,
                y_mean,
                x_scale,
                y_scale,
                enabled: true,
            })
        }
    }

    pub fn mean(&self, side: Side) -> &RowDVector<f64> {
        match side {
            Side::Target => &self.x_mean,
            Side::Source => &self.y_mean,
        }
    }

    pub fn scale(&self, side: Side) -> f64 {
        match side {
            Side::Target => self.x_scale,
            Side::Source => self.y_scale,
        }
    }

    /// Real coordinates to working coordinates.
    pub fn normalize(&self, data: &PointMatrix, side: Side) -> PointMatrix {
        sub_row(data, self.mean(side)) / self.scale(side)
    }

    /// Working coordinates to real coordinates.
    pub fn denormalize(&self, data: &PointMatrix, side: Side) -> PointMatrix {
        add_row(&(data * self.scale(side)), self.mean(side))
    }
}

/// Root-mean-square row norm of centered data.
///
/// Falls back to `1.0` for a degenerate cloud (all points coincide) so the
/// forward map stays finite.
fn rms_norm(centered: &PointMatrix) -> f64 {
    if centered.nrows() == 0 {
        return 1.0;
    }
    let scale = (centered.norm_squared() / centered.nrows() as f64).sqrt();
    if scale > f64::EPSILON && scale.is_finite() {
        scale
    } else {
        1.0
    }
}
