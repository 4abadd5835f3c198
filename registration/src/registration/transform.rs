//! Interface between the EM engine and a transform model.

use super::normalization::Normalization;
use super::state::EmState;
use lgcpd_core::point_cloud::PointMatrix;
use lgcpd_core::Result;

/// A point set transform detached from any engine, in real coordinates.
pub type TransformFn = Box<dyn Fn(&PointMatrix) -> Result<PointMatrix> + Send + Sync>;

/// A transform strategy driven by [`EmRegistration`](super::engine::EmRegistration).
///
/// The engine runs the expectation step, then calls `update_transform`,
/// `transform_point_cloud` and `update_variance` in that order.
pub trait TransformModel {
    /// Denormalized transform parameters, e.g. `(B, t)` for affine.
    type Parameters: Clone + std::fmt::Debug;

    /// Bind the model to the dimensionality `D` of the clouds. Called once
    /// during engine construction; fails if initial parameters do not fit.
    fn prepare(&mut self, _dim: usize) -> Result<()> {
        Ok(())
    }

    /// Called at the start of every iteration, before the expectation step.
    fn update_hyperparameters(&mut self, _state: &EmState) {}

    /// Refit the transform parameters from the current correspondences.
    fn update_transform(&mut self, state: &EmState) -> Result<()>;

    /// Apply the current transform to working-frame points.
    fn transform_point_cloud(&self, points: &PointMatrix) -> PointMatrix;

    /// Update `sigma2`, `diff` and the objective from the new transformed cloud.
    fn update_variance(&mut self, state: &mut EmState);

    /// Current parameters, mapped back to real coordinates.
    fn registration_parameters(&self, normalization: &Normalization) -> Self::Parameters;

    /// A standalone function applying the denormalized transform.
    fn transformation_function(&self, normalization: &Normalization) -> TransformFn;
}
