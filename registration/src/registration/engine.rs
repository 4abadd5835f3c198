//! EM registration engine.
//!
//! Each iteration:
//! 1. `update_hyperparameters` on the model
//! 2. expectation step (soft correspondences `P`)
//! 3. maximization: `update_transform`, `transform_point_cloud`, `update_variance`
//!
//! Inputs are normalized once at construction and outputs are mapped back
//! into the target frame on the way out.

use super::config::RegistrationConfig;
use super::expectation::{expectation, initialize_sigma2, Correspondence, ExpectationInput};
use super::normalization::{Normalization, Side};
use super::state::{variance_floor, EmState};
use super::transform::{TransformFn, TransformModel};
use lgcpd_core::point_cloud::{stack_rows, PointMatrix};
use lgcpd_core::{Backend, Error, Result};
use nalgebra::{DMatrix, DMatrixView};

/// What a callback sees after each iteration. Point arrays are in the
/// working (normalized) frame.
#[derive(Debug)]
pub struct IterationInfo<'a> {
    /// Number of completed iterations, starting at 1.
    pub iteration: usize,
    /// Objective reported by the model. Informational only; may be infinite.
    pub error: f64,
    /// Target points `X`.
    pub target: &'a PointMatrix,
    /// Transformed source points `TY` without landmarks.
    pub transformed: DMatrixView<'a, f64>,
    pub sigma2: f64,
    pub diff: f64,
}

/// Final outcome of [`EmRegistration::register`].
#[derive(Debug, Clone)]
pub struct RegistrationResult<P> {
    /// Transformed source points in the target frame, `M x D`.
    pub transformed_points: PointMatrix,
    /// Denormalized transform parameters.
    pub parameters: P,
    pub iterations: usize,
    /// Final variance in the working frame.
    pub sigma2: f64,
}

/// EM point set registration of a source cloud `Y` onto a target cloud `X`.
pub struct EmRegistration<T: TransformModel> {
    state: EmState,
    model: T,
    normalization: Normalization,
    max_iterations: Option<usize>,
    force_max_iterations: bool,
    backend: Backend,
}

impl<T: TransformModel> EmRegistration<T> {
    /// Unguided registration.
    ///
    /// `target` is `N x D`, `source` is `M x D`.
    pub fn new(
        target: &PointMatrix,
        source: &PointMatrix,
        model: T,
        config: &RegistrationConfig,
    ) -> Result<Self> {
        Self::build(target, source, None, model, config)
    }

    /// Landmark-guided registration. Row `i` of `target_landmarks`
    /// corresponds to row `i` of `source_landmarks`.
    pub fn with_landmarks(
        target: &PointMatrix,
        source: &PointMatrix,
        target_landmarks: &PointMatrix,
        source_landmarks: &PointMatrix,
        model: T,
        config: &RegistrationConfig,
    ) -> Result<Self> {
        Self::build(
            target,
            source,
            Some((target_landmarks, source_landmarks)),
            model,
            config,
        )
    }

    fn build(
        target: &PointMatrix,
        source: &PointMatrix,
        landmarks: Option<(&PointMatrix, &PointMatrix)>,
        mut model: T,
        config: &RegistrationConfig,
    ) -> Result<Self> {
        config.validate()?;
        validate_cloud(target, "target point cloud (X)")?;
        validate_cloud(source, "source point cloud (Y)")?;

        let (n, d) = target.shape();
        let m = source.nrows();
        if source.ncols() != d {
            return Err(Error::dimension_mismatch(
                d,
                source.ncols(),
                "source point cloud (Y) vs target point cloud (X)",
            ));
        }

        let (x_landmarks, y_landmarks) = match landmarks {
            Some((xl, yl)) => {
                validate_cloud(xl, "target landmarks")?;
                validate_cloud(yl, "source landmarks")?;
                if xl.shape() != yl.shape() {
                    return Err(Error::shape_mismatch(
                        xl.shape(),
                        yl.shape(),
                        "source landmarks vs target landmarks",
                    ));
                }
                if xl.ncols() != d {
                    return Err(Error::dimension_mismatch(d, xl.ncols(), "landmarks"));
                }
                (xl.clone(), yl.clone())
            }
            None => (DMatrix::zeros(0, d), DMatrix::zeros(0, d)),
        };
        let k = x_landmarks.nrows();
        if k > 0 {
            tracing::info!("Enabling landmark-guided registration with {} landmarks", k);
        }

        model.prepare(d)?;

        let x_with_landmarks = stack_rows(target, &x_landmarks)?;
        let y_with_landmarks = stack_rows(source, &y_landmarks)?;

        let normalization = Normalization::compute(
            &x_with_landmarks,
            &y_with_landmarks,
            config.normalize,
            config.normalize_joint,
        )?;

        let x_points = normalization.normalize(target, Side::Target);
        let y_points = normalization.normalize(source, Side::Source);
        let x_landmarks = normalization.normalize(&x_landmarks, Side::Target);
        let y_landmarks = normalization.normalize(&y_landmarks, Side::Source);
        let x_with_landmarks = normalization.normalize(&x_with_landmarks, Side::Target);
        let y_with_landmarks = normalization.normalize(&y_with_landmarks, Side::Source);
        let ty = y_with_landmarks.clone();

        let sigma2 = match config.sigma2 {
            Some(s) => s,
            None => {
                let s = initialize_sigma2(&x_points, &y_points);
                if s > 0.0 {
                    s
                } else {
                    variance_floor(config.tolerance)
                }
            }
        };

        let backend = config.backend.resolve();
        tracing::debug!(
            "EM registration: N={}, M={}, D={}, K={}, sigma2={}, backend={:?}",
            n,
            m,
            d,
            k,
            sigma2,
            backend
        );

        let state = EmState {
            x_points,
            x_landmarks,
            x_with_landmarks,
            y_points,
            y_landmarks,
            y_with_landmarks,
            ty,
            n,
            m,
            d,
            k,
            sigma2,
            tolerance: config.tolerance,
            outlier_weight: config.outlier_weight,
            ss2: config.ss2,
            diff: f64::INFINITY,
            objective: f64::INFINITY,
            iteration: 0,
            correspondence: Correspondence::zeros(m, n, k, d),
        };

        Ok(Self {
            state,
            model,
            normalization,
            max_iterations: config.max_iterations,
            force_max_iterations: config.forces_iterations(),
            backend,
        })
    }

    /// Run the EM loop to termination.
    pub fn register(&mut self) -> Result<RegistrationResult<T::Parameters>> {
        self.register_with_callback(|_| Ok(()))
    }

    /// Run the EM loop, invoking `callback` after every iteration.
    ///
    /// An error returned by the callback stops the registration and is
    /// returned as is.
    pub fn register_with_callback<F>(&mut self, mut callback: F) -> Result<RegistrationResult<T::Parameters>>
    where
        F: FnMut(&IterationInfo<'_>) -> Result<()>,
    {
        self.state.ty = self.model.transform_point_cloud(&self.state.y_with_landmarks);

        while self.should_continue() {
            self.iterate()?;

            let info = IterationInfo {
                iteration: self.state.iteration,
                error: self.state.objective,
                target: &self.state.x_points,
                transformed: self.state.transformed_points(),
                sigma2: self.state.sigma2,
                diff: self.state.diff,
            };
            callback(&info)?;
        }

        tracing::info!(
            "Registration finished after {} iterations (sigma2={:.6e}, diff={:.6e})",
            self.state.iteration,
            self.state.sigma2,
            self.state.diff
        );

        Ok(RegistrationResult {
            transformed_points: self.transformed_points(),
            parameters: self.registration_parameters(),
            iterations: self.state.iteration,
            sigma2: self.state.sigma2,
        })
    }

    /// Loop condition: under the cap, and either forced or not yet converged.
    fn should_continue(&self) -> bool {
        let under_cap = self
            .max_iterations
            .map_or(true, |cap| self.state.iteration < cap);
        under_cap && (self.force_max_iterations || self.state.diff > self.state.tolerance)
    }

    /// Run one EM iteration.
    pub fn iterate(&mut self) -> Result<()> {
        self.model.update_hyperparameters(&self.state);
        self.expectation();
        self.maximization()?;
        self.state.iteration += 1;

        tracing::debug!(
            "iteration {}: sigma2={:.6e} diff={:.6e} Np={:.6}",
            self.state.iteration,
            self.state.sigma2,
            self.state.diff,
            self.state.correspondence.np_without_landmarks
        );
        Ok(())
    }

    fn expectation(&mut self) {
        let correspondence = expectation(
            &ExpectationInput {
                x: &self.state.x_points,
                x_with_landmarks: &self.state.x_with_landmarks,
                ty: &self.state.ty,
                num_source: self.state.m,
                num_landmarks: self.state.k,
                sigma2: self.state.sigma2,
                outlier_weight: self.state.outlier_weight,
                ss2: self.state.ss2,
            },
            self.backend,
        );
        self.state.correspondence = correspondence;
    }

    fn maximization(&mut self) -> Result<()> {
        self.model.update_transform(&self.state)?;
        self.state.ty = self.model.transform_point_cloud(&self.state.y_with_landmarks);
        self.model.update_variance(&mut self.state);
        Ok(())
    }

    /// Transformed source points in the target frame, `M x D`.
    pub fn transformed_points(&self) -> PointMatrix {
        self.normalization
            .denormalize(&self.state.transformed_points().into_owned(), Side::Target)
    }

    /// Transformed source landmarks in the target frame, `K x D`.
    pub fn transformed_landmarks(&self) -> PointMatrix {
        self.normalization
            .denormalize(&self.state.transformed_landmarks().into_owned(), Side::Target)
    }

    pub fn registration_parameters(&self) -> T::Parameters {
        self.model.registration_parameters(&self.normalization)
    }

    /// Standalone transform in real coordinates, usable after the engine is dropped.
    pub fn transformation_function(&self) -> TransformFn {
        self.model.transformation_function(&self.normalization)
    }

    pub fn state(&self) -> &EmState {
        &self.state
    }

    pub fn correspondence(&self) -> &Correspondence {
        &self.state.correspondence
    }

    pub fn normalization(&self) -> &Normalization {
        &self.normalization
    }

    pub fn model(&self) -> &T {
        &self.model
    }

    pub fn sigma2(&self) -> f64 {
        self.state.sigma2
    }

    pub fn diff(&self) -> f64 {
        self.state.diff
    }

    pub fn iteration(&self) -> usize {
        self.state.iteration
    }

    pub fn num_landmarks(&self) -> usize {
        self.state.k
    }

    pub fn is_landmark_guided(&self) -> bool {
        self.state.k > 0
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }
}

fn validate_cloud(points: &PointMatrix, name: &str) -> Result<()> {
    if points.nrows() == 0 || points.ncols() == 0 {
        return Err(Error::InvalidInput(format!(
            "the {} must be a non-empty 2D array, got shape {:?}",
            name,
            points.shape()
        )));
    }
    if points.iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidInput(format!(
            "the {} contains non-finite values",
            name
        )));
    }
    Ok(())
}
