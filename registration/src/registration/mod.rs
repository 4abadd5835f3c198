//! EM Registration Module
//!
//! Coherent Point Drift style registration with optional landmark guidance:
//! - EM engine generic over the transform model
//! - Affine transform model
//! - Input normalization
//! - Gaussian kernel helpers for deformable models

pub mod affine;
pub mod config;
pub mod engine;
pub mod expectation;
pub mod kernel;
pub mod normalization;
pub mod state;
pub mod transform;


pub use affine::{AffineParameters, AffineTransform};
pub use config::{max_iterations_from_f64, RegistrationConfig};
pub use engine::{EmRegistration, IterationInfo, RegistrationResult};
pub use expectation::{initialize_sigma2, Correspondence};
pub use kernel::{gaussian_kernel, low_rank_eigen};
pub use lgcpd_core::{Error, Result};
pub use normalization::{Normalization, Side};
pub use state::EmState;
pub use transform::{TransformFn, TransformModel};

use lgcpd_core::point_cloud::PointMatrix;

/// Affine registration engine.
pub type AffineRegistration = EmRegistration<AffineTransform>;

/// Affine CPD registration of `source` onto `target`.
///
/// # Arguments
///
/// * `target` - Target points `X`, `N x D`
/// * `source` - Source points `Y`, `M x D`
/// * `landmarks` - Optional `(target_landmarks, source_landmarks)`, both `K x D`
/// * `config` - Hyperparameters
///
/// # Example
///
/// ```
/// # use lgcpd_registration::registration::{registration_affine_cpd, RegistrationConfig};
/// # use nalgebra::DMatrix;
/// let x = DMatrix::from_row_slice(4, 2, &[0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]);
/// let y = x.map(|v| v * 0.9);
/// let result = registration_affine_cpd(&x, &y, None, &RegistrationConfig::default()).unwrap();
/// assert_eq!(result.transformed_points.shape(), (4, 2));
/// ```
pub fn registration_affine_cpd(
    target: &PointMatrix,
    source: &PointMatrix,
    landmarks: Option<(&PointMatrix, &PointMatrix)>,
    config: &RegistrationConfig,
) -> Result<RegistrationResult<AffineParameters>> {
    let mut reg = match landmarks {
        Some((xl, yl)) => {
            AffineRegistration::with_landmarks(target, source, xl, yl, AffineTransform::new(), config)?
        }
        None => AffineRegistration::new(target, source, AffineTransform::new(), config)?,
    };
    reg.register()
}
