//! Point set registration by expectation maximization
//!
//! This crate provides Coherent Point Drift style registration:
//! - Generic EM engine with pluggable transform models
//! - Affine CPD
//! - Landmark-guided correspondences
//! - Independent or joint input normalization

pub mod registration;

pub use registration::{
    gaussian_kernel, initialize_sigma2, low_rank_eigen, max_iterations_from_f64,
    registration_affine_cpd, AffineParameters, AffineRegistration, AffineTransform,
    Correspondence, EmRegistration, EmState, IterationInfo, Normalization, RegistrationConfig,
    RegistrationResult, Side, TransformFn, TransformModel,
};
pub use lgcpd_core::{ComputeMode, Error, Result};
