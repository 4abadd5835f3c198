//! Hyperparameters of an EM registration.

use lgcpd_core::{ComputeMode, Error, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// Configuration for an EM registration.
///
/// Defaults follow the reference CPD settings: tolerance `0.001`, no outlier
/// component, landmark strength `ss2 = 0.1`, no normalization and no
/// iteration cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Initial variance. Estimated from the data when `None`.
    pub sigma2: Option<f64>,
    /// Iteration cap. Fractional values in serialized configs are truncated.
    #[serde(deserialize_with = "deserialize_max_iterations")]
    pub max_iterations: Option<usize>,
    /// Run exactly `max_iterations` iterations, ignoring `tolerance`.
    pub force_max_iterations: bool,
    pub tolerance: f64,
    /// Weight `w` of the uniform outlier component, in `[0, 1)`.
    pub outlier_weight: f64,
    /// Landmark anchoring strength. Smaller is stronger.
    pub ss2: f64,
    pub normalize: bool,
    /// Share one mean and scale between both clouds. Only used with `normalize`.
    pub normalize_joint: bool,
    pub backend: ComputeMode,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            sigma2: None,
            max_iterations: None,
            force_max_iterations: false,
            tolerance: 1e-3,
            outlier_weight: 0.0,
            ss2: 0.1,
            normalize: false,
            normalize_joint: false,
            backend: ComputeMode::Auto,
        }
    }
}

impl RegistrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sigma2(mut self, sigma2: f64) -> Self {
        self.sigma2 = Some(sigma2);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_force_max_iterations(mut self, force: bool) -> Self {
        self.force_max_iterations = force;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_outlier_weight(mut self, w: f64) -> Self {
        self.outlier_weight = w;
        self
    }

    pub fn with_ss2(mut self, ss2: f64) -> Self {
        self.ss2 = ss2;
        self
    }

    pub fn with_normalization(mut self, normalize: bool, joint: bool) -> Self {
        self.normalize = normalize;
        self.normalize_joint = joint;
        self
    }

    pub fn with_backend(mut self, backend: ComputeMode) -> Self {
        self.backend = backend;
        self
    }

    /// Check every hyperparameter against its documented range.
    pub fn validate(&self) -> Result<()> {
        if let Some(sigma2) = self.sigma2 {
            if !(sigma2 > 0.0) || !sigma2.is_finite() {
                return Err(Error::invalid_parameter(
                    "sigma2",
                    sigma2,
                    "a positive finite value",
                ));
            }
        }

        if !(self.tolerance >= 0.0) || !self.tolerance.is_finite() {
            return Err(Error::invalid_parameter(
                "tolerance",
                self.tolerance,
                "a non-negative finite value",
            ));
        }

        if !(0.0..1.0).contains(&self.outlier_weight) {
            return Err(Error::invalid_parameter(
                "outlier_weight",
                self.outlier_weight,
                "a value in [0, 1)",
            ));
        }

        if !(self.ss2 > 0.0) || !self.ss2.is_finite() {
            return Err(Error::invalid_parameter(
                "ss2",
                self.ss2,
                "a positive finite value",
            ));
        }

        Ok(())
    }

    /// Whether the iteration cap overrides the tolerance test.
    pub fn forces_iterations(&self) -> bool {
        self.force_max_iterations && self.max_iterations.is_some()
    }
}

/// Convert a possibly fractional iteration count into a cap.
///
/// Negative and non-finite values are rejected; fractional values are
/// truncated toward zero with a warning.
pub fn max_iterations_from_f64(value: f64) -> Result<usize> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::invalid_parameter(
            "max_iterations",
            value,
            "a non-negative integer",
        ));
    }

    let truncated = value.trunc();
    if truncated != value {
        tracing::warn!(
            "Received a non-integer value for max_iterations: {}. Casting to {}.",
            value,
            truncated
        );
    }
    Ok(truncated as usize)
}

fn deserialize_max_iterations<'de, D>(deserializer: D) -> std::result::Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer)?
        .map(|v| max_iterations_from_f64(v).map_err(serde::de::Error::custom))
        .transpose()
}
