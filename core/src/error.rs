//! Error type shared by every crate in the workspace.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        context: String,
    },

    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
        context: String,
    },

    #[error("Invalid parameter {name}: expected {expected}, got {value}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Matrix is not positive semi-definite: {0}")]
    NotPositiveSemiDefinite(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Callback aborted registration: {0}")]
    Callback(String),
}

impl Error {
    pub fn invalid_parameter(
        name: &'static str,
        value: impl std::fmt::Display,
        expected: &'static str,
    ) -> Self {
        Self::InvalidParameter {
            name,
            value: value.to_string(),
            expected,
        }
    }

    pub fn dimension_mismatch(expected: usize, actual: usize, context: impl Into<String>) -> Self {
        Self::DimensionMismatch {
            expected,
            actual,
            context: context.into(),
        }
    }

    pub fn shape_mismatch(
        expected: (usize, usize),
        actual: (usize, usize),
        context: impl Into<String>,
    ) -> Self {
        Self::ShapeMismatch {
            expected,
            actual,
            context: context.into(),
        }
    }
}
