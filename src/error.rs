use thiserror::Error;

/// Errors raised while building or evaluating controllers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    /// Construction arguments that can never produce a valid controller
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A vector or matrix had a shape other than the one agreed at construction
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    /// Failure reported by a sub-controller itself
    #[error("controller failure: {0}")]
    Controller(String),
}

pub type ControlResult<T> = Result<T, ControlError>;

impl ControlError {
    /// Shortcut for vector length mismatches
    pub fn length(context: &str, expected: usize, actual: usize) -> Self {
        ControlError::DimensionMismatch {
            context: context.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Shortcut for matrix shape mismatches
    pub fn shape(context: &str, expected: (usize, usize), actual: (usize, usize)) -> Self {
        ControlError::DimensionMismatch {
            context: context.to_string(),
            expected: format!("{}x{}", expected.0, expected.1),
            actual: format!("{}x{}", actual.0, actual.1),
        }
    }
}
