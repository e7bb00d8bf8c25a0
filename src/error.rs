//! Error types for the nested cross-validation workflow

use thiserror::Error;

/// Result type alias for crate operations
pub type Result<T> = std::result::Result<T, NcvError>;

/// Main error type of the crate
#[derive(Error, Debug)]
pub enum NcvError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Estimator did not converge within {iterations} iterations")]
    ConvergenceError { iterations: usize },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Computation error: {0}")]
    ComputationError(String),
}

impl From<polars::error::PolarsError> for NcvError {
    fn from(err: polars::error::PolarsError) -> Self {
        NcvError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for NcvError {
    fn from(err: serde_json::Error) -> Self {
        NcvError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for NcvError {
    fn from(err: ndarray::ShapeError) -> Self {
        NcvError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
