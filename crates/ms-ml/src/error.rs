//! Error types for model inference

use thiserror::Error;

/// ML processing error types
#[derive(Error, Debug)]
pub enum MlError {
    /// Model file not found
    #[error("Model not found: {path}")]
    ModelNotFound { path: String },

    /// Tract load or inference error
    #[error("Tract error: {0}")]
    Tract(String),

    /// Model returned an unexpected tensor shape
    #[error("Invalid output shape: expected {expected}, got {got}")]
    InvalidOutputShape { expected: String, got: String },

    /// Spectral pre/post processing around the model failed
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ms_dsp::DspError> for MlError {
    fn from(e: ms_dsp::DspError) -> Self {
        MlError::ProcessingFailed(e.to_string())
    }
}

/// Result type for ML operations
pub type MlResult<T> = Result<T, MlError>;
