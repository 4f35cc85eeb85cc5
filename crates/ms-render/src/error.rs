//! Render error kinds and their HTTP status mapping

use std::path::PathBuf;

use thiserror::Error;

/// Render pipeline error types
#[derive(Error, Debug)]
pub enum RenderError {
    /// Input file does not exist
    #[error("Input file not found: {0}")]
    NotFound(PathBuf),

    /// Request carries values the pipeline cannot work with
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Render aborted by cancellation
    #[error("Render cancelled")]
    Cancelled,

    /// DSP precondition failure
    #[error(transparent)]
    Dsp(#[from] ms_dsp::DspError),

    /// Vocoder or separator failure that could not be recovered
    #[error(transparent)]
    Ml(#[from] ms_ml::MlError),

    /// File I/O failure
    #[error(transparent)]
    File(#[from] ms_file::FileError),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RenderError {
    /// HTTP status code this error surfaces as.
    pub fn status_code(&self) -> u16 {
        match self {
            RenderError::NotFound(_) => 404,
            RenderError::InvalidArgument(_) | RenderError::Dsp(_) => 400,
            RenderError::Cancelled => 499,
            RenderError::Ml(_) | RenderError::File(_) | RenderError::Internal(_) => 500,
        }
    }
}

/// Result type for render operations
pub type RenderResult<T> = Result<T, RenderError>;
