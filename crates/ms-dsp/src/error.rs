//! Error types for DSP operations

use thiserror::Error;

/// DSP error types
#[derive(Error, Debug)]
pub enum DspError {
    /// Precondition failure on sizes, shapes, or knot ordering
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for DSP operations
pub type DspResult<T> = Result<T, DspError>;
