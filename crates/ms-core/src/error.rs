//! Error types for core parsing and configuration

use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed UTAU argument list
    #[error("Invalid arguments: {0}")]
    InvalidArgument(String),

    /// Pitch bend string contains characters outside the alphabet
    #[error("Malformed pitch bend string: {0}")]
    BadPitchBend(String),

    /// Note name could not be converted to MIDI
    #[error("Unrecognized note name: {0}")]
    BadNoteName(String),

    /// Config file unreadable or malformed
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
