//! Error types for file I/O

use thiserror::Error;

/// File I/O error types
#[derive(Error, Debug)]
pub enum FileError {
    /// WAV codec error
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Unsupported sample format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for file operations
pub type FileResult<T> = Result<T, FileError>;
