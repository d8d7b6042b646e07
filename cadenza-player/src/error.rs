//! Error types for cadenza-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Errors stay inside the engine: the handle-based control surface logs them and
//! degrades to sentinel values instead of returning them.

use thiserror::Error;

/// Main error type for cadenza-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio decoding errors (unsupported format, corrupt data)
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Playback engine errors
    #[error("Playback error: {0}")]
    Playback(String),

    /// Medium could not be found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<cadenza_common::Error> for Error {
    fn from(err: cadenza_common::Error) -> Self {
        match err {
            cadenza_common::Error::Io(e) => Error::Io(e),
            other => Error::Config(other.to_string()),
        }
    }
}

/// Convenience Result type using cadenza-player Error
pub type Result<T> = std::result::Result<T, Error>;
