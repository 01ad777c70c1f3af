//! Error types for glossa-audio
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Playback failures are deliberately non-fatal: the engine
//! logs them, marks the affected clip unplayable, and keeps the exercise
//! usable. These types cover the cases that do need to reach a caller
//! (configuration, network, backend bring-up).

use thiserror::Error;

/// Main error type for glossa-audio
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Clip payload failed validation or base64 decoding
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] glossa_common::PayloadError),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Playback backend errors
    #[error("Backend error: {0}")]
    Backend(String),

    /// Progress stream errors
    #[error("Stream error: {0}")]
    Stream(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using glossa-audio Error
pub type Result<T> = std::result::Result<T, Error>;
