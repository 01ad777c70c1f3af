//! Error types shared across glossa crates

use thiserror::Error;

/// Errors produced while validating or decoding a clip payload
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Payload is below the minimum accepted encoded length.
    ///
    /// Truncated or placeholder payloads from the generation service arrive
    /// as very short strings; anything under the threshold is never loaded.
    #[error("payload too short: {len} encoded chars (minimum {min})")]
    TooShort { len: usize, min: usize },

    /// Payload is not valid base64
    #[error("payload is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
}
