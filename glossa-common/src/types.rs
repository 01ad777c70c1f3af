//! Core identifiers and payload types
//!
//! A *clip* is one paragraph's synthesized audio. Clips are addressed by
//! their 0-based paragraph index, stable for the lifetime of one exercise.

use crate::error::PayloadError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Index of a paragraph's audio clip within an exercise
pub type ClipId = usize;

/// Minimum accepted encoded payload length.
///
/// Payloads below this are truncated or placeholder data from the
/// generation service and must never reach a decoder.
pub const MIN_ENCODED_PAYLOAD_CHARS: usize = 1000;

/// Per-clip synthesis status as reported by the progress stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipStatus {
    Pending,
    Generating,
    Complete,
}

impl std::fmt::Display for ClipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClipStatus::Pending => write!(f, "pending"),
            ClipStatus::Generating => write!(f, "generating"),
            ClipStatus::Complete => write!(f, "complete"),
        }
    }
}

/// One clip's encoded audio payload.
///
/// The wire format is a base64 string holding a WAV-container PCM stream.
/// Payloads are immutable after receipt; the engine only ever reads them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipPayload {
    encoded: String,
}

impl ClipPayload {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self {
            encoded: encoded.into(),
        }
    }

    /// Encoded length in characters
    pub fn encoded_len(&self) -> usize {
        self.encoded.len()
    }

    /// Check the payload against the minimum-length threshold
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.encoded.len() < MIN_ENCODED_PAYLOAD_CHARS {
            return Err(PayloadError::TooShort {
                len: self.encoded.len(),
                min: MIN_ENCODED_PAYLOAD_CHARS,
            });
        }
        Ok(())
    }

    /// Decode to raw container bytes.
    ///
    /// Validates the length threshold first; a too-short payload is never
    /// handed to base64 decoding at all.
    pub fn decode(&self) -> Result<Vec<u8>, PayloadError> {
        self.validate()?;
        Ok(BASE64.decode(self.encoded.as_bytes())?)
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_payload_rejected() {
        let payload = ClipPayload::new("A".repeat(500));
        assert!(matches!(
            payload.validate(),
            Err(PayloadError::TooShort { len: 500, .. })
        ));
        assert!(payload.decode().is_err());
    }

    #[test]
    fn test_threshold_boundary() {
        // Exactly at the threshold is accepted (length check only)
        let payload = ClipPayload::new("A".repeat(MIN_ENCODED_PAYLOAD_CHARS));
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_decode_round_trip() {
        let raw = vec![0x52u8; 900]; // long enough once encoded
        let encoded = BASE64.encode(&raw);
        assert!(encoded.len() >= MIN_ENCODED_PAYLOAD_CHARS);
        let payload = ClipPayload::new(encoded);
        assert_eq!(payload.decode().unwrap(), raw);
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let payload = ClipPayload::new("!not base64!".repeat(200));
        assert!(matches!(
            payload.decode(),
            Err(PayloadError::Encoding(_))
        ));
    }

    #[test]
    fn test_clip_status_serde() {
        let status: ClipStatus = serde_json::from_str("\"generating\"").unwrap();
        assert_eq!(status, ClipStatus::Generating);
        assert_eq!(serde_json::to_string(&ClipStatus::Complete).unwrap(), "\"complete\"");
    }
}
