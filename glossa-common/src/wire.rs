//! Wire formats for the exercise-generation service
//!
//! Two endpoints are consumed:
//! - the progress stream: a long-lived GET keyed by session id, emitting
//!   newline-delimited JSON records while paragraph audio is synthesized,
//! - the completed-exercise fetch: a GET returning either a "generating"
//!   placeholder or the finished activity with its audio payloads.

use crate::types::{ClipId, ClipStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Declared type of a progress record.
///
/// Per-clip updates carry no `type` field at all; anything unrecognized is
/// folded into `Other` and treated the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressRecordKind {
    Init,
    UpdateCount,
    Complete,
    #[serde(other)]
    Other,
}

/// One record from the progress stream.
///
/// All fields are optional on the wire; which ones are present depends on
/// the record kind.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressRecord {
    #[serde(rename = "type", default)]
    pub kind: Option<ProgressRecordKind>,

    /// Full or partial per-paragraph status map, keyed by stringified index
    #[serde(default)]
    pub progress: Option<HashMap<String, ClipStatus>>,

    /// Declared total paragraph count
    #[serde(default)]
    pub total_paragraphs: Option<usize>,

    /// Single-clip update: which paragraph
    #[serde(default)]
    pub paragraph_index: Option<ClipId>,

    /// Single-clip update: its new status
    #[serde(default)]
    pub status: Option<ClipStatus>,

    /// Generation failure reported in-band
    #[serde(default)]
    pub error: Option<String>,
}

impl ProgressRecord {
    /// Convert the stringified-index map to typed clip ids.
    ///
    /// Unparsable keys are dropped with a warning rather than failing the
    /// whole record.
    pub fn typed_progress(&self) -> Option<HashMap<ClipId, ClipStatus>> {
        self.progress.as_ref().map(|map| {
            map.iter()
                .filter_map(|(key, status)| match key.parse::<ClipId>() {
                    Ok(id) => Some((id, *status)),
                    Err(_) => {
                        warn!("Dropping progress entry with non-numeric key '{}'", key);
                        None
                    }
                })
                .collect()
        })
    }
}

/// Response body of the completed-exercise fetch
#[derive(Debug, Clone, Deserialize)]
pub struct ExerciseResponse {
    /// "generating" while the two-phase generate-then-persist is in flight
    #[serde(default)]
    pub status: Option<String>,

    /// Present once the exercise is persisted
    #[serde(default)]
    pub activity: Option<Activity>,
}

/// A finished exercise activity.
///
/// Only the audio payloads are typed; the exercise content itself
/// (paragraph text, prompts, grading keys) is passed through for the host
/// screen untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    /// Ordered per-paragraph audio payloads
    #[serde(rename = "_audio_data", default)]
    pub audio_data: Vec<AudioClipEntry>,

    /// Everything else in the activity document
    #[serde(flatten)]
    pub content: serde_json::Map<String, serde_json::Value>,
}

/// One paragraph's encoded audio as delivered in `_audio_data`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioClipEntry {
    pub audio_base64: String,
}

// ========================================
// Tests
// ========================================
