//! Progress stream client
//!
//! Consumes the generation service's newline-delimited progress feed for
//! one session and folds it into a per-clip status snapshot. The merge
//! logic lives in `ProgressTracker`, a plain struct with no I/O, so the
//! handling of every record shape is directly testable; the client wraps it
//! with the transport and publishes snapshots over a watch channel.
//!
//! The client never reconnects: a clean `complete`, an in-band `error`, or
//! a transport failure all end the stream for good. Restarting generation
//! (and deriving a fresh session) is the host's call.

use crate::error::{Error, Result};
use futures::StreamExt;
use glossa_common::types::{ClipId, ClipStatus};
use glossa_common::wire::{ProgressRecord, ProgressRecordKind};
use std::collections::HashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Point-in-time view of generation progress
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    /// Per-clip synthesis status
    pub clips: HashMap<ClipId, ClipStatus>,

    /// Declared total clip count (None until the stream announces one)
    pub total_clips: Option<usize>,

    /// Terminal: the exercise is ready to fetch
    pub is_complete: bool,

    /// Terminal: generation failed
    pub error: Option<String>,
}

impl ProgressSnapshot {
    /// Count of clips reported complete so far
    pub fn complete_count(&self) -> usize {
        self.clips
            .values()
            .filter(|status| **status == ClipStatus::Complete)
            .count()
    }

    pub fn is_terminal(&self) -> bool {
        self.is_complete || self.error.is_some()
    }
}

/// Pure merge logic for progress records.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    snapshot: ProgressSnapshot,
    /// The provisional total may be revised exactly once
    count_revised: bool,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record into the snapshot.
    ///
    /// Returns false when the record produced no state change - in
    /// particular, always false once the snapshot is terminal.
    pub fn apply(&mut self, record: &ProgressRecord) -> bool {
        if self.snapshot.is_terminal() {
            return false;
        }

        if let Some(error) = &record.error {
            self.snapshot.error = Some(error.clone());
            return true;
        }

        match record.kind {
            Some(ProgressRecordKind::Init) => {
                // Wholesale replacement of map and count estimate
                self.snapshot.clips = record.typed_progress().unwrap_or_default();
                self.snapshot.total_clips = record.total_paragraphs;
                true
            }
            Some(ProgressRecordKind::UpdateCount) => {
                if !self.count_revised {
                    if let Some(total) = record.total_paragraphs {
                        self.snapshot.total_clips = Some(total);
                        self.count_revised = true;
                    }
                } else if record.total_paragraphs.is_some() {
                    debug!("Ignoring repeated total revision");
                }
                self.merge_partial(record);
                true
            }
            Some(ProgressRecordKind::Complete) => {
                self.merge_partial(record);
                self.snapshot.is_complete = true;
                true
            }
            Some(ProgressRecordKind::Other) | None => {
                let mut changed = self.merge_partial(record);
                if let (Some(index), Some(status)) = (record.paragraph_index, record.status) {
                    changed |= self.snapshot.clips.insert(index, status) != Some(status);
                }
                changed
            }
        }
    }

    /// Merge a partial progress map, if the record carries one.
    fn merge_partial(&mut self, record: &ProgressRecord) -> bool {
        let Some(progress) = record.typed_progress() else {
            return false;
        };
        let mut changed = false;
        for (clip_id, status) in progress {
            changed |= self.snapshot.clips.insert(clip_id, status) != Some(status);
        }
        changed
    }

    /// Record a transport-level failure as terminal.
    pub fn transport_failed(&mut self, reason: String) {
        if !self.snapshot.is_terminal() {
            self.snapshot.error = Some(reason);
        }
    }

    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    pub fn is_terminal(&self) -> bool {
        self.snapshot.is_terminal()
    }
}

/// Live subscription to one session's progress feed.
pub struct ProgressStreamClient {
    rx: watch::Receiver<ProgressSnapshot>,
    task: JoinHandle<()>,
}

impl ProgressStreamClient {
    /// Connect to the progress feed for `session_id`.
    ///
    /// Without a session id there is nothing to subscribe to; callers
    /// simply don't construct a client in that case, and an empty id is
    /// rejected here.
    pub async fn connect(
        client: &reqwest::Client,
        base_url: &str,
        session_id: &str,
    ) -> Result<Self> {
        if session_id.is_empty() {
            return Err(Error::Stream("session id required".to_string()));
        }

        let url = format!(
            "{}/exercises/{}/progress",
            base_url.trim_end_matches('/'),
            session_id
        );
        let response = client.get(&url).send().await?.error_for_status()?;
        info!("Progress stream connected for session {}", session_id);

        let (tx, rx) = watch::channel(ProgressSnapshot::default());
        let task = tokio::spawn(run_stream(response, tx));

        Ok(Self { rx, task })
    }

    /// Watch receiver for snapshot updates
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.rx.clone()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait until the feed reaches a terminal state (complete or failed)
    /// and return the final snapshot.
    pub async fn wait_terminal(&mut self) -> ProgressSnapshot {
        loop {
            if self.rx.borrow().is_terminal() {
                return self.rx.borrow().clone();
            }
            if self.rx.changed().await.is_err() {
                // Stream task ended without a terminal record
                return self.rx.borrow().clone();
            }
        }
    }

    /// Drop the subscription without waiting for completion.
    pub fn close(&self) {
        self.task.abort();
    }
}

impl Drop for ProgressStreamClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Read newline-delimited records until a terminal state or EOF.
async fn run_stream(response: reqwest::Response, tx: watch::Sender<ProgressSnapshot>) {
    let mut tracker = ProgressTracker::new();
    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                // Transport failure is terminal; retry policy, if any,
                // belongs to the host via a fresh session
                warn!("Progress stream transport error: {}", e);
                tracker.transport_failed(format!("transport error: {}", e));
                let _ = tx.send(tracker.snapshot().clone());
                return;
            }
        };

        buffer.extend_from_slice(&bytes);
        while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            // Tolerate SSE-style framing around the JSON records
            let line = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<ProgressRecord>(line) {
                Ok(record) => {
                    if tracker.apply(&record) {
                        let _ = tx.send(tracker.snapshot().clone());
                    }
                    if tracker.is_terminal() {
                        info!("Progress stream reached terminal state");
                        return;
                    }
                }
                Err(e) => {
                    warn!("Skipping malformed progress record: {}", e);
                }
            }
        }
    }

    debug!("Progress stream ended without terminal record");
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> ProgressRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_init_replaces_wholesale() {
        let mut tracker = ProgressTracker::new();
        tracker.apply(&record(r#"{"paragraph_index":7,"status":"complete"}"#));
        tracker.apply(&record(
            r#"{"type":"init","progress":{"0":"pending","1":"pending"},"total_paragraphs":2}"#,
        ));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.clips.len(), 2);
        assert!(!snapshot.clips.contains_key(&7));
        assert_eq!(snapshot.total_clips, Some(2));
    }

    #[test]
    fn test_update_count_revises_total_exactly_once() {
        let mut tracker = ProgressTracker::new();
        tracker.apply(&record(r#"{"type":"init","progress":{},"total_paragraphs":6}"#));
        tracker.apply(&record(r#"{"type":"update_count","total_paragraphs":4}"#));
        assert_eq!(tracker.snapshot().total_clips, Some(4));

        // A second revision is ignored
        tracker.apply(&record(r#"{"type":"update_count","total_paragraphs":9}"#));
        assert_eq!(tracker.snapshot().total_clips, Some(4));
    }

    #[test]
    fn test_progress_merge_to_completion() {
        let mut tracker = ProgressTracker::new();
        tracker.apply(&record(r#"{"type":"update_count","total_paragraphs":4}"#));
        for index in 0..3 {
            tracker.apply(&record(&format!(
                r#"{{"paragraph_index":{},"status":"complete"}}"#,
                index
            )));
        }
        tracker.apply(&record(r#"{"paragraph_index":3,"status":"pending"}"#));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.complete_count(), 3);
        assert!(!snapshot.is_complete);

        tracker.apply(&record(r#"{"type":"complete"}"#));
        assert!(tracker.snapshot().is_complete);

        // Terminal: nothing changes state any more
        assert!(!tracker.apply(&record(r#"{"paragraph_index":3,"status":"complete"}"#)));
        assert_eq!(tracker.snapshot().complete_count(), 3);
    }

    #[test]
    fn test_error_record_is_terminal() {
        let mut tracker = ProgressTracker::new();
        tracker.apply(&record(r#"{"error":"voice model crashed"}"#));
        assert!(tracker.is_terminal());
        assert_eq!(
            tracker.snapshot().error.as_deref(),
            Some("voice model crashed")
        );
        assert!(!tracker.apply(&record(r#"{"type":"complete"}"#)));
        assert!(!tracker.snapshot().is_complete);
    }

    #[test]
    fn test_transport_failure_is_terminal() {
        let mut tracker = ProgressTracker::new();
        tracker.transport_failed("connection reset".to_string());
        assert!(tracker.is_terminal());
        assert!(!tracker.apply(&record(r#"{"paragraph_index":0,"status":"complete"}"#)));
    }

    #[test]
    fn test_unknown_record_kind_merges_like_per_clip() {
        let mut tracker = ProgressTracker::new();
        let changed = tracker.apply(&record(
            r#"{"type":"heartbeat","paragraph_index":1,"status":"generating"}"#,
        ));
        assert!(changed);
        assert_eq!(tracker.snapshot().clips[&1], ClipStatus::Generating);
    }
}
