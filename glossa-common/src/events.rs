//! Event types for the glossa audio engine
//!
//! # Architecture
//!
//! The engine uses hybrid communication:
//! - **EventBus** (tokio::broadcast): one-to-many notification of hosts
//! - **Command methods** (async fns on the controller): request → handler
//! - **Shared state** (Arc + RwLock): read-heavy access from screens
//!
//! Events are the observable side of the engine: every playback transition,
//! position tick, and sequencer decision is published here so the hosting
//! screen can re-render without polling.

use crate::types::ClipId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Player event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// The playing clip changed (None = nothing playing)
    PlaybackChanged {
        playing: Option<ClipId>,
        timestamp: DateTime<Utc>,
    },

    /// Position update for a clip (bounded rate, also emitted on seek)
    PositionChanged {
        clip_id: ClipId,
        position_ms: u64,
        duration_ms: Option<u64>,
        timestamp: DateTime<Utc>,
    },

    /// A clip's duration became known after its metadata resolved
    DurationResolved {
        clip_id: ClipId,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A clip reached its natural end.
    ///
    /// Never emitted for a caller-initiated pause; this distinction is what
    /// the sequencer's advance decision rests on.
    ClipFinished {
        clip_id: ClipId,
        timestamp: DateTime<Utc>,
    },

    /// A clip failed to load or decode and will ignore play requests
    ClipUnplayable {
        clip_id: ClipId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Master volume changed
    VolumeChanged {
        volume: f32,
        timestamp: DateTime<Utc>,
    },

    /// Listen-to-all started from the given anchor clip
    SequencerStarted {
        anchor: ClipId,
        timestamp: DateTime<Utc>,
    },

    /// The sequencer advanced to the next clip.
    ///
    /// Hosts scroll the new clip into view on this event.
    SequencerAdvanced {
        from: ClipId,
        to: ClipId,
        timestamp: DateTime<Utc>,
    },

    /// The sequencer returned to idle.
    ///
    /// `completed` is true when the last clip finished naturally, false on
    /// explicit stop or user interruption.
    SequencerStopped {
        completed: bool,
        timestamp: DateTime<Utc>,
    },
}

impl PlayerEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::PlaybackChanged { .. } => "PlaybackChanged",
            PlayerEvent::PositionChanged { .. } => "PositionChanged",
            PlayerEvent::DurationResolved { .. } => "DurationResolved",
            PlayerEvent::ClipFinished { .. } => "ClipFinished",
            PlayerEvent::ClipUnplayable { .. } => "ClipUnplayable",
            PlayerEvent::VolumeChanged { .. } => "VolumeChanged",
            PlayerEvent::SequencerStarted { .. } => "SequencerStarted",
            PlayerEvent::SequencerAdvanced { .. } => "SequencerAdvanced",
            PlayerEvent::SequencerStopped { .. } => "SequencerStopped",
        }
    }
}

/// One-to-many event broadcaster.
///
/// Thin wrapper over `tokio::sync::broadcast` so emitters never block and
/// slow subscribers simply lag (dropping oldest events).
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events.
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` if no subscribers exist.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_emit_no_subscribers() {
        let bus = EventBus::new(100);
        let event = PlayerEvent::PlaybackChanged {
            playing: Some(0),
            timestamp: chrono::Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        // Lossy emit never panics without subscribers
        bus.emit_lossy(event);
    }

    #[tokio::test]
    async fn test_eventbus_emit_with_subscriber() {
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(PlayerEvent::ClipFinished {
            clip_id: 2,
            timestamp: chrono::Utc::now(),
        })
        .unwrap();

        match rx.recv().await.unwrap() {
            PlayerEvent::ClipFinished { clip_id, .. } => assert_eq!(clip_id, 2),
            other => panic!("wrong event type: {}", other.event_type()),
        }
    }

    #[test]
    fn test_event_type_names() {
        let event = PlayerEvent::SequencerStopped {
            completed: true,
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(event.event_type(), "SequencerStopped");
    }

    #[test]
    fn test_event_serde_tagging() {
        let event = PlayerEvent::PositionChanged {
            clip_id: 1,
            position_ms: 1500,
            duration_ms: Some(10000),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PositionChanged");
        assert_eq!(json["position_ms"], 1500);
    }
}
