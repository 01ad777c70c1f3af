//! Shared playback state
//!
//! Thread-safe shared state observed by the hosting screen. The controller
//! is the only writer; hosts read through the accessors or subscribe to the
//! event bus for push updates.

use glossa_common::events::{EventBus, PlayerEvent};
use glossa_common::types::ClipId;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tokio::sync::RwLock;

/// Engine lifecycle.
///
/// Explicit state instead of ambient "mid-teardown" flags: operations are
/// accepted only while Active, and teardown runs exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    TearingDown,
    Disposed,
}

/// Shared state accessible by all components.
///
/// Uses RwLock for concurrent read access with rare writes.
pub struct PlayerState {
    /// Currently playing clip (None if nothing plays)
    playing: RwLock<Option<ClipId>>,

    /// Last known position per clip, milliseconds
    positions: RwLock<HashMap<ClipId, u64>>,

    /// Resolved duration per clip, milliseconds
    durations: RwLock<HashMap<ClipId, u64>>,

    /// Master volume (0.0-1.0)
    volume: RwLock<f32>,

    /// Engine lifecycle state
    lifecycle: RwLock<Lifecycle>,

    /// Event broadcaster for host screens
    events: EventBus,
}

impl PlayerState {
    pub fn new(event_capacity: usize, initial_volume: f32) -> Self {
        Self {
            playing: RwLock::new(None),
            positions: RwLock::new(HashMap::new()),
            durations: RwLock::new(HashMap::new()),
            volume: RwLock::new(initial_volume.clamp(0.0, 1.0)),
            lifecycle: RwLock::new(Lifecycle::Active),
            events: EventBus::new(event_capacity),
        }
    }

    /// Broadcast an event to all subscribers (no receivers is OK)
    pub fn broadcast(&self, event: PlayerEvent) {
        self.events.emit_lossy(event);
    }

    /// Subscribe to the player event stream
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub async fn playing(&self) -> Option<ClipId> {
        *self.playing.read().await
    }

    pub async fn set_playing(&self, clip_id: Option<ClipId>) {
        *self.playing.write().await = clip_id;
    }

    /// Swap the playing clip, returning the previous value
    pub async fn replace_playing(&self, clip_id: Option<ClipId>) -> Option<ClipId> {
        let mut guard = self.playing.write().await;
        std::mem::replace(&mut *guard, clip_id)
    }

    pub async fn position_ms(&self, clip_id: ClipId) -> u64 {
        self.positions.read().await.get(&clip_id).copied().unwrap_or(0)
    }

    pub async fn set_position_ms(&self, clip_id: ClipId, position_ms: u64) {
        self.positions.write().await.insert(clip_id, position_ms);
    }

    pub async fn duration_ms(&self, clip_id: ClipId) -> Option<u64> {
        self.durations.read().await.get(&clip_id).copied()
    }

    pub async fn set_duration_ms(&self, clip_id: ClipId, duration_ms: u64) {
        self.durations.write().await.insert(clip_id, duration_ms);
    }

    /// Snapshot of all known positions
    pub async fn positions(&self) -> HashMap<ClipId, u64> {
        self.positions.read().await.clone()
    }

    /// Snapshot of all resolved durations
    pub async fn durations(&self) -> HashMap<ClipId, u64> {
        self.durations.read().await.clone()
    }

    pub async fn forget_clip(&self, clip_id: ClipId) {
        self.positions.write().await.remove(&clip_id);
        self.durations.write().await.remove(&clip_id);
    }

    pub async fn volume(&self) -> f32 {
        *self.volume.read().await
    }

    /// Set master volume, clamped to 0.0-1.0; returns the applied value
    pub async fn set_volume(&self, volume: f32) -> f32 {
        let clamped = volume.clamp(0.0, 1.0);
        *self.volume.write().await = clamped;
        clamped
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read().await
    }

    pub async fn set_lifecycle(&self, lifecycle: Lifecycle) {
        *self.lifecycle.write().await = lifecycle;
    }

    /// True while the engine accepts playback operations
    pub async fn is_active(&self) -> bool {
        *self.lifecycle.read().await == Lifecycle::Active
    }
}

// ========================================
// Tests
// ========================================
