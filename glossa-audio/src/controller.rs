//! Audio controller - orchestrates registry and backend
//!
//! **Responsibilities:**
//! - Idempotent clip loading with payload validation
//! - Play/pause toggle with the at-most-one-playing invariant
//! - Clamped seek with optimistic position updates
//! - Backend event pump (metadata, position ticks, finished, errors)
//! - Teardown lifecycle (Active → TearingDown → Disposed)
//!
//! Playback failures never propagate: a clip that cannot load or decode is
//! marked unplayable and later play requests are logged no-ops.

use crate::backend::{BackendEvent, BackendEventReceiver, PlaybackBackend};
use crate::registry::ClipRegistry;
use crate::state::{Lifecycle, PlayerState};
use glossa_common::events::PlayerEvent;
use glossa_common::types::{ClipId, ClipPayload};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct AudioController {
    backend: Arc<dyn PlaybackBackend>,
    registry: Arc<RwLock<ClipRegistry>>,
    state: Arc<PlayerState>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl AudioController {
    /// Create the controller and start its backend event pump.
    pub fn new(
        backend: Arc<dyn PlaybackBackend>,
        state: Arc<PlayerState>,
        events: BackendEventReceiver,
    ) -> Arc<Self> {
        let registry = Arc::new(RwLock::new(ClipRegistry::new()));

        let pump = tokio::spawn(run_event_pump(
            Arc::clone(&registry),
            Arc::clone(&state),
            events,
        ));

        Arc::new(Self {
            backend,
            registry,
            state,
            pump: Mutex::new(Some(pump)),
        })
    }

    /// Load a clip into the registry.
    ///
    /// No-op if the clip is already loaded. A payload that fails validation
    /// or a backend that refuses the load leaves the clip absent; nothing
    /// surfaces to the caller beyond a logged warning.
    pub async fn load_clip(&self, clip_id: ClipId, payload: &ClipPayload) {
        if !self.state.is_active().await {
            warn!("Ignoring load for clip {}: controller not active", clip_id);
            return;
        }

        if self.registry.read().await.contains(clip_id) {
            debug!("Clip {} already loaded", clip_id);
            return;
        }

        if let Err(e) = payload.validate() {
            warn!("Refusing payload for clip {}: {}", clip_id, e);
            return;
        }

        match self.backend.load(clip_id, payload) {
            Ok(handle) => {
                self.registry.write().await.insert(clip_id, handle);
                debug!("Clip {} loaded", clip_id);
            }
            Err(e) => {
                warn!("Failed to load clip {}: {}", clip_id, e);
            }
        }
    }

    /// Play a clip, or pause it if it is the one already playing.
    ///
    /// Any other playing clip is paused first: at most one clip plays at a
    /// time, always.
    pub async fn play(&self, clip_id: ClipId) {
        if !self.state.is_active().await {
            return;
        }

        let handle = {
            let registry = self.registry.read().await;
            match registry.get(clip_id) {
                Some(clip) if clip.playable => Arc::clone(&clip.handle),
                Some(_) => {
                    debug!("Ignoring play for unplayable clip {}", clip_id);
                    return;
                }
                None => {
                    warn!("Ignoring play for unknown clip {}", clip_id);
                    return;
                }
            }
        };

        let current = self.state.playing().await;
        if current == Some(clip_id) {
            // Toggle: same clip pauses
            handle.pause();
            self.state.set_playing(None).await;
            self.broadcast_playback(None);
            return;
        }

        if let Some(other) = current {
            if let Some(clip) = self.registry.read().await.get(other) {
                clip.handle.pause();
            }
        }

        handle.play();
        self.state.set_playing(Some(clip_id)).await;
        self.broadcast_playback(Some(clip_id));
    }

    /// Pause one clip. No-op if it is not playing.
    pub async fn pause(&self, clip_id: ClipId) {
        let handle = {
            let registry = self.registry.read().await;
            match registry.get(clip_id) {
                Some(clip) => Arc::clone(&clip.handle),
                None => return,
            }
        };
        handle.pause();

        if self.state.playing().await == Some(clip_id) {
            self.state.set_playing(None).await;
            self.broadcast_playback(None);
        }
    }

    /// Pause whatever clip is currently playing.
    pub async fn pause_current(&self) {
        if let Some(clip_id) = self.state.playing().await {
            self.pause(clip_id).await;
        }
    }

    /// Seek within a clip, silently clamped to [0, duration].
    ///
    /// The position map is updated immediately, ahead of the backend's next
    /// tick, so the UI stays responsive.
    pub async fn seek(&self, clip_id: ClipId, position_secs: f64) {
        let ms = if position_secs.is_finite() && position_secs > 0.0 {
            (position_secs * 1000.0) as u64
        } else {
            0
        };

        let (handle, clamped, duration) = {
            let mut registry = self.registry.write().await;
            let Some(clip) = registry.get_mut(clip_id) else {
                return;
            };
            let clamped = match clip.duration_ms {
                Some(duration) => ms.min(duration),
                None => ms,
            };
            clip.last_position_ms = clamped;
            (Arc::clone(&clip.handle), clamped, clip.duration_ms)
        };

        handle.seek(clamped);
        self.state.set_position_ms(clip_id, clamped).await;
        self.state.broadcast(PlayerEvent::PositionChanged {
            clip_id,
            position_ms: clamped,
            duration_ms: duration,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Restart a clip from the beginning, playing it if it was not already.
    pub async fn replay(&self, clip_id: ClipId) {
        self.seek(clip_id, 0.0).await;
        if self.state.playing().await != Some(clip_id) {
            self.play(clip_id).await;
        }
    }

    /// Pause every loaded clip.
    pub async fn stop_all(&self) {
        {
            let registry = self.registry.read().await;
            for clip in registry.iter() {
                clip.handle.pause();
            }
        }
        if self.state.replace_playing(None).await.is_some() {
            self.broadcast_playback(None);
        }
    }

    /// Unload one clip, releasing its backend handle. Idempotent.
    pub async fn unload_clip(&self, clip_id: ClipId) {
        let removed = self.registry.write().await.unload(clip_id);
        if removed {
            self.state.forget_clip(clip_id).await;
            if self.state.playing().await == Some(clip_id) {
                self.state.set_playing(None).await;
                self.broadcast_playback(None);
            }
        }
    }

    /// Master volume (0.0-1.0, clamped).
    pub async fn set_volume(&self, volume: f32) {
        let applied = self.state.set_volume(volume).await;
        self.backend.set_volume(applied);
        self.state.broadcast(PlayerEvent::VolumeChanged {
            volume: applied,
            timestamp: chrono::Utc::now(),
        });
    }

    pub async fn volume(&self) -> f32 {
        self.state.volume().await
    }

    pub async fn playing(&self) -> Option<ClipId> {
        self.state.playing().await
    }

    pub async fn position_ms(&self, clip_id: ClipId) -> u64 {
        self.state.position_ms(clip_id).await
    }

    pub async fn duration_ms(&self, clip_id: ClipId) -> Option<u64> {
        self.state.duration_ms(clip_id).await
    }

    /// Number of clips currently holding a backend handle.
    pub async fn loaded_count(&self) -> usize {
        self.registry.read().await.len()
    }

    pub async fn is_loaded(&self, clip_id: ClipId) -> bool {
        self.registry.read().await.contains(clip_id)
    }

    /// Tear the controller down: pause and release everything, stop the
    /// event pump. Runs exactly once; later calls are no-ops.
    pub async fn shutdown(&self) {
        if self.state.lifecycle().await != Lifecycle::Active {
            return;
        }
        self.state.set_lifecycle(Lifecycle::TearingDown).await;
        info!("Audio controller tearing down");

        self.stop_all().await;
        self.registry.write().await.unload_all();
        self.backend.shutdown();

        if let Ok(mut pump) = self.pump.lock() {
            if let Some(task) = pump.take() {
                task.abort();
            }
        }

        self.state.set_lifecycle(Lifecycle::Disposed).await;
        info!("Audio controller disposed");
    }

    fn broadcast_playback(&self, playing: Option<ClipId>) {
        self.state.broadcast(PlayerEvent::PlaybackChanged {
            playing,
            timestamp: chrono::Utc::now(),
        });
    }
}

/// Consume backend events in emission order.
///
/// Events for clips no longer in the registry are stale (the clip was
/// unloaded after the event was emitted) and dropped without effect.
async fn run_event_pump(
    registry: Arc<RwLock<ClipRegistry>>,
    state: Arc<PlayerState>,
    mut events: BackendEventReceiver,
) {
    while let Some(event) = events.recv().await {
        match event {
            BackendEvent::Metadata {
                clip_id,
                duration_ms,
            } => {
                {
                    let mut registry = registry.write().await;
                    match registry.get_mut(clip_id) {
                        Some(clip) => clip.duration_ms = Some(duration_ms),
                        None => continue, // stale
                    }
                }
                state.set_duration_ms(clip_id, duration_ms).await;
                state.broadcast(PlayerEvent::DurationResolved {
                    clip_id,
                    duration_ms,
                    timestamp: chrono::Utc::now(),
                });
            }

            BackendEvent::Position {
                clip_id,
                position_ms,
            } => {
                let duration_ms = {
                    let mut registry = registry.write().await;
                    match registry.get_mut(clip_id) {
                        Some(clip) => {
                            clip.last_position_ms = position_ms;
                            clip.duration_ms
                        }
                        None => continue, // stale
                    }
                };
                state.set_position_ms(clip_id, position_ms).await;
                state.broadcast(PlayerEvent::PositionChanged {
                    clip_id,
                    position_ms,
                    duration_ms,
                    timestamp: chrono::Utc::now(),
                });
            }

            BackendEvent::Finished { clip_id } => {
                let duration_ms = {
                    let mut registry = registry.write().await;
                    match registry.get_mut(clip_id) {
                        Some(clip) => {
                            if let Some(duration) = clip.duration_ms {
                                clip.last_position_ms = duration;
                            }
                            clip.duration_ms
                        }
                        None => continue, // stale
                    }
                };
                if let Some(duration) = duration_ms {
                    state.set_position_ms(clip_id, duration).await;
                }
                let was_playing = state.playing().await == Some(clip_id);
                if was_playing {
                    state.set_playing(None).await;
                }
                debug!("Clip {} finished naturally", clip_id);
                state.broadcast(PlayerEvent::ClipFinished {
                    clip_id,
                    timestamp: chrono::Utc::now(),
                });
                if was_playing {
                    state.broadcast(PlayerEvent::PlaybackChanged {
                        playing: None,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }

            BackendEvent::Error { clip_id, reason } => {
                let handle = {
                    let mut registry = registry.write().await;
                    match registry.get_mut(clip_id) {
                        Some(clip) => {
                            clip.playable = false;
                            Arc::clone(&clip.handle)
                        }
                        None => continue, // stale
                    }
                };
                // The failure may have raced an earlier play; make sure the
                // backend side is stopped too
                handle.pause();
                warn!("Clip {} unplayable: {}", clip_id, reason);
                if state.playing().await == Some(clip_id) {
                    state.set_playing(None).await;
                    state.broadcast(PlayerEvent::PlaybackChanged {
                        playing: None,
                        timestamp: chrono::Utc::now(),
                    });
                }
                state.broadcast(PlayerEvent::ClipUnplayable {
                    clip_id,
                    reason,
                    timestamp: chrono::Utc::now(),
                });
            }
        }
    }
}

// ========================================
// Tests
// ========================================
