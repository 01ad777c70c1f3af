//! Clock-driven headless playback backend
//!
//! Simulates playback against the clip's real duration without touching any
//! audio hardware: position advances with wall-clock time, ticks are
//! emitted at the configured rate, and the clip "finishes" when the clock
//! passes its duration. Used on hosts with no output device and throughout
//! the integration tests, where it makes playback deterministic.
//!
//! Duration comes from the WAV header alone (hound); the payload is never
//! decoded to samples here.

use crate::backend::{BackendEvent, BackendEventSender, ClipHandle, PlaybackBackend};
use crate::error::{Error, Result};
use glossa_common::types::{ClipId, ClipPayload};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct SilentBackend {
    events: BackendEventSender,
    tick: Duration,
}

impl SilentBackend {
    pub fn new(tick: Duration, events: BackendEventSender) -> Self {
        Self { events, tick }
    }
}

/// Playback clock for one clip.
struct Clock {
    /// Accumulated position while paused, milliseconds
    offset_ms: u64,
    /// Set while playing; position = offset + elapsed since this instant
    started: Option<Instant>,
    /// Bumped on every play so a stale ticker task exits immediately
    epoch: u64,
}

struct SilentClip {
    clip_id: ClipId,
    /// 0 until the WAV header resolves
    duration_ms: AtomicU64,
    live: AtomicBool,
    failed: AtomicBool,
    clock: Mutex<Clock>,
    events: BackendEventSender,
    tick: Duration,
    /// Self-reference so the ticker task can own the clip
    this: Weak<SilentClip>,
}

impl SilentClip {
    fn position_now(clock: &Clock) -> u64 {
        match clock.started {
            Some(started) => clock.offset_ms + started.elapsed().as_millis() as u64,
            None => clock.offset_ms,
        }
    }
}

impl PlaybackBackend for SilentBackend {
    fn name(&self) -> &'static str {
        "silent"
    }

    fn load(&self, clip_id: ClipId, payload: &ClipPayload) -> Result<Arc<dyn ClipHandle>> {
        payload.validate().map_err(Error::InvalidPayload)?;

        let events = self.events.clone();
        let tick = self.tick;
        let clip = Arc::new_cyclic(|this| SilentClip {
            clip_id,
            duration_ms: AtomicU64::new(0),
            live: AtomicBool::new(true),
            failed: AtomicBool::new(false),
            clock: Mutex::new(Clock {
                offset_ms: 0,
                started: None,
                epoch: 0,
            }),
            events,
            tick,
            this: this.clone(),
        });

        // Header inspection happens off the load path so malformed bytes
        // surface as an asynchronous error event, same as the device backend
        let loading = Arc::clone(&clip);
        let encoded = payload.clone();
        tokio::spawn(async move {
            let resolved = encoded
                .decode()
                .map_err(Error::InvalidPayload)
                .and_then(|bytes| {
                    let reader = hound::WavReader::new(Cursor::new(bytes))
                        .map_err(|e| Error::Decode(format!("bad WAV header: {}", e)))?;
                    let spec = reader.spec();
                    if spec.sample_rate == 0 {
                        return Err(Error::Decode("WAV header declares zero rate".to_string()));
                    }
                    Ok(reader.duration() as u64 * 1000 / spec.sample_rate as u64)
                });

            match resolved {
                Ok(duration_ms) => {
                    loading.duration_ms.store(duration_ms, Ordering::Release);
                    debug!("Clip {} header resolved: {} ms", loading.clip_id, duration_ms);
                    if loading.live.load(Ordering::Acquire) {
                        let _ = loading.events.send(BackendEvent::Metadata {
                            clip_id: loading.clip_id,
                            duration_ms,
                        });
                    }
                }
                Err(e) => {
                    loading.failed.store(true, Ordering::Release);
                    if loading.live.load(Ordering::Acquire) {
                        let _ = loading.events.send(BackendEvent::Error {
                            clip_id: loading.clip_id,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        });

        Ok(clip)
    }
}

impl ClipHandle for SilentClip {
    fn play(&self) {
        if !self.live.load(Ordering::Acquire) || self.failed.load(Ordering::Acquire) {
            warn!("Ignoring play for unplayable clip {}", self.clip_id);
            return;
        }
        let Some(clip) = self.this.upgrade() else {
            return;
        };

        let epoch;
        {
            let mut clock = match self.clock.lock() {
                Ok(clock) => clock,
                Err(_) => return,
            };
            if clock.started.is_some() {
                return; // already playing
            }
            let duration = self.duration_ms.load(Ordering::Acquire);
            if duration > 0 && clock.offset_ms >= duration {
                clock.offset_ms = 0; // restart after a completed run
            }
            clock.epoch += 1;
            epoch = clock.epoch;
            clock.started = Some(Instant::now());
        }

        // Ticker drives position events and natural completion
        let tick = self.tick;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick).await;

                let event = {
                    let mut clock = match clip.clock.lock() {
                        Ok(clock) => clock,
                        Err(_) => break,
                    };
                    if clock.epoch != epoch || clock.started.is_none() {
                        break; // paused, re-played, or unloaded
                    }
                    let position = SilentClip::position_now(&clock);
                    let duration = clip.duration_ms.load(Ordering::Acquire);
                    if duration > 0 && position >= duration {
                        clock.started = None;
                        clock.offset_ms = duration;
                        (duration, true)
                    } else {
                        (position, false)
                    }
                };

                if !clip.live.load(Ordering::Acquire) {
                    break;
                }
                let (position_ms, finished) = event;
                let _ = clip.events.send(BackendEvent::Position {
                    clip_id: clip.clip_id,
                    position_ms,
                });
                if finished {
                    let _ = clip.events.send(BackendEvent::Finished {
                        clip_id: clip.clip_id,
                    });
                    break;
                }
            }
        });
    }

    fn pause(&self) {
        if let Ok(mut clock) = self.clock.lock() {
            if let Some(started) = clock.started.take() {
                clock.offset_ms += started.elapsed().as_millis() as u64;
            }
        }
    }

    fn seek(&self, position_ms: u64) {
        if let Ok(mut clock) = self.clock.lock() {
            let duration = self.duration_ms.load(Ordering::Acquire);
            clock.offset_ms = if duration > 0 {
                position_ms.min(duration)
            } else {
                position_ms
            };
            if clock.started.is_some() {
                clock.started = Some(Instant::now());
            }
        }
    }

    fn unload(&self) {
        if self.live.swap(false, Ordering::AcqRel) {
            self.pause();
            debug!("Unloaded clip {}", self.clip_id);
        }
    }
}
