//! Playback backend capability interface
//!
//! Two structurally different backends implement the same contract: the
//! native device backend (symphonia → rubato → cpal) and the clock-driven
//! silent backend for hosts with no audio device. The controller and
//! sequencer see only these traits; the choice is made once at startup.

pub mod device;
pub mod silent;

use crate::config::BackendChoice;
use crate::error::Result;
use glossa_common::types::{ClipId, ClipPayload};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub use device::DeviceBackend;
pub use silent::SilentBackend;

/// Events emitted by a backend, each tagged with the clip it belongs to.
///
/// For one clip, events arrive in emission order: Metadata, then Position
/// ticks, then Finished or Error.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    /// Clip metadata resolved after load
    Metadata { clip_id: ClipId, duration_ms: u64 },

    /// Bounded-rate position tick while the clip plays
    Position { clip_id: ClipId, position_ms: u64 },

    /// The clip played to its natural end.
    ///
    /// A caller-initiated pause never produces this event; the distinction
    /// is load-bearing for the sequencer.
    Finished { clip_id: ClipId },

    /// Load or decode failed after `load` returned
    Error { clip_id: ClipId, reason: String },
}

pub type BackendEventSender = mpsc::UnboundedSender<BackendEvent>;
pub type BackendEventReceiver = mpsc::UnboundedReceiver<BackendEvent>;

/// Create the backend event channel shared by a backend and its controller.
pub fn event_channel() -> (BackendEventSender, BackendEventReceiver) {
    mpsc::unbounded_channel()
}

/// Handle to one loaded clip.
///
/// Exactly one handle exists per clip at a time; all methods are cheap and
/// non-blocking. `unload` is idempotent, and no events are delivered for a
/// handle after it was unloaded.
pub trait ClipHandle: Send + Sync {
    fn play(&self);
    fn pause(&self);
    fn seek(&self, position_ms: u64);
    fn unload(&self);
}

/// One playback backend implementation.
pub trait PlaybackBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Load a clip payload, returning its handle.
    ///
    /// Rejects payloads under the minimum-length threshold synchronously.
    /// Malformed bytes do NOT fail the load: decoding runs asynchronously
    /// and reports `BackendEvent::Error` on the event channel instead.
    fn load(&self, clip_id: ClipId, payload: &ClipPayload) -> Result<Arc<dyn ClipHandle>>;

    /// Apply master volume (0.0-1.0). Backends without an audible output
    /// ignore this.
    fn set_volume(&self, _volume: f32) {}

    /// Release backend-wide resources (device stream, tick tasks).
    fn shutdown(&self) {}
}

/// Select and construct a backend once at startup.
///
/// `Auto` probes for an output device and falls back to the silent backend;
/// nothing downstream ever branches on which one was picked.
pub fn select_backend(
    choice: BackendChoice,
    position_tick: Duration,
    events: BackendEventSender,
) -> Result<Arc<dyn PlaybackBackend>> {
    match choice {
        BackendChoice::Device => {
            let backend = DeviceBackend::start(position_tick, events)?;
            info!("Using device playback backend");
            Ok(backend)
        }
        BackendChoice::Silent => {
            info!("Using silent playback backend");
            Ok(Arc::new(SilentBackend::new(position_tick, events)))
        }
        BackendChoice::Auto => {
            if crate::audio::DeviceOutput::probe() {
                match DeviceBackend::start(position_tick, events.clone()) {
                    Ok(backend) => {
                        info!("Using device playback backend (auto-selected)");
                        return Ok(backend);
                    }
                    Err(e) => {
                        warn!("Device backend unavailable ({}), falling back to silent", e);
                    }
                }
            } else {
                warn!("No output device found, falling back to silent backend");
            }
            Ok(Arc::new(SilentBackend::new(position_tick, events)))
        }
    }
}
