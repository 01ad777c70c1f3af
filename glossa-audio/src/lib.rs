//! # Glossa Audio Engine (glossa-audio)
//!
//! Multi-clip playback and sequencing for the listening activity.
//!
//! **Purpose:** Load per-paragraph audio payloads, play them with per-clip
//! play/pause/seek/replay and live position reporting, auto-advance through
//! the whole passage ("listen to all"), and track clip readiness from the
//! generation service's progress feed.
//!
//! **Architecture:** A capability trait over two playback backends
//! (symphonia + rubato + cpal device output, and a clock-driven headless
//! variant), an orchestrating controller that owns all mutable playback
//! state, and a sequencer state machine layered on top.

pub mod audio;
pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod fetch;
pub mod player;
pub mod progress;
pub mod registry;
pub mod sequencer;
pub mod state;

pub use config::{BackendChoice, PlayerConfig};
pub use controller::AudioController;
pub use error::{Error, Result};
pub use fetch::{await_exercise, fetch_exercise, FetchOutcome};
pub use player::Player;
pub use progress::{ProgressSnapshot, ProgressStreamClient, ProgressTracker};
pub use sequencer::Sequencer;
pub use state::{Lifecycle, PlayerState};

// Shared types used on the engine surface
pub use glossa_common::events::{EventBus, PlayerEvent};
pub use glossa_common::types::{ClipId, ClipPayload, ClipStatus};
