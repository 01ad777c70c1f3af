//! # Glossa Common Library (glossa-common)
//!
//! Shared types for the glossa audio engine.
//!
//! **Purpose:** Clip identifiers and payloads, player event types, and the
//! wire formats spoken by the exercise-generation service. Used by
//! glossa-audio and by host screens that observe the engine.

pub mod error;
pub mod events;
pub mod types;
pub mod wire;

pub use error::PayloadError;
pub use events::{EventBus, PlayerEvent};
pub use types::{ClipId, ClipPayload, ClipStatus};
