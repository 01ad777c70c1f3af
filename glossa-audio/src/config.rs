//! Configuration for the glossa audio engine
//!
//! Minimal TOML bootstrap with built-in defaults: every field has a code
//! default, a missing or partial file is fine, and hosts that never touch
//! configuration just use `PlayerConfig::default()`.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Which playback backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// Probe for an output device, fall back to the silent backend
    Auto,
    /// Require the native device backend
    Device,
    /// Clock-driven headless backend (CI, tests, audio-less hosts)
    Silent,
}

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Playback backend selection
    pub backend: BackendChoice,

    /// Position event interval in milliseconds (bounded tick rate)
    pub position_tick_ms: u64,

    /// Pause between sequencer advance and playing the next clip, giving
    /// the host's scroll-into-view time to land
    pub settle_delay_ms: u64,

    /// Event broadcast channel capacity
    pub event_capacity: usize,

    /// Master volume on startup (0.0-1.0)
    pub initial_volume: f32,

    /// Delay between completed-exercise fetch retries while the service
    /// still reports "generating"
    pub fetch_retry_delay_ms: u64,

    /// Give up on the completed-exercise fetch after this many attempts
    pub fetch_max_attempts: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            backend: BackendChoice::Auto,
            position_tick_ms: 250,
            settle_delay_ms: 400,
            event_capacity: 128,
            initial_volume: 0.75,
            fetch_retry_delay_ms: 1500,
            fetch_max_attempts: 40,
        }
    }
}

impl PlayerConfig {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields take their built-in defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("failed to read config file {:?}: {}", path, e))
        })?;

        let config: PlayerConfig = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("failed to parse TOML: {}", e)))?;

        info!("Loaded engine configuration from {:?}", path);
        Ok(config)
    }

    pub fn position_tick(&self) -> Duration {
        Duration::from_millis(self.position_tick_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn fetch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_delay_ms)
    }
}
