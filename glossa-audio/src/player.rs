//! Screen-facing player facade
//!
//! Ties the payload store, audio controller, and sequencer together behind
//! the surface a listening screen actually uses. The facade is where user
//! intent meets automatic playback: any explicit play or pause issued while
//! the sequencer is advancing stops the sequencer first - user action
//! always wins over automatic advance.
//!
//! The payload store is append-only for the session: payloads are added as
//! the generation service delivers them and never mutated afterwards; the
//! controller reads them at (lazy, idempotent) load time.

use crate::backend;
use crate::config::PlayerConfig;
use crate::controller::AudioController;
use crate::error::Result;
use crate::fetch::{self, FetchOutcome};
use crate::progress::ProgressStreamClient;
use crate::sequencer::Sequencer;
use crate::state::PlayerState;
use glossa_common::events::PlayerEvent;
use glossa_common::types::{ClipId, ClipPayload};
use glossa_common::wire::Activity;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

pub struct Player {
    config: PlayerConfig,
    state: Arc<PlayerState>,
    controller: Arc<AudioController>,
    sequencer: Sequencer,
    payloads: RwLock<BTreeMap<ClipId, ClipPayload>>,
    http: reqwest::Client,
}

impl Player {
    /// Construct a player with the selected backend.
    ///
    /// Must be called from within a tokio runtime; the controller's event
    /// pump and the backend's tickers are spawned here.
    pub async fn new(config: PlayerConfig) -> Result<Self> {
        let state = Arc::new(PlayerState::new(
            config.event_capacity,
            config.initial_volume,
        ));

        let (events_tx, events_rx) = backend::event_channel();
        let playback = backend::select_backend(config.backend, config.position_tick(), events_tx)?;
        playback.set_volume(config.initial_volume);
        info!("Player using {} backend", playback.name());

        let controller = AudioController::new(playback, Arc::clone(&state), events_rx);
        let sequencer = Sequencer::new(
            Arc::clone(&controller),
            Arc::clone(&state),
            config.settle_delay(),
        );

        Ok(Self {
            config,
            state,
            controller,
            sequencer,
            payloads: RwLock::new(BTreeMap::new()),
            http: reqwest::Client::new(),
        })
    }

    /// Subscribe to player events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.state.subscribe()
    }

    // ========================================
    // Payload store
    // ========================================

    /// Add one clip payload. Append-only: a payload already stored for
    /// this id is kept and the new one ignored.
    pub async fn add_clip(&self, clip_id: ClipId, payload: ClipPayload) {
        let mut store = self.payloads.write().await;
        if store.contains_key(&clip_id) {
            debug!("Payload for clip {} already stored, ignoring", clip_id);
            return;
        }
        store.insert(clip_id, payload);
    }

    /// Store every audio payload of a fetched activity, in paragraph order.
    pub async fn load_activity(&self, activity: &Activity) {
        for (index, entry) in activity.audio_data.iter().enumerate() {
            self.add_clip(index, ClipPayload::new(entry.audio_base64.clone()))
                .await;
        }
        info!("Stored {} clip payloads", activity.audio_data.len());
    }

    /// Total clip count implied by the stored payloads.
    pub async fn clip_count(&self) -> usize {
        self.payloads
            .read()
            .await
            .keys()
            .next_back()
            .map(|last| last + 1)
            .unwrap_or(0)
    }

    /// Load a clip's payload into the backend if it isn't already.
    pub async fn ensure_loaded(&self, clip_id: ClipId) {
        if self.controller.is_loaded(clip_id).await {
            return;
        }
        let payload = self.payloads.read().await.get(&clip_id).cloned();
        match payload {
            Some(payload) => self.controller.load_clip(clip_id, &payload).await,
            None => warn!("No payload stored for clip {}", clip_id),
        }
    }

    // ========================================
    // Playback intents
    // ========================================

    /// Play a clip, or pause it when it is the one playing.
    pub async fn play(&self, clip_id: ClipId) {
        if !self.state.is_active().await {
            return;
        }
        self.ensure_loaded(clip_id).await;

        let was_playing = self.controller.playing().await;
        if self.sequencer.is_active().await {
            // Explicit user action wins over automatic advance
            self.sequencer.stop().await;
            if was_playing == Some(clip_id) {
                // The stop paused the clip the user tapped; toggle is done
                return;
            }
        }
        self.controller.play(clip_id).await;
    }

    /// Pause a clip (stops the sequencer when one is advancing).
    pub async fn pause(&self, clip_id: ClipId) {
        if self.sequencer.is_active().await {
            self.sequencer.stop().await;
            return;
        }
        self.controller.pause(clip_id).await;
    }

    /// Seek within a clip; positions clamp to [0, duration].
    pub async fn seek(&self, clip_id: ClipId, position_secs: f64) {
        self.controller.seek(clip_id, position_secs).await;
    }

    /// Restart a clip from the beginning.
    pub async fn replay(&self, clip_id: ClipId) {
        if !self.state.is_active().await {
            return;
        }
        self.ensure_loaded(clip_id).await;
        if self.sequencer.is_active().await {
            self.sequencer.stop().await;
        }
        self.controller.replay(clip_id).await;
    }

    // ========================================
    // Listen to all
    // ========================================

    /// Play the whole passage continuously, starting at `from`.
    pub async fn listen_from(&self, from: ClipId) {
        let total = self.clip_count().await;
        // Continuous playback needs every clip ready; load them all now
        for clip_id in 0..total {
            self.ensure_loaded(clip_id).await;
        }
        self.sequencer.start(from, total).await;
    }

    /// Stop continuous playback. Idempotent.
    pub async fn stop_listening(&self) {
        self.sequencer.stop().await;
    }

    /// Pause every loaded clip (sequencer included).
    pub async fn stop_all(&self) {
        self.sequencer.stop().await;
        self.controller.stop_all().await;
    }

    /// True while the sequencer is advancing.
    ///
    /// Hosts suppress organic-scroll-driven index tracking while this is
    /// set; the sequencer's own scroll-and-play would fight it otherwise.
    pub async fn sequencer_active(&self) -> bool {
        self.sequencer.is_active().await
    }

    pub async fn sequencer_anchor(&self) -> Option<ClipId> {
        self.sequencer.anchor().await
    }

    // ========================================
    // Observation
    // ========================================

    pub async fn playing(&self) -> Option<ClipId> {
        self.controller.playing().await
    }

    pub async fn position_ms(&self, clip_id: ClipId) -> u64 {
        self.controller.position_ms(clip_id).await
    }

    pub async fn duration_ms(&self, clip_id: ClipId) -> Option<u64> {
        self.controller.duration_ms(clip_id).await
    }

    pub async fn set_volume(&self, volume: f32) {
        self.controller.set_volume(volume).await;
    }

    pub async fn volume(&self) -> f32 {
        self.controller.volume().await
    }

    /// Shared state handle for read-only observation.
    pub fn state(&self) -> Arc<PlayerState> {
        Arc::clone(&self.state)
    }

    // ========================================
    // Remote service
    // ========================================

    /// Subscribe to the progress feed for a generation session.
    pub async fn watch_progress(
        &self,
        base_url: &str,
        session_id: &str,
    ) -> Result<ProgressStreamClient> {
        ProgressStreamClient::connect(&self.http, base_url, session_id).await
    }

    /// Fetch the completed exercise once.
    pub async fn fetch_exercise(&self, base_url: &str, session_id: &str) -> Result<FetchOutcome> {
        fetch::fetch_exercise(&self.http, base_url, session_id).await
    }

    /// Fetch the completed exercise, retrying through the service's
    /// generate-then-persist window, and store its audio payloads.
    pub async fn fetch_and_store(&self, base_url: &str, session_id: &str) -> Result<Activity> {
        let activity = fetch::await_exercise(
            &self.http,
            base_url,
            session_id,
            self.config.fetch_retry_delay(),
            self.config.fetch_max_attempts,
        )
        .await?;
        self.load_activity(&activity).await;
        Ok(activity)
    }

    // ========================================
    // Teardown
    // ========================================

    /// Tear everything down: sequencer to idle, every clip paused and
    /// unloaded, event pump stopped. Idempotent.
    pub async fn shutdown(&self) {
        self.sequencer.stop().await;
        self.controller.shutdown().await;
    }
}
