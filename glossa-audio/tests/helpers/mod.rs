//! Shared helpers for integration tests
//!
//! All playback tests run against the silent backend with a fast tick, so
//! they are deterministic and need no audio device.

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use glossa_audio::{BackendChoice, ClipPayload, Player, PlayerConfig, PlayerEvent};
use std::io::Cursor;
use std::time::Duration;
use tokio::sync::broadcast;

/// Synthesize a base64-encoded WAV payload of the given duration.
///
/// 16kHz mono 16-bit; even a 100ms clip encodes well past the payload
/// length threshold.
pub fn wav_payload(duration_ms: u64) -> ClipPayload {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let frames = (16_000 * duration_ms / 1000) as usize;
        for i in 0..frames {
            let t = i as f32 / 16_000.0;
            let sample = ((t * 330.0 * std::f32::consts::TAU).sin() * 9000.0) as i16;
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    ClipPayload::new(BASE64.encode(cursor.into_inner()))
}

/// A payload that passes the length threshold but is not decodable audio.
pub fn corrupt_payload() -> ClipPayload {
    ClipPayload::new(BASE64.encode(vec![0xA5u8; 2000]))
}

/// Test engine configuration: silent backend, fast ticks, short settle.
pub fn test_config() -> PlayerConfig {
    PlayerConfig {
        backend: BackendChoice::Silent,
        position_tick_ms: 10,
        settle_delay_ms: 25,
        ..PlayerConfig::default()
    }
}

/// Build a player with one stored payload per entry in `durations_ms`.
pub async fn player_with_clips(durations_ms: &[u64]) -> Player {
    init_tracing();
    let player = Player::new(test_config()).await.expect("player");
    for (clip_id, duration) in durations_ms.iter().enumerate() {
        player.add_clip(clip_id, wav_payload(*duration)).await;
    }
    player
}

/// Wait for the first event matching `pred`, or panic after `timeout`.
pub async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<PlayerEvent>,
    timeout: Duration,
    mut pred: F,
) -> PlayerEvent
where
    F: FnMut(&PlayerEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .unwrap_or_else(|| panic!("timed out waiting for event"));
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(event)) if pred(&event) => return event,
            Ok(Ok(_)) => continue,
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => panic!("event bus closed"),
            Err(_) => panic!("timed out waiting for event"),
        }
    }
}

/// Collect events for `window`, returning everything seen.
pub async fn collect_events(
    rx: &mut broadcast::Receiver<PlayerEvent>,
    window: Duration,
) -> Vec<PlayerEvent> {
    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = match deadline.checked_duration_since(tokio::time::Instant::now()) {
            Some(remaining) => remaining,
            None => return seen,
        };
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(event)) => seen.push(event),
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => return seen,
            Err(_) => return seen,
        }
    }
}

pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "glossa_audio=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
