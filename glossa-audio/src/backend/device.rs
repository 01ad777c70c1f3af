//! Native device playback backend
//!
//! Pipeline per clip: base64 decode → symphonia decode → rubato resample to
//! the device rate, all off the async runtime in a blocking task. Playback
//! itself renders from a single active-clip slot inside the cpal callback;
//! at most one clip occupies the slot, which is what makes the engine's
//! one-playing-clip invariant cheap to uphold here.
//!
//! The cpal stream is owned by a dedicated thread (cpal streams are not
//! Send); the backend talks to it only through shared state.

use crate::audio::{decode_clip, DeviceOutput, Resampler};
use crate::backend::{BackendEvent, BackendEventSender, ClipHandle, PlaybackBackend};
use crate::error::{Error, Result};
use glossa_common::types::{ClipId, ClipPayload};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

/// The single playback slot shared with the audio callback.
struct PlaySlot {
    active: Mutex<Option<Arc<DeviceClip>>>,
}

/// Per-clip playback state shared between handle, loader task, and callback.
struct DeviceClip {
    clip_id: ClipId,
    /// Interleaved stereo f32 at the device rate; set once after decode
    samples: OnceLock<Arc<Vec<f32>>>,
    total_frames: AtomicU64,
    duration_ms: AtomicU64,
    position_frames: AtomicU64,
    live: AtomicBool,
    failed: AtomicBool,
    rate: u32,
}

impl DeviceClip {
    fn new(clip_id: ClipId, rate: u32) -> Self {
        Self {
            clip_id,
            samples: OnceLock::new(),
            total_frames: AtomicU64::new(0),
            duration_ms: AtomicU64::new(0),
            position_frames: AtomicU64::new(0),
            live: AtomicBool::new(true),
            failed: AtomicBool::new(false),
            rate,
        }
    }
}

pub struct DeviceBackend {
    events: BackendEventSender,
    slot: Arc<PlaySlot>,
    volume: Arc<Mutex<f32>>,
    out_rate: u32,
    /// Dropping this sender wakes and ends the stream-owner thread
    stop_tx: Mutex<Option<std_mpsc::Sender<()>>>,
    ticker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl DeviceBackend {
    /// Open the output device and start the stream and position ticker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        position_tick: Duration,
        events: BackendEventSender,
    ) -> Result<Arc<Self>> {
        let slot = Arc::new(PlaySlot {
            active: Mutex::new(None),
        });
        let volume = Arc::new(Mutex::new(1.0f32));

        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<u32>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        {
            let slot = Arc::clone(&slot);
            let volume = Arc::clone(&volume);
            let events = events.clone();

            std::thread::Builder::new()
                .name("glossa-audio-out".to_string())
                .spawn(move || {
                    let mut output = match DeviceOutput::open() {
                        Ok(output) => output,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                    let out_rate = output.sample_rate();
                    let out_channels = output.channels() as usize;
                    let render = render_fn(slot, volume, events, out_channels);

                    if let Err(e) = output.start(render) {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }

                    let _ = ready_tx.send(Ok(out_rate));

                    // Keep the stream alive until the backend shuts down
                    let _ = stop_rx.recv();
                    output.stop();
                })
                .map_err(|e| Error::AudioOutput(format!("failed to spawn audio thread: {}", e)))?;
        }

        let out_rate = ready_rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| Error::AudioOutput("audio thread did not start".to_string()))??;

        let backend = Arc::new(Self {
            events,
            slot,
            volume,
            out_rate,
            stop_tx: Mutex::new(Some(stop_tx)),
            ticker: Mutex::new(None),
        });

        backend.spawn_ticker(position_tick);
        Ok(backend)
    }

    /// Bounded-rate position reporting for whatever clip occupies the slot.
    fn spawn_ticker(self: &Arc<Self>, tick: Duration) {
        let slot = Arc::clone(&self.slot);
        let events = self.events.clone();
        let out_rate = self.out_rate;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let active = match slot.active.lock() {
                    Ok(guard) => guard.clone(),
                    Err(_) => continue,
                };
                if let Some(clip) = active {
                    if clip.samples.get().is_some() {
                        let position_ms = clip.position_frames.load(Ordering::Relaxed)
                            * 1000
                            / out_rate as u64;
                        let _ = events.send(BackendEvent::Position {
                            clip_id: clip.clip_id,
                            position_ms,
                        });
                    }
                }
            }
        });

        if let Ok(mut guard) = self.ticker.lock() {
            *guard = Some(handle);
        }
    }
}

/// Build the render closure that runs on the cpal audio thread.
fn render_fn(
    slot: Arc<PlaySlot>,
    volume: Arc<Mutex<f32>>,
    events: BackendEventSender,
    out_channels: usize,
) -> impl FnMut(&mut [f32]) + Send + 'static {
    move |out: &mut [f32]| {
        let mut guard = match slot.active.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let Some(clip) = guard.as_ref() else {
            return;
        };
        // Still decoding: hold the slot and play silence until samples land
        let Some(samples) = clip.samples.get() else {
            return;
        };

        let total = clip.total_frames.load(Ordering::Acquire) as usize;
        let mut pos = clip.position_frames.load(Ordering::Relaxed) as usize;
        let vol = volume.lock().map(|v| *v).unwrap_or(1.0);

        let frames_wanted = out.len() / out_channels;
        let mut frame = 0;
        while frame < frames_wanted && pos < total {
            let left = samples[pos * 2] * vol;
            let right = samples[pos * 2 + 1] * vol;
            let base = frame * out_channels;
            if out_channels == 1 {
                out[base] = (left + right) * 0.5;
            } else {
                out[base] = left;
                out[base + 1] = right;
                // Extra channels stay silent
            }
            pos += 1;
            frame += 1;
        }
        clip.position_frames.store(pos as u64, Ordering::Relaxed);

        if pos >= total {
            let finished = guard.take();
            if let Some(finished) = finished {
                let _ = events.send(BackendEvent::Finished {
                    clip_id: finished.clip_id,
                });
            }
        }
    }
}

impl PlaybackBackend for DeviceBackend {
    fn name(&self) -> &'static str {
        "device"
    }

    fn load(&self, clip_id: ClipId, payload: &ClipPayload) -> Result<Arc<dyn ClipHandle>> {
        payload.validate().map_err(Error::InvalidPayload)?;

        let clip = Arc::new(DeviceClip::new(clip_id, self.out_rate));
        let handle: Arc<dyn ClipHandle> = Arc::new(DeviceHandle {
            clip: Arc::clone(&clip),
            slot: Arc::clone(&self.slot),
        });

        let events = self.events.clone();
        let encoded = payload.clone();
        let out_rate = self.out_rate;

        tokio::spawn(async move {
            let decoded = tokio::task::spawn_blocking(move || -> Result<Vec<f32>> {
                let bytes = encoded.decode().map_err(Error::InvalidPayload)?;
                let raw = decode_clip(bytes)?;
                Resampler::resample(&raw.samples, raw.sample_rate, out_rate, 2)
            })
            .await;

            match decoded {
                Ok(Ok(samples)) => {
                    let frames = (samples.len() / 2) as u64;
                    let duration_ms = frames * 1000 / out_rate as u64;
                    clip.total_frames.store(frames, Ordering::Release);
                    clip.duration_ms.store(duration_ms, Ordering::Release);
                    // An early seek may have landed past the real end
                    if clip.position_frames.load(Ordering::Relaxed) > frames {
                        clip.position_frames.store(frames, Ordering::Relaxed);
                    }
                    let _ = clip.samples.set(Arc::new(samples));
                    debug!("Clip {} decoded: {} frames, {} ms", clip_id, frames, duration_ms);
                    if clip.live.load(Ordering::Acquire) {
                        let _ = events.send(BackendEvent::Metadata {
                            clip_id,
                            duration_ms,
                        });
                    }
                }
                Ok(Err(e)) => {
                    clip.failed.store(true, Ordering::Release);
                    if clip.live.load(Ordering::Acquire) {
                        let _ = events.send(BackendEvent::Error {
                            clip_id,
                            reason: e.to_string(),
                        });
                    }
                }
                Err(e) => {
                    clip.failed.store(true, Ordering::Release);
                    if clip.live.load(Ordering::Acquire) {
                        let _ = events.send(BackendEvent::Error {
                            clip_id,
                            reason: format!("decode task failed: {}", e),
                        });
                    }
                }
            }
        });

        Ok(handle)
    }

    fn set_volume(&self, volume: f32) {
        if let Ok(mut guard) = self.volume.lock() {
            *guard = volume.clamp(0.0, 1.0);
        }
    }

    fn shutdown(&self) {
        if let Ok(mut guard) = self.ticker.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
        if let Ok(mut guard) = self.slot.active.lock() {
            guard.take();
        }
        // Dropping the sender ends the stream-owner thread
        if let Ok(mut guard) = self.stop_tx.lock() {
            guard.take();
        }
    }
}

struct DeviceHandle {
    clip: Arc<DeviceClip>,
    slot: Arc<PlaySlot>,
}

impl ClipHandle for DeviceHandle {
    fn play(&self) {
        if !self.clip.live.load(Ordering::Acquire) || self.clip.failed.load(Ordering::Acquire) {
            warn!("Ignoring play for unplayable clip {}", self.clip.clip_id);
            return;
        }
        // Restart from the top when the clip previously ran to its end
        let total = self.clip.total_frames.load(Ordering::Acquire);
        if total > 0 && self.clip.position_frames.load(Ordering::Relaxed) >= total {
            self.clip.position_frames.store(0, Ordering::Relaxed);
        }
        if let Ok(mut guard) = self.slot.active.lock() {
            *guard = Some(Arc::clone(&self.clip));
        }
    }

    fn pause(&self) {
        if let Ok(mut guard) = self.slot.active.lock() {
            if guard.as_ref().map(|c| c.clip_id) == Some(self.clip.clip_id) {
                guard.take();
            }
        }
    }

    fn seek(&self, position_ms: u64) {
        let mut frames = position_ms * self.clip.rate as u64 / 1000;
        let total = self.clip.total_frames.load(Ordering::Acquire);
        if total > 0 {
            frames = frames.min(total);
        }
        self.clip.position_frames.store(frames, Ordering::Relaxed);
    }

    fn unload(&self) {
        if self.clip.live.swap(false, Ordering::AcqRel) {
            self.pause();
            debug!("Unloaded clip {}", self.clip.clip_id);
        }
    }
}
