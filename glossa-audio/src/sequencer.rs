//! Listen-to-all sequencer
//!
//! A small state machine layered on the audio controller: given a starting
//! clip, play every clip in order, advancing on natural completion and
//! terminating at the last clip or on explicit stop.
//!
//! The completion detector is the controller's `ClipFinished` event, which
//! backends emit only when a clip runs to its natural end - a user pause is
//! not a completion. The residual race (a finish emitted just before a stop
//! was processed) is closed by an epoch counter: every stop or restart
//! bumps the epoch, and every advance decision re-checks it under the same
//! lock that holds the anchor. A stale finish can therefore never issue a
//! play after stop.

use crate::controller::AudioController;
use crate::state::PlayerState;
use glossa_common::events::PlayerEvent;
use glossa_common::types::ClipId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Advancing { anchor: ClipId, total: usize },
}

struct SeqState {
    mode: Mode,
    epoch: u64,
}

pub struct Sequencer {
    controller: Arc<AudioController>,
    state: Arc<PlayerState>,
    settle: Duration,
    seq: Arc<Mutex<SeqState>>,
}

impl Sequencer {
    pub fn new(
        controller: Arc<AudioController>,
        state: Arc<PlayerState>,
        settle: Duration,
    ) -> Self {
        Self {
            controller,
            state,
            settle,
            seq: Arc::new(Mutex::new(SeqState {
                mode: Mode::Idle,
                epoch: 0,
            })),
        }
    }

    /// Start advancing from `from`, through `total` clips.
    ///
    /// Restarting while already advancing is an implicit stop first.
    pub async fn start(&self, from: ClipId, total: usize) {
        if total == 0 || from >= total {
            warn!("Ignoring sequencer start: clip {} of {}", from, total);
            return;
        }
        if !self.state.is_active().await {
            return;
        }

        self.stop().await;

        let epoch = {
            let mut seq = self.seq.lock().await;
            seq.epoch += 1;
            seq.mode = Mode::Advancing {
                anchor: from,
                total,
            };
            seq.epoch
        };

        // Subscribe before issuing play so an immediate finish (a very
        // short clip) cannot slip past the advance loop
        let events = self.state.subscribe();
        tokio::spawn(advance_loop(
            Arc::clone(&self.controller),
            Arc::clone(&self.state),
            Arc::clone(&self.seq),
            self.settle,
            epoch,
            events,
        ));

        info!("Sequencer advancing from clip {} ({} total)", from, total);
        self.state.broadcast(PlayerEvent::SequencerStarted {
            anchor: from,
            timestamp: chrono::Utc::now(),
        });

        if self.controller.playing().await != Some(from) {
            self.controller.play(from).await;
        }
    }

    /// Stop advancing and pause playback. Idempotent, callable in any state.
    pub async fn stop(&self) {
        let was_advancing = {
            let mut seq = self.seq.lock().await;
            seq.epoch += 1;
            let was = matches!(seq.mode, Mode::Advancing { .. });
            seq.mode = Mode::Idle;
            was
        };

        if was_advancing {
            self.controller.pause_current().await;
            debug!("Sequencer stopped by caller");
            self.state.broadcast(PlayerEvent::SequencerStopped {
                completed: false,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    pub async fn is_active(&self) -> bool {
        matches!(self.seq.lock().await.mode, Mode::Advancing { .. })
    }

    /// The clip the sequencer is currently advancing from.
    pub async fn anchor(&self) -> Option<ClipId> {
        match self.seq.lock().await.mode {
            Mode::Advancing { anchor, .. } => Some(anchor),
            Mode::Idle => None,
        }
    }
}

enum Step {
    /// Completion for a clip that is not the anchor; no decision
    Ignore,
    /// Last clip done, pass complete
    Done,
    /// Advance to this clip
    Next(ClipId),
    /// Epoch superseded or idle; the loop is dead
    Exit,
}

/// Decide what a completion of `clip_id` means, atomically with the anchor.
async fn decide(seq: &Mutex<SeqState>, epoch: u64, clip_id: ClipId) -> Step {
    let mut guard = seq.lock().await;
    if guard.epoch != epoch {
        return Step::Exit;
    }
    match guard.mode {
        Mode::Advancing { anchor, total } if clip_id == anchor => {
            let next = anchor + 1;
            if next < total {
                // Anchor moves in the same guarded pass as the decision -
                // a concurrent stop observes either the old anchor or the
                // new one, never an advance in flight
                guard.mode = Mode::Advancing {
                    anchor: next,
                    total,
                };
                Step::Next(next)
            } else {
                guard.mode = Mode::Idle;
                Step::Done
            }
        }
        Mode::Advancing { .. } => Step::Ignore,
        Mode::Idle => Step::Exit,
    }
}

/// One advance loop per `start` call, bound to its epoch.
async fn advance_loop(
    controller: Arc<AudioController>,
    state: Arc<PlayerState>,
    seq: Arc<Mutex<SeqState>>,
    settle: Duration,
    epoch: u64,
    mut events: broadcast::Receiver<PlayerEvent>,
) {
    'listen: loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Sequencer lagged {} events behind", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };

        // A clip that cannot play is treated like one that finished, so a
        // single broken payload does not strand the whole pass
        let mut completed = match event {
            PlayerEvent::ClipFinished { clip_id, .. } => clip_id,
            PlayerEvent::ClipUnplayable { clip_id, .. } => clip_id,
            _ => continue,
        };

        // Inner loop: consecutive unplayable clips are skipped without
        // waiting for events that will never come
        loop {
            match decide(&seq, epoch, completed).await {
                Step::Exit => return,
                Step::Ignore => continue 'listen,
                Step::Done => {
                    info!("Sequencer completed the passage");
                    state.broadcast(PlayerEvent::SequencerStopped {
                        completed: true,
                        timestamp: chrono::Utc::now(),
                    });
                    return;
                }
                Step::Next(next) => {
                    state.broadcast(PlayerEvent::SequencerAdvanced {
                        from: completed,
                        to: next,
                        timestamp: chrono::Utc::now(),
                    });

                    // Give the host's scroll-into-view time to land
                    tokio::time::sleep(settle).await;

                    // Holding the guard across the play call serializes
                    // against stop(): the play is either issued before the
                    // stop bumps the epoch (the stop then pauses it), or
                    // not at all
                    let started = {
                        let guard = seq.lock().await;
                        if guard.epoch != epoch {
                            return;
                        }
                        if !matches!(guard.mode, Mode::Advancing { anchor, .. } if anchor == next)
                        {
                            return;
                        }
                        debug!("Sequencer advancing to clip {}", next);
                        controller.play(next).await;
                        controller.playing().await == Some(next)
                    };

                    if started {
                        continue 'listen;
                    }
                    // The clip never started (unplayable, or vanished);
                    // treat it as already completed and keep going
                    debug!("Sequencer skipping clip {} (did not start)", next);
                    completed = next;
                }
            }
        }
    }
}
