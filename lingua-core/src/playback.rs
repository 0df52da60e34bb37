//! Playback scheduler: owns "which turn is audible".
//!
//! ## Per-turn state
//!
//! ```text
//! SILENT ──play──► PLAYING ──finish / stop / preempt──► SILENT
//! ```
//!
//! At most one voice exists. `play` always preempts the current voice and
//! never queues. The active voice is held as an explicit owner
//! (`Option<ActiveVoice>`), so every transition is O(1).
//!
//! ## Identity-checked completion
//!
//! Each `play` call gets a fresh [`PlaybackId`]. The device reports natural
//! completion with that id, and the scheduler acts only if it still names the
//! active voice. A late completion from a preempted voice is a no-op.
//!
//! ## Locking
//!
//! `play` and `stop` run one at a time under `control`, held across the
//! device calls, so commands reach the device in the order their ids were
//! issued. Flag updates happen under `active` (then the transcript lock).
//! `active` is never held across `OutputDevice::start`, and completion only
//! takes `active`, so a device may report completion synchronously from
//! inside `start`.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        output::{OutputDevice, PlaybackId},
        SampleBuffer,
    },
    error::{LinguaError, Result},
    events::PlaybackEvent,
    transcript::{Transcript, TurnId},
};

const BROADCAST_CAP: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveVoice {
    turn_id: TurnId,
    playback_id: PlaybackId,
}

struct Inner {
    device: Arc<dyn OutputDevice>,
    transcript: Arc<Transcript>,
    /// Serializes `play` and `stop` end to end.
    control: Mutex<()>,
    active: Mutex<Option<ActiveVoice>>,
    generation: AtomicU64,
    events: broadcast::Sender<PlaybackEvent>,
}

/// Cheaply cloneable handle; all clones drive the same voice.
#[derive(Clone)]
pub struct PlaybackScheduler {
    inner: Arc<Inner>,
}

impl PlaybackScheduler {
    pub fn new(device: Arc<dyn OutputDevice>, transcript: Arc<Transcript>) -> Self {
        let (events, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            inner: Arc::new(Inner {
                device,
                transcript,
                control: Mutex::new(()),
                active: Mutex::new(None),
                generation: AtomicU64::new(0),
                events,
            }),
        }
    }

    /// Make `turn_id` the audible turn, preempting any current voice.
    ///
    /// # Errors
    /// - `LinguaError::PlaybackUnavailable` if the device cannot be resumed
    ///   (no state changes) or refuses to start (the flag is rolled back).
    /// - `LinguaError::UnknownTurn` if the transcript holds no assistant turn
    ///   `turn_id`. The previous voice is still silenced.
    ///
    /// Blocks for as long as `OutputDevice::resume` does.
    pub fn play(&self, turn_id: TurnId, buffer: Arc<SampleBuffer>) -> Result<PlaybackId> {
        let inner = &self.inner;
        let _control = inner.control.lock();
        inner.device.resume().map_err(into_unavailable)?;

        let playback_id = PlaybackId(inner.generation.fetch_add(1, Ordering::SeqCst) + 1);
        let voice = ActiveVoice {
            turn_id,
            playback_id,
        };

        let (preempted, accepted) = {
            let mut active = inner.active.lock();
            let previous = active.take();
            if let Some(prev) = previous {
                inner.device.stop(prev.playback_id);
                inner.transcript.set_playing(prev.turn_id, false);
            }
            // Unknown once the transcript is closed.
            let accepted = inner.transcript.set_playing(turn_id, true);
            if accepted {
                *active = Some(voice);
            }
            (previous, accepted)
        };

        if let Some(prev) = preempted {
            debug!(turn_id = prev.turn_id, playback_id = %prev.playback_id, "voice preempted");
            inner.emit(PlaybackEvent::Preempted {
                turn_id: prev.turn_id,
                playback_id: prev.playback_id.0,
            });
        }
        if !accepted {
            warn!(turn_id, "no assistant turn to play");
            return Err(LinguaError::UnknownTurn(turn_id));
        }
        inner.emit(PlaybackEvent::Started {
            turn_id,
            playback_id: playback_id.0,
        });
        info!(turn_id, playback_id = %playback_id, "playback started");

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let done = Box::new(move |id: PlaybackId| {
            if let Some(inner) = weak.upgrade() {
                inner.complete(id);
            }
        });

        if let Err(e) = inner.device.start(playback_id, buffer, done) {
            warn!(turn_id, "device refused to start playback: {e}");
            inner.release(playback_id, |turn_id, playback_id| PlaybackEvent::Stopped {
                turn_id,
                playback_id,
            });
            return Err(into_unavailable(e));
        }

        Ok(playback_id)
    }

    /// Explicitly silence the current voice. Returns the turn that was
    /// playing, if any.
    pub fn stop(&self) -> Option<TurnId> {
        let inner = &self.inner;
        let _control = inner.control.lock();
        let stopped = {
            let mut active = inner.active.lock();
            let current = active.take()?;
            inner.device.stop(current.playback_id);
            inner.transcript.set_playing(current.turn_id, false);
            current
        };
        info!(turn_id = stopped.turn_id, "playback stopped");
        inner.emit(PlaybackEvent::Stopped {
            turn_id: stopped.turn_id,
            playback_id: stopped.playback_id.0,
        });
        Some(stopped.turn_id)
    }

    /// Natural completion entry point. Normally called by the device through
    /// the callback handed to `start`.
    pub fn complete(&self, playback_id: PlaybackId) {
        self.inner.complete(playback_id);
    }

    /// The turn currently audible, if any.
    pub fn active_turn(&self) -> Option<TurnId> {
        self.inner.active.lock().map(|v| v.turn_id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.events.subscribe()
    }
}

impl Inner {
    fn complete(&self, playback_id: PlaybackId) {
        if !self.release(playback_id, |turn_id, playback_id| PlaybackEvent::Finished {
            turn_id,
            playback_id,
        }) {
            debug!(playback_id = %playback_id, "stale completion ignored");
        }
    }

    /// Clear the active voice only if it is still `playback_id`.
    fn release(
        &self,
        playback_id: PlaybackId,
        event: impl FnOnce(TurnId, u64) -> PlaybackEvent,
    ) -> bool {
        let released = {
            let mut active = self.active.lock();
            let current = match *active {
                Some(current) if current.playback_id == playback_id => current,
                _ => return false,
            };
            *active = None;
            self.transcript.set_playing(current.turn_id, false);
            current
        };
        debug!(turn_id = released.turn_id, playback_id = %playback_id, "voice released");
        self.emit(event(released.turn_id, playback_id.0));
        true
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.events.send(event);
    }
}

fn into_unavailable(e: LinguaError) -> LinguaError {
    match e {
        LinguaError::PlaybackUnavailable(_) => e,
        other => LinguaError::PlaybackUnavailable(other.to_string()),
    }
}
