//! Ordered, append-only log of conversation turns.
//!
//! The log is the single source of truth for what the learner sees. Every
//! mutation emits a [`TranscriptChange`] on a broadcast channel so a
//! presentation layer can re-render without polling.
//!
//! Only the playback scheduler flips playing flags. It does so under its own
//! lock, which is what keeps at most one turn playing at any instant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::audio::SampleBuffer;
use crate::events::TranscriptChange;

const BROADCAST_CAP: usize = 256;

/// Turn identifier: unique within a session, strictly increasing.
pub type TurnId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// One conversational exchange unit.
///
/// Fields are private: user turns are built by [`Turn::user`] and can never
/// carry a translation, feedback or audio.
#[derive(Debug, Clone)]
pub struct Turn {
    id: TurnId,
    speaker: Speaker,
    text: String,
    translation: Option<String>,
    feedback: Option<String>,
    audio: Option<Arc<SampleBuffer>>,
    is_playing: bool,
}

impl Turn {
    pub fn user(id: TurnId, text: impl Into<String>) -> Self {
        Self {
            id,
            speaker: Speaker::User,
            text: text.into(),
            translation: None,
            feedback: None,
            audio: None,
            is_playing: false,
        }
    }

    pub fn assistant(
        id: TurnId,
        text: impl Into<String>,
        translation: Option<String>,
        feedback: Option<String>,
        audio: Option<Arc<SampleBuffer>>,
    ) -> Self {
        Self {
            id,
            speaker: Speaker::Assistant,
            text: text.into(),
            translation,
            feedback,
            audio,
            is_playing: false,
        }
    }

    pub fn id(&self) -> TurnId {
        self.id
    }

    pub fn speaker(&self) -> Speaker {
        self.speaker
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn translation(&self) -> Option<&str> {
        self.translation.as_deref()
    }

    /// Feedback on the preceding user turn.
    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    pub fn audio(&self) -> Option<&Arc<SampleBuffer>> {
        self.audio.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }
}

#[derive(Default)]
struct Log {
    turns: Vec<Turn>,
    index: HashMap<TurnId, usize>,
    closed: bool,
}

/// Shared transcript handle. Wrap in `Arc` to share with the scheduler.
pub struct Transcript {
    log: RwLock<Log>,
    changes: broadcast::Sender<TranscriptChange>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            log: RwLock::new(Log::default()),
            changes,
        }
    }

    /// Append `turn` at the end of the log.
    ///
    /// Returns `false` (and appends nothing) if a turn with the same id is
    /// already present or the log has been closed. Turns always enter the
    /// log silent.
    pub fn push(&self, mut turn: Turn) -> bool {
        let (turn_id, speaker) = (turn.id, turn.speaker);
        {
            let mut log = self.log.write();
            if log.closed {
                debug!(turn_id, "transcript closed, turn dropped");
                return false;
            }
            if log.index.contains_key(&turn_id) {
                warn!(turn_id, "duplicate turn id, not appended");
                return false;
            }
            turn.is_playing = false;
            let position = log.turns.len();
            log.index.insert(turn_id, position);
            log.turns.push(turn);
        }
        debug!(turn_id, ?speaker, "turn appended");
        let _ = self.changes.send(TranscriptChange::Appended { turn_id, speaker });
        true
    }

    pub fn get(&self, turn_id: TurnId) -> Option<Turn> {
        let log = self.log.read();
        log.index.get(&turn_id).map(|&i| log.turns[i].clone())
    }

    /// Copy of the whole log, in order.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.log.read().turns.clone()
    }

    pub fn len(&self) -> usize {
        self.log.read().turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every turn, ending the lifetime of their audio buffers, and
    /// refuse any later `push`.
    pub fn close(&self) {
        {
            let mut log = self.log.write();
            log.turns.clear();
            log.index.clear();
            log.closed = true;
        }
        let _ = self.changes.send(TranscriptChange::Cleared);
    }

    /// Set the playing flag of an assistant turn.
    ///
    /// Returns `false` when the turn is unknown or is a user turn. No event
    /// is emitted when the flag already has the requested value.
    pub fn set_playing(&self, turn_id: TurnId, playing: bool) -> bool {
        let changed = {
            let mut log = self.log.write();
            let Some(&i) = log.index.get(&turn_id) else {
                return false;
            };
            let turn = &mut log.turns[i];
            if turn.speaker != Speaker::Assistant {
                return false;
            }
            let changed = turn.is_playing != playing;
            turn.is_playing = playing;
            changed
        };
        if changed {
            let _ = self.changes.send(TranscriptChange::PlayingChanged {
                turn_id,
                is_playing: playing,
            });
        }
        true
    }

    /// Number of turns currently flagged as playing. Never more than one.
    pub fn playing_count(&self) -> usize {
        self.log.read().turns.iter().filter(|t| t.is_playing).count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptChange> {
        self.changes.subscribe()
    }
}

/// Hands out time-based turn ids (Unix millis), bumped when two ids would
/// land in the same millisecond.
#[derive(Debug, Default)]
pub struct TurnIdGenerator {
    last: AtomicU64,
}

impl TurnIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> TurnId {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(prev + 1)
    }
}
