//! Change notifications broadcast by the session components.
//!
//! | Event | Source |
//! |-------|--------|
//! | `TranscriptChange` | [`Transcript::subscribe`](crate::transcript::Transcript::subscribe) |
//! | `PlaybackEvent` | [`PlaybackScheduler::subscribe`](crate::playback::PlaybackScheduler::subscribe) |
//! | `CaptureEvent` | [`SpeechCapture::subscribe`](crate::capture::SpeechCapture::subscribe) |
//!
//! All events serialize with camelCase fields and a lowercase `kind` tag so a
//! presentation layer can consume them as JSON.

use serde::{Deserialize, Serialize};

use crate::transcript::{Speaker, TurnId};

// ---------------------------------------------------------------------------
// Transcript
// ---------------------------------------------------------------------------

/// Emitted whenever the transcript log changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TranscriptChange {
    /// A turn was appended at the end of the log.
    #[serde(rename_all = "camelCase")]
    Appended { turn_id: TurnId, speaker: Speaker },
    /// A turn's playing flag flipped.
    #[serde(rename_all = "camelCase")]
    PlayingChanged { turn_id: TurnId, is_playing: bool },
    /// The log was emptied (session end).
    Cleared,
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

/// Emitted by the playback scheduler on every voice transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PlaybackEvent {
    #[serde(rename_all = "camelCase")]
    Started { turn_id: TurnId, playback_id: u64 },
    /// A newer `play` silenced this voice.
    #[serde(rename_all = "camelCase")]
    Preempted { turn_id: TurnId, playback_id: u64 },
    /// Explicit stop.
    #[serde(rename_all = "camelCase")]
    Stopped { turn_id: TurnId, playback_id: u64 },
    /// Natural end of buffer.
    #[serde(rename_all = "camelCase")]
    Finished { turn_id: TurnId, playback_id: u64 },
}

impl PlaybackEvent {
    pub fn turn_id(&self) -> TurnId {
        match self {
            PlaybackEvent::Started { turn_id, .. }
            | PlaybackEvent::Preempted { turn_id, .. }
            | PlaybackEvent::Stopped { turn_id, .. }
            | PlaybackEvent::Finished { turn_id, .. } => *turn_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Speech capture
// ---------------------------------------------------------------------------

/// Observable state of the speech capture adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    Idle,
    Listening,
}

/// Emitted by the speech capture adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CaptureEvent {
    /// A recognition attempt began.
    Listening,
    /// Recognized text; `pending` is the pending input after appending it.
    Recognized { text: String, pending: String },
    /// The attempt failed. Pending input is unchanged.
    Error { message: String },
    /// Back to idle (after a result, an error, or a stop).
    Idle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_change_serializes_with_kind_tag() {
        let change = TranscriptChange::PlayingChanged {
            turn_id: 42,
            is_playing: true,
        };
        let json = serde_json::to_value(&change).expect("serialize transcript change");
        assert_eq!(json["kind"], "playingChanged");
        assert_eq!(json["turnId"], 42);
        assert_eq!(json["isPlaying"], true);

        let appended = TranscriptChange::Appended {
            turn_id: 1,
            speaker: Speaker::Assistant,
        };
        let json = serde_json::to_value(&appended).expect("serialize appended");
        assert_eq!(json["speaker"], "assistant");

        let round_trip: TranscriptChange =
            serde_json::from_value(json).expect("deserialize transcript change");
        assert_eq!(round_trip, appended);
    }

    #[test]
    fn playback_event_exposes_turn_id() {
        let event = PlaybackEvent::Preempted {
            turn_id: 9,
            playback_id: 3,
        };
        assert_eq!(event.turn_id(), 9);

        let json = serde_json::to_value(&event).expect("serialize playback event");
        assert_eq!(json["kind"], "preempted");
        assert_eq!(json["playbackId"], 3);
    }

    #[test]
    fn capture_event_round_trips() {
        let event = CaptureEvent::Recognized {
            text: "two coffees".into(),
            pending: "hello two coffees".into(),
        };
        let json = serde_json::to_string(&event).expect("serialize capture event");
        let back: CaptureEvent = serde_json::from_str(&json).expect("deserialize capture event");
        assert_eq!(back, event);
    }

    #[test]
    fn capture_status_rejects_non_lowercase_values() {
        assert!(serde_json::from_str::<CaptureStatus>(r#""Listening""#).is_err());
        assert_eq!(
            serde_json::from_str::<CaptureStatus>(r#""listening""#).unwrap(),
            CaptureStatus::Listening
        );
    }
}
