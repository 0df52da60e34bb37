//! # lingua-core
//!
//! Turn orchestrator and audio pipeline for roleplay language practice.
//!
//! ## Architecture
//!
//! ```text
//! SpeechCapture ──pending input──┐
//!                                ▼
//! typed text ──────────► PracticeSession::submit_user_turn
//!                                │  DialogueChannel (structured reply)
//!                                │  SpeechSynthesizer (base64 PCM16)
//!                                ▼
//!                     audio::codec ──► SampleBuffer
//!                                │
//!                 Transcript ◄───┴───► PlaybackScheduler ──► OutputDevice
//! ```
//!
//! Providers and devices sit behind traits so the whole flow runs in tests
//! with scripted fakes.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod capture;
pub mod dialogue;
pub mod error;
pub mod events;
pub mod playback;
pub mod provider;
pub mod scenario;
pub mod transcript;

// Convenience re-exports for downstream crates
pub use audio::{
    output::{CpalOutput, NoOutputDevice, OutputDevice, PlaybackDone, PlaybackId},
    SampleBuffer,
};
pub use capture::{mic::MicRecognizer, vad::EndpointConfig, SpeechCapture, SpeechRecognizer};
pub use dialogue::{
    ExportedAudio, PracticeSession, SessionConfig, StructuredReply, TurnOrchestrator,
    WordDefinition,
};
pub use error::{LinguaError, Result};
pub use events::{CaptureEvent, CaptureStatus, PlaybackEvent, TranscriptChange};
pub use playback::PlaybackScheduler;
pub use provider::Providers;
pub use scenario::{Difficulty, ScenarioContext};
pub use transcript::{Speaker, Transcript, Turn, TurnId};

#[cfg(feature = "gemini")]
pub use provider::gemini::{GeminiClient, GeminiConfig};
