//! Turn orchestrator: one request/response cycle at a time.
//!
//! ## Exchange
//!
//! ```text
//! submit_user_turn(text)
//!   ├─ USER turn appended (always)
//!   ├─ channel.send(text)        bounded by reply_timeout
//!   │     └─ StructuredReply::parse  ── violation ──► fixed fallback reply
//!   ├─ synthesize(reply)         bounded by synthesis_timeout
//!   │     └─ decode_provider_audio  ── any failure ──► no audio
//!   ├─ ASSISTANT turn appended   (dropped if the session ended meanwhile)
//!   └─ PlaybackScheduler::play   (only with audio; unavailability is logged)
//! ```
//!
//! Failed requests are never re-sent. `play` runs on the blocking pool since
//! resuming a device may wait on its audio thread.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{
    lookup::{self, WordDefinition},
    reply::StructuredReply,
};
use crate::{
    audio::{codec, output::OutputDevice, output::PlaybackId, SampleBuffer},
    error::{LinguaError, Result},
    playback::PlaybackScheduler,
    provider::{DialogueChannel, Providers},
    scenario::ScenarioContext,
    transcript::{Transcript, Turn, TurnId, TurnIdGenerator},
};

/// Synthetic request that makes the assistant open the conversation.
pub const OPENING_REQUEST: &str = "Start the roleplay now. Greet me.";

/// Configuration for a practice session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on the structured-reply request. Expiry yields the fallback turn.
    pub reply_timeout: Duration,
    /// Bound on speech synthesis. Expiry yields a turn without audio.
    pub synthesis_timeout: Duration,
    pub lookup_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(30),
            synthesis_timeout: Duration::from_secs(30),
            lookup_timeout: Duration::from_secs(20),
        }
    }
}

/// A turn's audio packaged as a downloadable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedAudio {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Deterministic export file name for a turn.
pub fn export_file_name(turn_id: TurnId) -> String {
    format!("linguaroleplay_{turn_id}.wav")
}

/// Opens practice sessions against a fixed set of providers and one output
/// device.
pub struct TurnOrchestrator {
    providers: Providers,
    device: Arc<dyn OutputDevice>,
    config: SessionConfig,
}

impl TurnOrchestrator {
    pub fn new(providers: Providers, device: Arc<dyn OutputDevice>, config: SessionConfig) -> Self {
        Self {
            providers,
            device,
            config,
        }
    }

    /// Open a dialogue channel for `scenario` and deliver the assistant's
    /// opening line. No user turn is recorded for the opening request.
    ///
    /// # Errors
    /// Only if the channel cannot be opened. A failed opening reply becomes
    /// the fallback turn like any other exchange.
    pub async fn start_session(&self, scenario: ScenarioContext) -> Result<PracticeSession> {
        let channel = self
            .providers
            .dialogue
            .open_channel(&scenario.system_instruction())?;
        let transcript = Arc::new(Transcript::new());
        let playback = PlaybackScheduler::new(Arc::clone(&self.device), Arc::clone(&transcript));

        info!(scenario = scenario.id.as_str(), "session started");

        let session = PracticeSession {
            scenario,
            channel,
            providers: self.providers.clone(),
            config: self.config.clone(),
            transcript,
            playback,
            ids: TurnIdGenerator::new(),
            busy: AtomicBool::new(false),
        };

        {
            let _guard = BusyGuard::acquire(&session.busy)?;
            let reply = session.request_reply(OPENING_REQUEST).await;
            // The opening line evaluates nothing, so it carries no feedback.
            session
                .deliver(reply.character_response, Some(reply.translation), None)
                .await?;
        }
        Ok(session)
    }
}

/// Clears the in-flight flag on drop, including when the exchange future is
/// cancelled.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| LinguaError::Busy)?;
        Ok(Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One running conversation. Dropping it (or calling [`end`](Self::end))
/// releases every turn's audio.
pub struct PracticeSession {
    scenario: ScenarioContext,
    channel: Box<dyn DialogueChannel>,
    providers: Providers,
    config: SessionConfig,
    transcript: Arc<Transcript>,
    playback: PlaybackScheduler,
    ids: TurnIdGenerator,
    busy: AtomicBool,
}

impl PracticeSession {
    /// Run one exchange and return the assistant turn.
    ///
    /// # Errors
    /// - `LinguaError::EmptyUtterance` for blank text (nothing appended).
    /// - `LinguaError::Busy` while another exchange is pending.
    /// - `LinguaError::SessionEnded` once [`end`](Self::end) has run, including
    ///   when it runs while the reply is pending (the reply is discarded).
    ///
    /// Provider failures never surface here: they become the fallback turn
    /// or a turn without audio.
    pub async fn submit_user_turn(&self, text: &str) -> Result<Turn> {
        let text = text.trim();
        if text.is_empty() {
            return Err(LinguaError::EmptyUtterance);
        }
        let _guard = BusyGuard::acquire(&self.busy)?;

        let user = Turn::user(self.ids.next_id(), text);
        debug!(turn_id = user.id(), "user turn");
        if !self.transcript.push(user) {
            return Err(LinguaError::SessionEnded);
        }

        let reply = self.request_reply(text).await;
        self.deliver(
            reply.character_response,
            Some(reply.translation),
            Some(reply.feedback),
        )
        .await
    }

    /// Send `message` and validate the answer, substituting the fallback on
    /// any violation, transport error or timeout.
    async fn request_reply(&self, message: &str) -> StructuredReply {
        let timeout = self.config.reply_timeout;
        let outcome = match tokio::time::timeout(timeout, self.channel.send(message.to_string())).await {
            Ok(Ok(raw)) => StructuredReply::parse(&raw),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LinguaError::Timeout(timeout)),
        };
        match outcome {
            Ok(reply) => reply,
            Err(e) => {
                warn!("structured reply unavailable, using fallback: {e}");
                StructuredReply::fallback()
            }
        }
    }

    /// Synthesize, append and play one assistant turn.
    async fn deliver(
        &self,
        text: String,
        translation: Option<String>,
        feedback: Option<String>,
    ) -> Result<Turn> {
        let audio = self.synthesize(&text).await;
        let turn = Turn::assistant(self.ids.next_id(), text, translation, feedback, audio.clone());
        let turn_id = turn.id();
        if !self.transcript.push(turn) {
            warn!(turn_id, "session ended before the reply arrived, reply dropped");
            return Err(LinguaError::SessionEnded);
        }

        if let Some(buffer) = audio {
            let playback = self.playback.clone();
            match tokio::task::spawn_blocking(move || playback.play(turn_id, buffer)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(turn_id, "reply not played: {e}"),
                Err(e) => warn!(turn_id, "playback task failed: {e}"),
            }
        } else {
            debug!(turn_id, "reply has no audio, playback skipped");
        }

        self.transcript.get(turn_id).ok_or(LinguaError::SessionEnded)
    }

    async fn synthesize(&self, text: &str) -> Option<Arc<SampleBuffer>> {
        let timeout = self.config.synthesis_timeout;
        let encoded = match tokio::time::timeout(
            timeout,
            self.providers.synthesizer.synthesize(text.to_string()),
        )
        .await
        {
            Ok(Ok(Some(encoded))) => encoded,
            Ok(Ok(None)) => {
                warn!("synthesis unavailable: provider returned no audio");
                return None;
            }
            Ok(Err(e)) => {
                warn!("synthesis unavailable: {e}");
                return None;
            }
            Err(_) => {
                warn!("synthesis unavailable: {}", LinguaError::Timeout(timeout));
                return None;
            }
        };

        match codec::decode_provider_audio(&encoded) {
            Ok(buffer) if buffer.is_empty() => {
                warn!("synthesis returned an empty stream");
                None
            }
            Ok(buffer) => Some(Arc::new(buffer)),
            Err(e) => {
                warn!("synthesized audio skipped: {e}");
                None
            }
        }
    }

    /// Replay a turn's audio, preempting whatever is audible. Blocks while
    /// the device resumes; call it off the async executor.
    ///
    /// # Errors
    /// `UnknownTurn`, `NoAudio` or `PlaybackUnavailable`.
    pub fn replay(&self, turn_id: TurnId) -> Result<PlaybackId> {
        let turn = self
            .transcript
            .get(turn_id)
            .ok_or(LinguaError::UnknownTurn(turn_id))?;
        let audio = turn.audio().cloned().ok_or(LinguaError::NoAudio(turn_id))?;
        self.playback.play(turn_id, audio)
    }

    /// May wait for an in-flight `replay` to reach the device.
    pub fn stop_playback(&self) -> Option<TurnId> {
        self.playback.stop()
    }

    /// Encode a turn's audio as a WAV file named after the turn.
    ///
    /// # Errors
    /// `UnknownTurn`, `NoAudio`, or `MalformedAudio` if the buffer cannot be
    /// described by a WAV header.
    pub fn export_audio(&self, turn_id: TurnId) -> Result<ExportedAudio> {
        let turn = self
            .transcript
            .get(turn_id)
            .ok_or(LinguaError::UnknownTurn(turn_id))?;
        let audio = turn.audio().ok_or(LinguaError::NoAudio(turn_id))?;
        Ok(ExportedAudio {
            file_name: export_file_name(turn_id),
            bytes: codec::encode_container(audio)?,
        })
    }

    /// Write [`export_audio`](Self::export_audio) into `dir`, creating it if
    /// needed, and return the file path.
    pub fn save_audio(&self, turn_id: TurnId, dir: &Path) -> Result<PathBuf> {
        let exported = self.export_audio(turn_id)?;
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&exported.file_name);
        std::fs::write(&path, &exported.bytes)?;
        info!(turn_id, path = %path.display(), "audio saved");
        Ok(path)
    }

    /// Define `raw_word` as used in `sentence`. `None` means no definition is
    /// available; nothing in the session changes either way.
    pub async fn lookup_word(&self, raw_word: &str, sentence: &str) -> Option<WordDefinition> {
        lookup::lookup_word(
            self.providers.definer.as_ref(),
            raw_word,
            sentence,
            self.config.lookup_timeout,
        )
        .await
    }

    /// Close the transcript, then stop playback. A reply still in flight is
    /// discarded when it arrives.
    pub fn end(&self) {
        self.transcript.close();
        self.playback.stop();
        info!(scenario = self.scenario.id.as_str(), "session ended");
    }

    /// `true` while an exchange is pending.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn scenario(&self) -> &ScenarioContext {
        &self.scenario
    }

    pub fn transcript(&self) -> &Arc<Transcript> {
        &self.transcript
    }

    pub fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }
}
