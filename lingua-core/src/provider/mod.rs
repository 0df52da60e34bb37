//! External generative-language collaborators.
//!
//! Every trait here returns raw provider output (reply text, base64 audio,
//! definition JSON, transcript text). Validation into typed values happens
//! in the component that issued the call, so a provider cannot hand the
//! session a partially trusted object.
//!
//! Implementations:
//! - [`gemini::GeminiClient`] (feature `gemini`): implements all of them.
//! - Tests supply scripted fakes.

#[cfg(feature = "gemini")]
pub mod gemini;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;

/// Boxed, sendable future returned by provider calls.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A stateful conversation opened with a fixed system instruction.
pub trait DialogueChannel: Send + Sync {
    /// Send one user message; resolves to the raw reply text.
    ///
    /// The channel remembers the exchange only when the call succeeds.
    fn send(&self, message: String) -> ProviderFuture<'_, Result<String>>;
}

pub trait DialogueProvider: Send + Sync {
    fn open_channel(&self, system_instruction: &str) -> Result<Box<dyn DialogueChannel>>;
}

/// Text-to-speech in a fixed voice.
pub trait SpeechSynthesizer: Send + Sync {
    /// Resolves to base64 PCM16LE mono at 24 kHz, or `None` when the
    /// provider produced no audio.
    fn synthesize(&self, text: String) -> ProviderFuture<'_, Result<Option<String>>>;
}

/// On-demand dictionary lookup.
pub trait WordDefiner: Send + Sync {
    /// Resolves to the raw definition JSON for `word` as used in `sentence`.
    fn define(&self, word: String, sentence: String) -> ProviderFuture<'_, Result<String>>;
}

/// One-shot speech-to-text for a recorded utterance.
pub trait Transcriber: Send + Sync {
    /// `wav` is a complete RIFF/WAVE container; `language` a BCP-47 tag.
    fn transcribe(&self, wav: Vec<u8>, language: String) -> ProviderFuture<'_, Result<String>>;
}

/// The collaborators a practice session talks to.
#[derive(Clone)]
pub struct Providers {
    pub dialogue: Arc<dyn DialogueProvider>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub definer: Arc<dyn WordDefiner>,
}

impl Providers {
    /// Use one value for every role.
    pub fn from_single<P>(provider: Arc<P>) -> Self
    where
        P: DialogueProvider + SpeechSynthesizer + WordDefiner + 'static,
    {
        Self {
            dialogue: provider.clone(),
            synthesizer: provider.clone(),
            definer: provider,
        }
    }
}
