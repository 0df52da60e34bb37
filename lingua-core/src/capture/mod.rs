//! Speech capture adapter.
//!
//! ## State machine
//!
//! ```text
//! IDLE ──start──► LISTENING ──result(text)──► IDLE   (text appended to pending input)
//!                     │──────error──────────► IDLE   (Error event, pending untouched)
//!                     └──────stop───────────► IDLE   (attempt cancelled, no result)
//! ```
//!
//! One recognition attempt at a time. Each attempt carries a generation
//! number; a result that arrives after its attempt was stopped (or replaced)
//! is dropped.
//!
//! The backend is the [`SpeechRecognizer`] trait; [`mic::MicRecognizer`] is
//! the microphone implementation.

pub mod mic;
pub mod vad;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Weak,
};

use parking_lot::Mutex;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    error::Result,
    events::{CaptureEvent, CaptureStatus},
    provider::ProviderFuture,
};

pub use mic::MicRecognizer;

/// Source language for recognition.
pub const DEFAULT_LANGUAGE: &str = "en-US";

const BROADCAST_CAP: usize = 64;

/// A backend that turns one spoken utterance into text.
pub trait SpeechRecognizer: Send + Sync + 'static {
    /// Listen for a single utterance in `language` and resolve to its text.
    ///
    /// Implementations should stop promptly once `cancel` is set.
    fn recognize_once(
        &self,
        language: String,
        cancel: Arc<AtomicBool>,
    ) -> ProviderFuture<'static, Result<String>>;
}

struct Attempt {
    generation: u64,
    cancel: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Attempt {
    fn cancel(self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

struct Inner {
    recognizer: Arc<dyn SpeechRecognizer>,
    language: String,
    attempt: Mutex<Option<Attempt>>,
    pending: Mutex<String>,
    generation: AtomicU64,
    events: broadcast::Sender<CaptureEvent>,
}

/// Cheaply cloneable adapter handle.
#[derive(Clone)]
pub struct SpeechCapture {
    inner: Arc<Inner>,
}

impl SpeechCapture {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        Self::with_language(recognizer, DEFAULT_LANGUAGE)
    }

    pub fn with_language(recognizer: Arc<dyn SpeechRecognizer>, language: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            inner: Arc::new(Inner {
                recognizer,
                language: language.into(),
                attempt: Mutex::new(None),
                pending: Mutex::new(String::new()),
                generation: AtomicU64::new(0),
                events,
            }),
        }
    }

    /// Begin one recognition attempt. Must be called inside a tokio runtime.
    ///
    /// Returns `false` (and changes nothing) when already listening.
    pub fn start(&self) -> bool {
        let inner = &self.inner;
        let mut attempt = inner.attempt.lock();
        if attempt.is_some() {
            warn!("start ignored: already listening");
            return false;
        }

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = Arc::new(AtomicBool::new(false));
        let recognition = inner
            .recognizer
            .recognize_once(inner.language.clone(), Arc::clone(&cancel));

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let result = recognition.await;
            if let Some(inner) = weak.upgrade() {
                inner.finish(generation, result);
            }
        });

        *attempt = Some(Attempt {
            generation,
            cancel,
            task,
        });
        drop(attempt);

        info!(generation, language = %inner.language, "listening");
        inner.emit(CaptureEvent::Listening);
        true
    }

    /// Cancel the current attempt. Returns `false` when idle.
    pub fn stop(&self) -> bool {
        let Some(attempt) = self.inner.attempt.lock().take() else {
            return false;
        };
        info!(generation = attempt.generation, "listening stopped");
        attempt.cancel();
        self.inner.emit(CaptureEvent::Idle);
        true
    }

    pub fn status(&self) -> CaptureStatus {
        if self.inner.attempt.lock().is_some() {
            CaptureStatus::Listening
        } else {
            CaptureStatus::Idle
        }
    }

    pub fn is_listening(&self) -> bool {
        self.status() == CaptureStatus::Listening
    }

    pub fn pending_input(&self) -> String {
        self.inner.pending.lock().clone()
    }

    /// Replace the pending input (the learner edited it by hand).
    pub fn set_pending_input(&self, text: impl Into<String>) {
        *self.inner.pending.lock() = text.into();
    }

    /// Take the pending input, leaving it empty.
    pub fn take_pending_input(&self) -> String {
        std::mem::take(&mut *self.inner.pending.lock())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.inner.events.subscribe()
    }
}

impl Inner {
    fn finish(&self, generation: u64, result: Result<String>) {
        {
            let mut attempt = self.attempt.lock();
            match attempt.as_ref() {
                Some(current) if current.generation == generation => {
                    *attempt = None;
                }
                _ => {
                    debug!(generation, "late recognition result dropped");
                    return;
                }
            }
        }

        match result.map(|text| text.trim().to_string()) {
            Ok(text) if !text.is_empty() => {
                let pending = {
                    let mut pending = self.pending.lock();
                    if !pending.is_empty() {
                        pending.push(' ');
                    }
                    pending.push_str(&text);
                    pending.clone()
                };
                info!(generation, "speech recognized");
                self.emit(CaptureEvent::Recognized { text, pending });
            }
            Ok(_) => {
                warn!(generation, "recognition returned no text");
                self.emit(CaptureEvent::Error {
                    message: "no speech detected".into(),
                });
            }
            Err(e) => {
                warn!(generation, "recognition failed: {e}");
                self.emit(CaptureEvent::Error {
                    message: e.to_string(),
                });
            }
        }
        self.emit(CaptureEvent::Idle);
    }

    fn emit(&self, event: CaptureEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(attempt) = self.attempt.get_mut().take() {
            attempt.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinguaError;
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Each attempt waits for the test to hand it a result.
    #[derive(Default)]
    struct ScriptedRecognizer {
        senders: Mutex<Vec<oneshot::Sender<Result<String>>>>,
        cancels: Mutex<Vec<Arc<AtomicBool>>>,
    }

    impl ScriptedRecognizer {
        fn resolve(&self, index: usize, result: Result<String>) {
            let tx = std::mem::replace(
                &mut self.senders.lock()[index],
                oneshot::channel().0,
            );
            let _ = tx.send(result);
        }
    }

    impl SpeechRecognizer for ScriptedRecognizer {
        fn recognize_once(
            &self,
            language: String,
            cancel: Arc<AtomicBool>,
        ) -> ProviderFuture<'static, Result<String>> {
            assert_eq!(language, DEFAULT_LANGUAGE);
            let (tx, rx) = oneshot::channel();
            self.senders.lock().push(tx);
            self.cancels.lock().push(cancel);
            Box::pin(async move {
                rx.await
                    .unwrap_or_else(|_| Err(LinguaError::Capture("dropped".into())))
            })
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn start_while_listening_is_ignored() {
        let rec = Arc::new(ScriptedRecognizer::default());
        let capture = SpeechCapture::new(rec.clone());

        assert!(capture.start());
        assert!(!capture.start());
        assert_eq!(rec.senders.lock().len(), 1);
        assert_eq!(capture.status(), CaptureStatus::Listening);
    }

    #[tokio::test]
    async fn results_are_space_joined_into_pending_input() {
        let rec = Arc::new(ScriptedRecognizer::default());
        let capture = SpeechCapture::new(rec.clone());
        capture.set_pending_input("I would like");

        assert!(capture.start());
        rec.resolve(0, Ok("a coffee please ".into()));
        settle().await;

        assert_eq!(capture.status(), CaptureStatus::Idle);
        assert_eq!(capture.pending_input(), "I would like a coffee please");
        assert_eq!(capture.take_pending_input(), "I would like a coffee please");
        assert_eq!(capture.pending_input(), "");
    }

    #[tokio::test]
    async fn error_leaves_pending_input_unchanged() {
        let rec = Arc::new(ScriptedRecognizer::default());
        let capture = SpeechCapture::new(rec.clone());
        capture.set_pending_input("draft");
        let mut events = capture.subscribe();

        capture.start();
        rec.resolve(0, Err(LinguaError::Capture("permission denied".into())));
        settle().await;

        assert_eq!(capture.pending_input(), "draft");
        assert_eq!(capture.status(), CaptureStatus::Idle);
        assert_eq!(events.recv().await.unwrap(), CaptureEvent::Listening);
        assert!(matches!(events.recv().await.unwrap(), CaptureEvent::Error { .. }));
        assert_eq!(events.recv().await.unwrap(), CaptureEvent::Idle);
    }

    #[tokio::test]
    async fn stop_cancels_and_drops_late_result() {
        let rec = Arc::new(ScriptedRecognizer::default());
        let capture = SpeechCapture::new(rec.clone());

        capture.start();
        assert!(capture.stop());
        assert!(!capture.stop());
        assert!(rec.cancels.lock()[0].load(Ordering::SeqCst));

        rec.resolve(0, Ok("too late".into()));
        settle().await;
        assert_eq!(capture.pending_input(), "");
        assert_eq!(capture.status(), CaptureStatus::Idle);
    }

    #[tokio::test]
    async fn stale_result_does_not_end_a_newer_attempt() {
        let rec = Arc::new(ScriptedRecognizer::default());
        let capture = SpeechCapture::new(rec.clone());

        capture.start();
        capture.stop();
        capture.start();
        // Deliver directly to the adapter as if the first task had survived.
        capture.inner.finish(1, Ok("stale".into()));

        assert_eq!(capture.status(), CaptureStatus::Listening);
        assert_eq!(capture.pending_input(), "");

        rec.resolve(1, Ok("fresh".into()));
        settle().await;
        assert_eq!(capture.pending_input(), "fresh");
    }

    #[tokio::test]
    async fn blank_result_is_reported_as_error() {
        let rec = Arc::new(ScriptedRecognizer::default());
        let capture = SpeechCapture::new(rec.clone());
        let mut events = capture.subscribe();

        capture.start();
        rec.resolve(0, Ok("   ".into()));
        settle().await;

        assert_eq!(capture.pending_input(), "");
        let _listening = events.recv().await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            CaptureEvent::Error {
                message: "no speech detected".into()
            }
        );
    }
}
