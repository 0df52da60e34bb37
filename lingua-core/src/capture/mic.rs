//! Microphone-backed one-shot recognizer.
//!
//! ```text
//! cpal input ─► ring buffer ─► Endpointer (spawn_blocking)
//!                                   │ utterance @ device rate
//!                                   ▼
//!                      resample to 16 kHz ─► WAV ─► Transcriber
//! ```
//!
//! The capture stream is opened and dropped on the blocking thread, so the
//! microphone is held only while an attempt is listening.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tracing::{debug, info};

use super::{
    vad::{EndpointConfig, Endpoint, Endpointer},
    SpeechRecognizer,
};
use crate::{
    audio::{
        capture::{create_audio_ring, AudioCapture, Consumer},
        codec,
        resample::resample_all,
        SampleBuffer,
    },
    error::{LinguaError, Result},
    provider::{ProviderFuture, Transcriber},
};

/// Sample rate of the audio sent for transcription.
pub const TRANSCRIBE_SAMPLE_RATE: u32 = 16_000;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct MicRecognizer {
    transcriber: Arc<dyn Transcriber>,
    endpoint: EndpointConfig,
}

impl MicRecognizer {
    pub fn new(transcriber: Arc<dyn Transcriber>, endpoint: EndpointConfig) -> Self {
        Self {
            transcriber,
            endpoint,
        }
    }
}

impl SpeechRecognizer for MicRecognizer {
    fn recognize_once(
        &self,
        language: String,
        cancel: Arc<AtomicBool>,
    ) -> ProviderFuture<'static, Result<String>> {
        let transcriber = Arc::clone(&self.transcriber);
        let endpoint = self.endpoint.clone();

        Box::pin(async move {
            let cancel_rec = Arc::clone(&cancel);
            let utterance = tokio::task::spawn_blocking(move || record_utterance(endpoint, &cancel_rec))
                .await
                .map_err(|e| LinguaError::Capture(format!("capture task failed: {e}")))??;

            if cancel.load(Ordering::SeqCst) {
                return Err(LinguaError::Capture("recognition cancelled".into()));
            }

            let wav = codec::encode_container(&utterance)
                .map_err(|e| LinguaError::Capture(format!("utterance not encodable: {e}")))?;
            debug!(bytes = wav.len(), secs = utterance.duration_secs(), "sending utterance");
            transcriber
                .transcribe(wav, language)
                .await
                .map_err(|e| match e {
                    LinguaError::Capture(_) => e,
                    other => LinguaError::Capture(other.to_string()),
                })
        })
    }
}

/// Record one utterance from the default microphone.
///
/// Runs on a blocking thread: it owns the `!Send` capture stream from open to
/// drop.
fn record_utterance(config: EndpointConfig, cancel: &AtomicBool) -> Result<SampleBuffer> {
    let running = Arc::new(AtomicBool::new(true));
    let (producer, mut consumer) = create_audio_ring();
    let capture = AudioCapture::open_default(producer, Arc::clone(&running))?;
    let rate = capture.sample_rate;

    let mut endpointer = Endpointer::new(config);
    let mut frame = vec![0f32; endpointer.frame_len(rate)];
    let mut filled = 0usize;

    info!(sample_rate = rate, "listening for one utterance");

    let outcome = loop {
        if cancel.load(Ordering::SeqCst) {
            break Err(LinguaError::Capture("recognition cancelled".into()));
        }

        filled += consumer.pop_slice(&mut frame[filled..]);
        if filled < frame.len() {
            std::thread::sleep(POLL_INTERVAL);
            continue;
        }
        filled = 0;

        match endpointer.push(&frame) {
            Endpoint::Waiting | Endpoint::Capturing => {}
            Endpoint::Complete => break Ok(()),
            Endpoint::NoSpeech => break Err(LinguaError::Capture("no speech detected".into())),
        }
    };

    capture.stop();
    // Stream drops here, releasing the microphone on this thread.
    drop(capture);
    outcome?;

    let samples = resample_all(&endpointer.into_utterance(), rate, TRANSCRIBE_SAMPLE_RATE)?;
    Ok(SampleBuffer::mono(samples, TRANSCRIBE_SAMPLE_RATE))
}
