//! Microphone capture via cpal into a lock-free SPSC ring buffer.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It must not block or perform I/O. It downmixes to mono into a scratch
//! buffer sized on the first callback and hands samples to the ring's
//! `push_slice`, which is lock-free.
//!
//! `AudioCapture` must be created and dropped on the same thread; the
//! recognizer does this inside `spawn_blocking`.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

use crate::error::{LinguaError, Result};

/// Producer half, held by the audio callback.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the endpointing loop.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// 2^21 f32 samples, about 43 s at 48 kHz. One utterance never gets close.
pub const RING_CAPACITY: usize = 1 << 21;

/// Create a matched producer/consumer pair backed by a heap-allocated ring.
pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}

/// Handle to an active input stream.
///
/// **Not `Send`**: `cpal::Stream` is bound to its creation thread.
pub struct AudioCapture {
    #[cfg(feature = "audio-cpal")]
    _stream: cpal::Stream,
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

#[cfg(feature = "audio-cpal")]
impl AudioCapture {
    /// Open the system default microphone and push mono f32 samples into
    /// `producer` while `running` is set.
    ///
    /// # Errors
    /// `LinguaError::Capture` when no microphone is available, access is
    /// denied, or the stream cannot be built.
    pub fn open_default(producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
        use cpal::SampleFormat;
        use tracing::info;

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| LinguaError::Capture("no default input device".into()))?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| LinguaError::Capture(format!("microphone unavailable: {e}")))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let config = supported.config();

        info!(sample_rate, channels, "input config selected");

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_input::<f32>(&device, &config, producer, Arc::clone(&running)),
            SampleFormat::I16 => build_input::<i16>(&device, &config, producer, Arc::clone(&running)),
            SampleFormat::U16 => build_input::<u16>(&device, &config, producer, Arc::clone(&running)),
            SampleFormat::U8 => build_input::<u8>(&device, &config, producer, Arc::clone(&running)),
            fmt => {
                return Err(LinguaError::Capture(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| LinguaError::Capture(e.to_string()))?;

        stream
            .play()
            .map_err(|e| LinguaError::Capture(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }
}

#[cfg(feature = "audio-cpal")]
fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: AudioProducer,
    running: Arc<AtomicBool>,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    use cpal::traits::DeviceTrait;
    use cpal::Sample;
    use tracing::{error, warn};

    let ch = config.channels as usize;
    let mut mix_buf: Vec<f32> = Vec::new();
    device.build_input_stream(
        config,
        move |data: &[T], _info| {
            if !running.load(Ordering::Relaxed) {
                return;
            }
            let frames = data.len() / ch;
            mix_buf.resize(frames, 0.0);
            for (f, frame) in data.chunks_exact(ch).enumerate() {
                let sum: f32 = frame.iter().map(|&s| s.to_sample::<f32>()).sum();
                mix_buf[f] = sum / ch as f32;
            }
            let written = producer.push_slice(&mix_buf);
            if written < mix_buf.len() {
                warn!("ring buffer full: dropped {} frames", mix_buf.len() - written);
            }
        },
        |err| error!("audio input stream error: {err}"),
        None,
    )
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_default(_producer: AudioProducer, _running: Arc<AtomicBool>) -> Result<Self> {
        Err(LinguaError::Capture(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

impl AudioCapture {
    /// Signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}
