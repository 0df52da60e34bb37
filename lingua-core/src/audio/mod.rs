//! Audio types and I/O.
//!
//! - [`codec`]: pure PCM16 / base64 / WAV transforms (no I/O, no state).
//! - [`output`]: the output device seam used by the playback scheduler.
//! - [`capture`]: microphone capture into a lock-free ring buffer.
//! - [`resample`]: fixed-ratio sample-rate conversion.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on macOS).
//! Both the output stream and the capture stream are therefore created and
//! dropped on a single dedicated thread.

pub mod capture;
pub mod codec;
pub mod output;
pub mod resample;

/// Sample rate of the provider's synthesized speech (Hz).
pub const PROVIDER_SAMPLE_RATE: u32 = 24_000;

/// Channel count of the provider's synthesized speech.
pub const PROVIDER_CHANNELS: u16 = 1;

/// Decoded audio laid out as one plane of normalized samples per channel.
///
/// Samples are in `[-1.0, 1.0)`. Owned by the turn that produced it and
/// shared as `Arc<SampleBuffer>` with the playback path while audible.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    planes: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Build a buffer from per-channel planes.
    ///
    /// # Panics
    /// Panics if `planes` is empty or the planes differ in length.
    pub fn from_planes(planes: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        assert!(!planes.is_empty(), "a sample buffer needs at least one channel");
        let frames = planes[0].len();
        assert!(
            planes.iter().all(|p| p.len() == frames),
            "all channel planes must have the same length"
        );
        Self {
            planes,
            sample_rate,
        }
    }

    /// Build a single-channel buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::from_planes(vec![samples], sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.planes.len() as u16
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.planes[0].len()
    }

    pub fn plane(&self, channel: usize) -> &[f32] {
        &self.planes[channel]
    }

    pub fn planes(&self) -> &[Vec<f32>] {
        &self.planes
    }

    /// Returns the duration of this buffer in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }
}
