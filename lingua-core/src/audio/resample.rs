//! Whole-signal sample-rate conversion on top of rubato's `FastFixedIn`.
//!
//! Synthesized speech arrives at 24 kHz and is converted to the output
//! device rate before playback. Recorded utterances are converted from the
//! microphone rate down to 16 kHz before transcription. Both are one-shot
//! conversions of a finished signal, so the converter works on complete
//! slices and pads the last chunk instead of carrying state between calls.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

use crate::error::{LinguaError, Result};

/// Input frames fed to rubato per call.
pub const DEFAULT_CHUNK: usize = 960;

/// Fixed-ratio mono converter. Equal rates skip rubato entirely.
pub struct RateConverter {
    engine: Option<FastFixedIn<f32>>,
    chunk: usize,
    ratio: f64,
    scratch: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// `LinguaError::Other` when rubato rejects the ratio or chunk size.
    pub fn new(from_rate: u32, to_rate: u32, chunk: usize) -> Result<Self> {
        if from_rate == 0 || to_rate == 0 || chunk == 0 {
            return Err(LinguaError::Other(anyhow::anyhow!(
                "cannot convert {from_rate} Hz to {to_rate} Hz in chunks of {chunk}"
            )));
        }
        let ratio = f64::from(to_rate) / f64::from(from_rate);
        if from_rate == to_rate {
            return Ok(Self {
                engine: None,
                chunk,
                ratio,
                scratch: Vec::new(),
            });
        }

        let engine = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk, 1)
            .map_err(|e| LinguaError::Other(anyhow::anyhow!("resampler init: {e}")))?;
        let scratch = vec![vec![0f32; engine.output_frames_max()]];
        debug!(from_rate, to_rate, chunk, "resampler ready");

        Ok(Self {
            engine: Some(engine),
            chunk,
            ratio,
            scratch,
        })
    }

    /// Convert a complete signal.
    ///
    /// The trailing partial chunk is zero-padded and the output is cut to
    /// `round(len * ratio)` samples, so the padding never reaches the caller.
    ///
    /// # Errors
    /// `LinguaError::Other` if rubato fails mid-signal.
    pub fn convert(&mut self, signal: &[f32]) -> Result<Vec<f32>> {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(signal.to_vec());
        };
        let expected = (signal.len() as f64 * self.ratio).round() as usize;
        let mut out = Vec::with_capacity(expected + self.scratch[0].len());
        let mut padded = Vec::new();

        for block in signal.chunks(self.chunk) {
            let input = if block.len() == self.chunk {
                block
            } else {
                padded.clear();
                padded.extend_from_slice(block);
                padded.resize(self.chunk, 0.0);
                padded.as_slice()
            };
            let (_, produced) = engine
                .process_into_buffer(&[input], &mut self.scratch, None)
                .map_err(|e| LinguaError::Other(anyhow::anyhow!("resampling failed: {e}")))?;
            out.extend_from_slice(&self.scratch[0][..produced]);
        }

        out.truncate(expected);
        Ok(out)
    }
}

/// Convert `samples` from `from_rate` to `to_rate` in one call.
pub fn resample_all(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    RateConverter::new(from_rate, to_rate, DEFAULT_CHUNK)?.convert(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn within(actual: usize, target: usize, slack: usize) -> bool {
        actual.abs_diff(target) <= slack
    }

    #[test]
    fn equal_rates_copy_the_signal() {
        let mut rc = RateConverter::new(24_000, 24_000, DEFAULT_CHUNK).unwrap();
        let ramp: Vec<f32> = (0..500).map(|i| i as f32 / 500.0).collect();
        assert_eq!(rc.convert(&ramp).unwrap(), ramp);
    }

    #[test]
    fn provider_rate_to_device_rate_doubles_length() {
        let out = resample_all(&vec![0.2f32; 2_400], 24_000, 48_000).unwrap();
        assert!(within(out.len(), 4_800, 20), "got {}", out.len());
    }

    #[test]
    fn microphone_rate_to_transcription_rate_keeps_the_tail() {
        // One and a half chunks at 48 kHz map to about 480 samples at 16 kHz.
        let out = resample_all(&vec![0.1f32; 1_440], 48_000, 16_000).unwrap();
        assert!(within(out.len(), 480, 12), "got {}", out.len());
    }

    #[test]
    fn short_signal_is_not_dropped() {
        let out = resample_all(&vec![0.3f32; 100], 44_100, 48_000).unwrap();
        assert!(!out.is_empty());
        assert!(out.len() <= 109);
    }

    #[test]
    fn zero_rates_are_rejected() {
        assert!(RateConverter::new(0, 16_000, DEFAULT_CHUNK).is_err());
        assert!(RateConverter::new(16_000, 16_000, 0).is_err());
    }
}
