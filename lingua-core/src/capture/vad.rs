//! Energy VAD and utterance endpointing.
//!
//! ## Algorithm
//!
//! 1. Compute RMS of the incoming frame.
//! 2. If RMS ≥ `threshold` → `Speech`, reset the hangover counter.
//! 3. If RMS < `threshold` and hangover counter > 0 → `Speech`, decrement.
//! 4. Otherwise → `Silence`.
//!
//! The [`Endpointer`] turns the per-frame decisions into one utterance:
//! wait for speech (give up after `no_speech_timeout_ms`), then record until
//! `trailing_silence_ms` of silence or `max_utterance_ms` of audio.

/// Whether a frame contains speech or silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    Speech,
    Silence,
}

impl VadDecision {
    pub fn is_speech(self) -> bool {
        self == VadDecision::Speech
    }
}

/// Implementors may be stateful (hangover counters and the like).
pub trait VoiceActivityDetector: Send + 'static {
    fn classify(&mut self, frame: &[f32]) -> VadDecision;

    fn reset(&mut self);
}

/// A simple energy-based voice activity detector.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    /// RMS amplitude threshold. Typical range: 0.01–0.05.
    threshold: f32,
    /// Silent frames still reported as `Speech` after real speech ends.
    hangover_frames: u32,
    hangover_counter: u32,
}

impl EnergyVad {
    pub fn new(threshold: f32, hangover_frames: u32) -> Self {
        Self {
            threshold,
            hangover_frames,
            hangover_counter: 0,
        }
    }

    /// Root-mean-square of a sample slice.
    pub fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(0.01, 8)
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn classify(&mut self, frame: &[f32]) -> VadDecision {
        if Self::rms(frame) >= self.threshold {
            self.hangover_counter = self.hangover_frames;
            VadDecision::Speech
        } else if self.hangover_counter > 0 {
            self.hangover_counter -= 1;
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    fn reset(&mut self) {
        self.hangover_counter = 0;
    }
}

/// Endpointing parameters for one-shot recognition.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub vad_threshold: f32,
    pub hangover_frames: u32,
    /// Analysis frame length.
    pub frame_ms: u32,
    /// Give up when no speech starts within this window.
    pub no_speech_timeout_ms: u32,
    /// Silence after speech that ends the utterance.
    pub trailing_silence_ms: u32,
    /// Hard cap on the recorded utterance.
    pub max_utterance_ms: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            vad_threshold: 0.01,
            hangover_frames: 8,
            frame_ms: 20,
            no_speech_timeout_ms: 6_000,
            trailing_silence_ms: 900,
            max_utterance_ms: 20_000,
        }
    }
}

/// Outcome of feeding one frame to the [`Endpointer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Still waiting for speech to start.
    Waiting,
    /// Speech started; keep feeding frames.
    Capturing,
    /// The utterance is complete; take it with [`Endpointer::into_utterance`].
    Complete,
    /// Nothing was said before the timeout.
    NoSpeech,
}

pub struct Endpointer {
    config: EndpointConfig,
    vad: Box<dyn VoiceActivityDetector>,
    utterance: Vec<f32>,
    started: bool,
    waited_ms: u32,
    recorded_ms: u32,
    silent_ms: u32,
}

impl Endpointer {
    pub fn new(config: EndpointConfig) -> Self {
        let vad = Box::new(EnergyVad::new(config.vad_threshold, config.hangover_frames));
        Self::with_vad(config, vad)
    }

    /// Use a caller-supplied detector. It is reset first, so state left over
    /// from an earlier utterance cannot start this one.
    pub fn with_vad(config: EndpointConfig, mut vad: Box<dyn VoiceActivityDetector>) -> Self {
        vad.reset();
        Self {
            config,
            vad,
            utterance: Vec::new(),
            started: false,
            waited_ms: 0,
            recorded_ms: 0,
            silent_ms: 0,
        }
    }

    /// Frame length in samples at `sample_rate`.
    pub fn frame_len(&self, sample_rate: u32) -> usize {
        (sample_rate as usize * self.config.frame_ms as usize / 1000).max(1)
    }

    /// Feed one frame of `frame_ms` worth of mono samples.
    pub fn push(&mut self, frame: &[f32]) -> Endpoint {
        let decision = self.vad.classify(frame);
        let step = self.config.frame_ms;

        if !self.started {
            if !decision.is_speech() {
                self.waited_ms += step;
                return if self.waited_ms >= self.config.no_speech_timeout_ms {
                    Endpoint::NoSpeech
                } else {
                    Endpoint::Waiting
                };
            }
            self.started = true;
        }

        self.utterance.extend_from_slice(frame);
        self.recorded_ms += step;
        if decision.is_speech() {
            self.silent_ms = 0;
        } else {
            self.silent_ms += step;
        }

        if self.silent_ms >= self.config.trailing_silence_ms
            || self.recorded_ms >= self.config.max_utterance_ms
        {
            Endpoint::Complete
        } else {
            Endpoint::Capturing
        }
    }

    pub fn into_utterance(self) -> Vec<f32> {
        self.utterance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent(len: usize) -> Vec<f32> {
        vec![0.0f32; len]
    }

    fn loud(amplitude: f32, len: usize) -> Vec<f32> {
        vec![amplitude; len]
    }

    #[test]
    fn speech_and_silence_by_threshold() {
        let mut vad = EnergyVad::new(0.02, 0);
        assert_eq!(vad.classify(&silent(160)), VadDecision::Silence);
        assert_eq!(vad.classify(&loud(0.5, 160)), VadDecision::Speech);
    }

    #[test]
    fn hangover_extends_speech() {
        let mut vad = EnergyVad::new(0.02, 3);
        assert_eq!(vad.classify(&loud(0.5, 160)), VadDecision::Speech);
        for _ in 0..3 {
            assert_eq!(vad.classify(&silent(160)), VadDecision::Speech);
        }
        assert_eq!(vad.classify(&silent(160)), VadDecision::Silence);
    }

    #[test]
    fn reset_clears_hangover() {
        let mut vad = EnergyVad::new(0.02, 5);
        vad.classify(&loud(0.5, 160));
        vad.reset();
        assert_eq!(vad.classify(&silent(160)), VadDecision::Silence);
    }

    #[test]
    fn rms_of_square_wave() {
        let samples: Vec<f32> = (0..256).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        approx::assert_abs_diff_eq!(EnergyVad::rms(&samples), 0.5, epsilon = 1e-5);
        assert_eq!(EnergyVad::rms(&[]), 0.0);
    }

    fn config() -> EndpointConfig {
        EndpointConfig {
            vad_threshold: 0.02,
            hangover_frames: 0,
            frame_ms: 20,
            no_speech_timeout_ms: 100,
            trailing_silence_ms: 60,
            max_utterance_ms: 400,
        }
    }

    #[test]
    fn silence_only_times_out() {
        let mut ep = Endpointer::new(config());
        let results: Vec<_> = (0..5).map(|_| ep.push(&silent(320))).collect();
        assert_eq!(results[..4], [Endpoint::Waiting; 4]);
        assert_eq!(results[4], Endpoint::NoSpeech);
    }

    #[test]
    fn trailing_silence_completes_and_skips_leading_silence() {
        let mut ep = Endpointer::new(config());
        assert_eq!(ep.push(&silent(320)), Endpoint::Waiting);
        assert_eq!(ep.push(&loud(0.3, 320)), Endpoint::Capturing);
        assert_eq!(ep.push(&loud(0.3, 320)), Endpoint::Capturing);
        assert_eq!(ep.push(&silent(320)), Endpoint::Capturing);
        assert_eq!(ep.push(&silent(320)), Endpoint::Capturing);
        assert_eq!(ep.push(&silent(320)), Endpoint::Complete);
        assert_eq!(ep.into_utterance().len(), 5 * 320);
    }

    #[test]
    fn long_speech_is_capped() {
        let mut ep = Endpointer::new(config());
        let mut last = Endpoint::Waiting;
        let mut frames = 0;
        while last != Endpoint::Complete {
            last = ep.push(&loud(0.3, 320));
            frames += 1;
        }
        assert_eq!(frames, 20);
    }

    #[test]
    fn reused_detector_starts_without_hangover() {
        let mut vad = EnergyVad::new(0.02, 5);
        assert_eq!(vad.classify(&loud(0.5, 320)), VadDecision::Speech);

        let mut ep = Endpointer::with_vad(config(), Box::new(vad));
        assert_eq!(ep.push(&silent(320)), Endpoint::Waiting);
        assert_eq!(ep.push(&loud(0.3, 320)), Endpoint::Capturing);
        assert_eq!(ep.into_utterance().len(), 320);
    }

    #[test]
    fn frame_len_follows_rate() {
        let ep = Endpointer::new(EndpointConfig::default());
        assert_eq!(ep.frame_len(48_000), 960);
        assert_eq!(ep.frame_len(16_000), 320);
    }
}
