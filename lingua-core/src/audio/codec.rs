//! Pure transforms between the provider's wire audio and playable buffers.
//!
//! ```text
//! base64 text ──decode_base64──► PCM16LE bytes ──decode_pcm16──► SampleBuffer
//!                                      ▲                               │
//!                                      └──── strip_header ◄── encode_container
//! ```
//!
//! Normalization divides by 32768 and re-quantization multiplies by 32768,
//! so every 16-bit sample survives a decode → encode cycle bit-exactly.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use super::{SampleBuffer, PROVIDER_CHANNELS, PROVIDER_SAMPLE_RATE};
use crate::error::{LinguaError, Result};

/// Size of the canonical RIFF/WAVE header written by [`encode_container`].
pub const WAV_HEADER_LEN: usize = 44;

const PCM_SCALE: f32 = 32768.0;
const BITS_PER_SAMPLE: u16 = 16;

/// Decode standard (padded) base64 text.
///
/// # Errors
/// `LinguaError::MalformedAudio` on an invalid alphabet or padding.
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(text.trim())
        .map_err(|e| LinguaError::MalformedAudio(format!("invalid base64: {e}")))
}

/// Interpret `bytes` as interleaved signed 16-bit little-endian PCM.
///
/// # Errors
/// `LinguaError::MalformedAudio` if `channels` is zero or the byte length is
/// not a whole number of frames (`2 * channels` bytes each).
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<SampleBuffer> {
    if channels == 0 {
        return Err(LinguaError::MalformedAudio("channel count must be > 0".into()));
    }
    let frame_bytes = 2 * channels as usize;
    if bytes.len() % frame_bytes != 0 {
        return Err(LinguaError::MalformedAudio(format!(
            "{} bytes is not a multiple of the {}-byte frame size",
            bytes.len(),
            frame_bytes
        )));
    }

    let ch = channels as usize;
    let frames = bytes.len() / frame_bytes;
    let mut planes = vec![Vec::with_capacity(frames); ch];
    for (idx, pair) in bytes.chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        planes[idx % ch].push(sample as f32 / PCM_SCALE);
    }

    Ok(SampleBuffer::from_planes(planes, sample_rate))
}

/// Decode a provider audio payload: base64 PCM16LE, 24 kHz mono.
pub fn decode_provider_audio(base64_pcm: &str) -> Result<SampleBuffer> {
    let bytes = decode_base64(base64_pcm)?;
    decode_pcm16(&bytes, PROVIDER_SAMPLE_RATE, PROVIDER_CHANNELS)
}

/// Re-quantize one normalized sample to 16-bit PCM.
///
/// Clamped to the representable range first, then truncated toward zero.
fn quantize(sample: f32) -> i16 {
    (sample * PCM_SCALE).clamp(-32768.0, 32767.0) as i16
}

/// Interleave and re-quantize a buffer into raw PCM16LE bytes.
pub fn encode_pcm16(buffer: &SampleBuffer) -> Vec<u8> {
    let ch = buffer.channels() as usize;
    let mut out = Vec::with_capacity(buffer.frames() * ch * 2);
    for frame in 0..buffer.frames() {
        for plane in buffer.planes() {
            out.extend_from_slice(&quantize(plane[frame]).to_le_bytes());
        }
    }
    out
}

/// Produce a self-describing uncompressed WAV file for `buffer`.
///
/// # Errors
/// `LinguaError::MalformedAudio` if a header field cannot hold the buffer's
/// rate, channel count or length (RIFF sizes are 32-bit).
pub fn encode_container(buffer: &SampleBuffer) -> Result<Vec<u8>> {
    let channels = buffer.channels();
    let sample_rate = buffer.sample_rate();
    let bytes_per_frame = u32::from(channels) * u32::from(BITS_PER_SAMPLE / 8);
    let block_align = u16::try_from(bytes_per_frame)
        .map_err(|_| LinguaError::MalformedAudio(format!("{channels} channels do not fit a WAV header")))?;
    let byte_rate = sample_rate.checked_mul(bytes_per_frame).ok_or_else(|| {
        LinguaError::MalformedAudio(format!("{sample_rate} Hz x {channels} channels overflows the byte rate"))
    })?;
    let data_size = u32::try_from(buffer.frames())
        .ok()
        .and_then(|frames| frames.checked_mul(bytes_per_frame))
        .filter(|size| size.checked_add(36).is_some())
        .ok_or_else(|| {
            LinguaError::MalformedAudio(format!("{} frames exceed the 4 GiB WAV limit", buffer.frames()))
        })?;
    let pcm = encode_pcm16(buffer);

    let mut wav = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_size).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data chunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_size.to_le_bytes());
    wav.extend_from_slice(&pcm);

    Ok(wav)
}

/// Return the PCM payload of a container produced by [`encode_container`].
///
/// # Errors
/// `LinguaError::MalformedAudio` if the canonical 44-byte layout is not found.
pub fn strip_header(container: &[u8]) -> Result<&[u8]> {
    if container.len() < WAV_HEADER_LEN {
        return Err(LinguaError::MalformedAudio(format!(
            "container is {} bytes, shorter than the {WAV_HEADER_LEN}-byte header",
            container.len()
        )));
    }
    if &container[0..4] != b"RIFF" || &container[8..12] != b"WAVE" {
        return Err(LinguaError::MalformedAudio("missing RIFF/WAVE tags".into()));
    }
    if &container[12..16] != b"fmt " || &container[36..40] != b"data" {
        return Err(LinguaError::MalformedAudio("unexpected chunk layout".into()));
    }

    let data_size = u32::from_le_bytes([
        container[40],
        container[41],
        container[42],
        container[43],
    ]) as usize;
    let payload = &container[WAV_HEADER_LEN..];
    if data_size > payload.len() {
        return Err(LinguaError::MalformedAudio(format!(
            "data chunk claims {data_size} bytes but only {} are present",
            payload.len()
        )));
    }
    Ok(&payload[..data_size])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    fn pcm_of(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn every_i16_value_survives_a_container_cycle() {
        let all: Vec<i16> = (i16::MIN..=i16::MAX).collect();
        let bytes = pcm_of(&all);

        let buffer = decode_pcm16(&bytes, PROVIDER_SAMPLE_RATE, 1).unwrap();
        let container = encode_container(&buffer).unwrap();

        assert_eq!(strip_header(&container).unwrap(), bytes.as_slice());
    }

    #[test]
    fn stereo_input_is_deinterleaved_and_reinterleaved() {
        let bytes = pcm_of(&[100, -100, 200, -200, 300, -300]);
        let buffer = decode_pcm16(&bytes, 48_000, 2).unwrap();

        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.frames(), 3);
        assert_relative_eq!(buffer.plane(0)[1], 200.0 / 32768.0);
        assert_relative_eq!(buffer.plane(1)[2], -300.0 / 32768.0);

        let container = encode_container(&buffer).unwrap();
        assert_eq!(strip_header(&container).unwrap(), bytes.as_slice());
    }

    #[test]
    fn samples_are_normalized_by_32768() {
        let buffer = decode_pcm16(&pcm_of(&[i16::MIN, 0, 16384]), 24_000, 1).unwrap();
        assert_relative_eq!(buffer.plane(0)[0], -1.0);
        assert_relative_eq!(buffer.plane(0)[1], 0.0);
        assert_relative_eq!(buffer.plane(0)[2], 0.5);
    }

    #[test]
    fn odd_length_is_malformed() {
        let err = decode_pcm16(&[0u8, 1, 2], 24_000, 1).unwrap_err();
        assert!(matches!(err, LinguaError::MalformedAudio(_)));
    }

    #[test]
    fn partial_stereo_frame_is_malformed() {
        let err = decode_pcm16(&[0u8; 6], 24_000, 2).unwrap_err();
        assert!(matches!(err, LinguaError::MalformedAudio(_)));
    }

    #[test]
    fn zero_channels_is_malformed() {
        assert!(decode_pcm16(&[], 24_000, 0).is_err());
    }

    #[test]
    fn quantize_clamps_then_truncates() {
        assert_eq!(quantize(1.0), 32767);
        assert_eq!(quantize(1.7), 32767);
        assert_eq!(quantize(-1.5), -32768);
        assert_eq!(quantize(0.999_99), 32767);
        assert_eq!(quantize(-0.000_01), 0);
    }

    #[test]
    fn header_fields_match_buffer() {
        let buffer = SampleBuffer::from_planes(vec![vec![0.25; 10], vec![-0.25; 10]], 22_050);
        let wav = encode_container(&buffer).unwrap();

        assert_eq!(wav.len(), WAV_HEADER_LEN + 40);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), 36 + 40);
        assert_eq!(u16::from_le_bytes(wav[20..22].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(wav[22..24].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 22_050);
        assert_eq!(u32::from_le_bytes(wav[28..32].try_into().unwrap()), 22_050 * 4);
        assert_eq!(u16::from_le_bytes(wav[32..34].try_into().unwrap()), 4);
        assert_eq!(u16::from_le_bytes(wav[34..36].try_into().unwrap()), 16);
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 40);
    }

    #[test]
    fn container_is_readable_by_an_independent_wav_parser() {
        let bytes = pcm_of(&[0, 1000, -1000, i16::MAX, i16::MIN]);
        let buffer = decode_pcm16(&bytes, PROVIDER_SAMPLE_RATE, 1).unwrap();
        let wav = encode_container(&buffer).unwrap();

        let mut reader = hound::WavReader::new(Cursor::new(wav)).expect("parse wav");
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, PROVIDER_SAMPLE_RATE);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 1000, -1000, i16::MAX, i16::MIN]);
    }

    #[test]
    fn strip_header_rejects_foreign_bytes() {
        assert!(strip_header(b"not a wav file").is_err());
        let mut wav = encode_container(&SampleBuffer::mono(vec![0.1; 4], 24_000)).unwrap();
        wav[0] = b'X';
        assert!(strip_header(&wav).is_err());
    }

    #[test]
    fn unrepresentable_header_fields_are_malformed_audio() {
        let too_fast = SampleBuffer::mono(vec![0.0; 4], u32::MAX);
        assert!(matches!(encode_container(&too_fast), Err(LinguaError::MalformedAudio(_))));

        let too_wide = SampleBuffer::from_planes(vec![Vec::new(); 40_000], 24_000);
        assert!(matches!(encode_container(&too_wide), Err(LinguaError::MalformedAudio(_))));
    }

    #[test]
    fn provider_audio_decodes_from_base64() {
        let encoded = BASE64.encode(pcm_of(&[0, 16384, -16384]));
        let buffer = decode_provider_audio(&encoded).unwrap();
        assert_eq!(buffer.sample_rate(), PROVIDER_SAMPLE_RATE);
        assert_eq!(buffer.channels(), 1);
        assert_eq!(buffer.frames(), 3);
    }

    #[test]
    fn invalid_base64_is_malformed_audio() {
        let err = decode_base64("@@not*base64@@").unwrap_err();
        assert!(matches!(err, LinguaError::MalformedAudio(_)));
        assert!(decode_base64("QUJD=").is_err());
    }
}
