//! Audio decoder using symphonia
//!
//! Decodes an in-memory clip payload (WAV-container PCM as delivered by the
//! synthesis service) into interleaved stereo f32 samples.
//!
//! # Sample Format
//!
//! - Output: stereo f32 samples (interleaved: [L, R, L, R, ...])
//! - Mono input: duplicated to stereo
//! - Multi-channel input: downmixed to stereo

use crate::error::{Error, Result};
use std::io::Cursor;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Fully decoded clip audio
#[derive(Debug)]
pub struct DecodedClip {
    /// Interleaved stereo f32 samples [L, R, L, R, ...]
    pub samples: Vec<f32>,

    /// Native sample rate of the payload
    pub sample_rate: u32,
}

impl DecodedClip {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frames() as u64 * 1000) / self.sample_rate as u64
    }
}

/// Decode a complete clip payload from container bytes.
///
/// Clips are short (one paragraph of speech), so the whole payload is
/// decoded up front rather than streamed.
pub fn decode_clip(bytes: Vec<u8>) -> Result<DecodedClip> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("wav");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Decode(format!("unrecognized container: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| Error::Decode("no audio track found".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| Error::Decode("payload declares no sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("unsupported codec: {}", e)))?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break; // EOF
            }
            Err(e) => return Err(Error::Decode(format!("packet read failed: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| Error::Decode(format!("decode failed: {}", e)))?;

        append_stereo_f32(&decoded, &mut samples)?;
    }

    if samples.is_empty() {
        return Err(Error::Decode("payload contained no audio frames".to_string()));
    }

    Ok(DecodedClip {
        samples,
        sample_rate,
    })
}

/// Append a decoded buffer to `out` as interleaved stereo f32.
fn append_stereo_f32(buffer: &AudioBufferRef, out: &mut Vec<f32>) -> Result<()> {
    match buffer {
        AudioBufferRef::U8(buf) => convert(buf.spec().channels.count(), buf.frames(), out, |ch, i| {
            (buf.chan(ch)[i] as f32 - 128.0) / 128.0
        }),
        AudioBufferRef::S16(buf) => convert(buf.spec().channels.count(), buf.frames(), out, |ch, i| {
            buf.chan(ch)[i] as f32 / 32768.0
        }),
        AudioBufferRef::S32(buf) => convert(buf.spec().channels.count(), buf.frames(), out, |ch, i| {
            buf.chan(ch)[i] as f32 / 2147483648.0
        }),
        AudioBufferRef::F32(buf) => convert(buf.spec().channels.count(), buf.frames(), out, |ch, i| {
            buf.chan(ch)[i]
        }),
        AudioBufferRef::F64(buf) => convert(buf.spec().channels.count(), buf.frames(), out, |ch, i| {
            buf.chan(ch)[i] as f32
        }),
        _ => Err(Error::Decode(
            "unsupported sample format in payload".to_string(),
        )),
    }
}

/// Channel-count dispatch shared by every sample format.
fn convert<F>(channels: usize, frames: usize, out: &mut Vec<f32>, sample: F) -> Result<()>
where
    F: Fn(usize, usize) -> f32,
{
    match channels {
        0 => Err(Error::Decode("payload declares zero channels".to_string())),
        1 => {
            // Mono: duplicate to stereo
            out.reserve(frames * 2);
            for i in 0..frames {
                let s = sample(0, i);
                out.push(s);
                out.push(s);
            }
            Ok(())
        }
        2 => {
            out.reserve(frames * 2);
            for i in 0..frames {
                out.push(sample(0, i));
                out.push(sample(1, i));
            }
            Ok(())
        }
        n => {
            // Multi-channel: average alternating channels into L/R
            out.reserve(frames * 2);
            let half = (n as f32 / 2.0).max(1.0);
            for i in 0..frames {
                let mut left = 0.0f32;
                let mut right = 0.0f32;
                for ch in 0..n {
                    if ch % 2 == 0 {
                        left += sample(ch, i);
                    } else {
                        right += sample(ch, i);
                    }
                }
                out.push(left / half);
                out.push(right / half);
            }
            Ok(())
        }
    }
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(duration_ms: u64, sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let frames = (sample_rate as u64 * duration_ms / 1000) as usize;
            for i in 0..frames {
                let t = i as f32 / sample_rate as f32;
                let value = ((t * 440.0 * std::f32::consts::TAU).sin() * 8000.0) as i16;
                for _ in 0..channels {
                    writer.write_sample(value).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_stereo_wav() {
        let clip = decode_clip(wav_bytes(200, 22050, 2)).unwrap();
        assert_eq!(clip.sample_rate, 22050);
        let expected_frames = 22050 * 200 / 1000;
        assert_eq!(clip.frames(), expected_frames as usize);
        assert_eq!(clip.duration_ms(), 200);
    }

    #[test]
    fn test_decode_mono_duplicated_to_stereo() {
        let clip = decode_clip(wav_bytes(100, 16000, 1)).unwrap();
        // Interleaved stereo output: adjacent samples identical
        assert_eq!(clip.samples[0], clip.samples[1]);
        assert_eq!(clip.frames(), 1600);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = decode_clip(vec![0xDE, 0xAD, 0xBE, 0xEF].repeat(64));
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_decode_empty_fails() {
        assert!(decode_clip(Vec::new()).is_err());
    }
}
