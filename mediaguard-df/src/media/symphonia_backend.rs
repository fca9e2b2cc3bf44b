//! Native audio decoding via symphonia
//!
//! Decodes any container/codec symphonia supports, mixes to mono, keeps only
//! the centered window when the stream length is known up front, and
//! resamples with rubato.

use super::audio::{AudioBackend, DecodedAudio};
use super::MediaError;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// symphonia + rubato backend
#[derive(Debug, Default, Clone)]
pub struct SymphoniaBackend;

impl SymphoniaBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for SymphoniaBackend {
    fn name(&self) -> &'static str {
        "symphonia"
    }

    fn decode(
        &self,
        path: &Path,
        target_sample_rate: u32,
        max_duration_seconds: f64,
    ) -> Result<DecodedAudio, MediaError> {
        let failed = |reason: String| MediaError::DecodeFailed {
            path: path.to_path_buf(),
            reason,
        };

        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| failed(format!("probe: {}", e)))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(MediaError::NoStream("audio"))?;
        let track_id = track.id;
        let native_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| failed("sample rate unknown".to_string()))?;
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);
        let total_frames = track.codec_params.n_frames;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| failed(format!("codec: {}", e)))?;

        // Frame range to keep, in native frames
        let max_frames = (max_duration_seconds * native_rate as f64) as u64;
        let (keep_start, keep_end) = match total_frames {
            Some(total) if total > max_frames => {
                let start = (total - max_frames) / 2;
                (start, start + max_frames)
            }
            _ => (0, u64::MAX),
        };

        debug!(
            path = %path.display(),
            native_rate,
            channels,
            total_frames = ?total_frames,
            keep_start,
            "Decoding audio with symphonia"
        );

        let mut mono: Vec<f32> = Vec::new();
        let mut position = 0u64;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(failed(format!("read packet: {}", e))),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(path = %path.display(), error = %e, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(failed(format!("decode: {}", e))),
            };

            let spec = *decoded.spec();
            let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buf.copy_interleaved_ref(decoded);

            let packet_channels = spec.channels.count().max(1);
            for frame in buf.samples().chunks(packet_channels) {
                if position >= keep_start && position < keep_end {
                    mono.push(frame.iter().sum::<f32>() / packet_channels as f32);
                }
                position += 1;
            }

            if position >= keep_end {
                break;
            }
        }

        if mono.is_empty() {
            return Err(failed("no samples decoded".to_string()));
        }

        let source_frames = total_frames.unwrap_or(position);
        let samples = if native_rate != target_sample_rate {
            resample_mono(&mono, native_rate, target_sample_rate)
                .map_err(|e| failed(format!("resample: {}", e)))?
        } else {
            mono
        };

        Ok(DecodedAudio {
            samples,
            sample_rate: target_sample_rate,
            channels,
            source_duration_seconds: source_frames as f64 / native_rate as f64,
            backend: self.name(),
        })
    }
}

/// Resample mono PCM with rubato sinc interpolation
///
/// Single pass: the chunk size is the whole input.
pub fn resample_mono(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>, String> {
    if samples.is_empty() || source_rate == target_rate {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = target_rate as f64 / source_rate as f64;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .map_err(|e| e.to_string())?;
    let mut output = resampler
        .process(&[samples], None)
        .map_err(|e| e.to_string())?;

    debug!(
        input_frames = samples.len(),
        source_rate,
        target_rate,
        "Resampled audio"
    );

    Ok(output.pop().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            let value = (0.5
                * (2.0 * std::f64::consts::PI * 440.0 * i as f64 / sample_rate as f64).sin()
                * i16::MAX as f64) as i16;
            for _ in 0..channels {
                writer.write_sample(value).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_wav_at_target_rate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 16_000, 2, 16_000);

        let audio = SymphoniaBackend::new().decode(&path, 16_000, 60.0).unwrap();
        assert_eq!(audio.sample_rate, 16_000);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.samples.len(), 16_000);
        assert!((audio.source_duration_seconds - 1.0).abs() < 1e-9);
        let peak = audio.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.45 && peak < 0.55);
    }

    #[test]
    fn test_decode_keeps_centered_window() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("long.wav");
        write_wav(&path, 8_000, 1, 8_000 * 5);

        let audio = SymphoniaBackend::new().decode(&path, 8_000, 2.0).unwrap();
        assert_eq!(audio.samples.len(), 16_000);
        assert!((audio.source_duration_seconds - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_resamples() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cd.wav");
        write_wav(&path, 44_100, 1, 44_100);

        let audio = SymphoniaBackend::new().decode(&path, 16_000, 60.0).unwrap();
        assert_eq!(audio.sample_rate, 16_000);
        let expected = 16_000.0;
        assert!(
            (audio.samples.len() as f64 - expected).abs() / expected < 0.05,
            "got {} samples",
            audio.samples.len()
        );
    }

    #[test]
    fn test_garbage_file_fails_to_decode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"definitely not a riff header").unwrap();

        assert!(matches!(
            SymphoniaBackend::new().decode(&path, 16_000, 60.0),
            Err(MediaError::DecodeFailed { .. })
        ));
    }
}
