//! Audio Test Fixture Generator
//!
//! Writes WAV files with known content for the detector tests

use std::path::{Path, PathBuf};

/// Configuration for generated audio
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub frequency_hz: f32,
    /// Peak amplitude in [0, 1]; 0 writes silence
    pub amplitude: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 3.0,
            sample_rate: 44100,
            channels: 2,
            frequency_hz: 440.0,
            amplitude: 0.3,
        }
    }
}

/// Generate a 16-bit PCM WAV file with a steady tone
pub fn generate_test_wav(path: &Path, config: &AudioConfig) -> anyhow::Result<PathBuf> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let total_samples = (config.duration_seconds * config.sample_rate as f64) as usize;

    for i in 0..total_samples {
        let t = i as f32 / config.sample_rate as f32;
        let value = config.amplitude * (2.0 * std::f32::consts::PI * config.frequency_hz * t).sin();
        let sample = (value * i16::MAX as f32) as i16;
        for _ in 0..config.channels {
            writer.write_sample(sample)?;
        }
    }

    writer.finalize()?;
    Ok(path.to_path_buf())
}

/// WAV bytes for upload tests
pub fn test_wav_bytes(config: &AudioConfig) -> anyhow::Result<Vec<u8>> {
    let dir = tempfile::tempdir()?;
    let path = generate_test_wav(&dir.path().join("clip.wav"), config)?;
    Ok(std::fs::read(path)?)
}
