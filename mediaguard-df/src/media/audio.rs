//! Audio loading with backend fallback
//!
//! Backends are tried in priority order; the first one that decodes the file
//! wins. Post-processing is applied once, whichever backend answered.

use super::{centered, MediaError};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Peak below which a signal is normalized up to full scale
pub const QUIET_PEAK: f32 = 0.1;
const NORMALIZE_EPSILON: f32 = 1e-8;

/// Decoded mono audio
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count of the source stream
    pub channels: usize,
    /// Length of the source before the duration cap, in seconds
    pub source_duration_seconds: f64,
    /// Backend that produced the samples
    pub backend: &'static str,
}

impl DecodedAudio {
    /// Wrap in-memory mono samples
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        let source_duration_seconds = if sample_rate > 0 {
            samples.len() as f64 / sample_rate as f64
        } else {
            0.0
        };
        Self {
            samples,
            sample_rate,
            channels: 1,
            source_duration_seconds,
            backend: "memory",
        }
    }

    /// Duration of the retained samples in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Centered sub-segment of at most `max_seconds`
    pub fn centered_segment(&self, max_seconds: f64) -> &[f32] {
        let max_len = (max_seconds * self.sample_rate as f64) as usize;
        centered(&self.samples, max_len)
    }
}

/// One way of turning a file into mono PCM
pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode `path` to mono at `target_sample_rate`
    ///
    /// Backends may stop early once `max_duration_seconds` of centered audio
    /// is available; the chain re-applies the cap either way.
    fn decode(
        &self,
        path: &Path,
        target_sample_rate: u32,
        max_duration_seconds: f64,
    ) -> Result<DecodedAudio, MediaError>;
}

/// Prioritized audio backends
#[derive(Clone)]
pub struct AudioLoaderChain {
    backends: Vec<Arc<dyn AudioBackend>>,
    target_sample_rate: u32,
}

impl AudioLoaderChain {
    pub fn new(backends: Vec<Arc<dyn AudioBackend>>, target_sample_rate: u32) -> Self {
        Self {
            backends,
            target_sample_rate,
        }
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Load `path` through the first backend that succeeds
    ///
    /// # Errors
    /// * `MediaError::NotFound` when the path does not exist
    /// * `MediaError::DecodeFailed` listing every backend's failure
    pub fn load(&self, path: &Path, max_duration_seconds: f64) -> Result<DecodedAudio, MediaError> {
        if !path.exists() {
            return Err(MediaError::NotFound(path.to_path_buf()));
        }

        let mut failures = Vec::new();
        for backend in &self.backends {
            match backend.decode(path, self.target_sample_rate, max_duration_seconds) {
                Ok(mut audio) => {
                    sanitize(&mut audio.samples);
                    let max_len = (max_duration_seconds * audio.sample_rate as f64) as usize;
                    if audio.samples.len() > max_len {
                        audio.samples = centered(&audio.samples, max_len).to_vec();
                    }
                    info!(
                        path = %path.display(),
                        backend = backend.name(),
                        duration_seconds = format!("{:.2}", audio.duration_seconds()),
                        "Audio loaded"
                    );
                    return Ok(audio);
                }
                Err(e) => {
                    debug!(path = %path.display(), backend = backend.name(), error = %e, "Audio backend failed");
                    failures.push(format!("{}: {}", backend.name(), e));
                }
            }
        }

        warn!(path = %path.display(), attempts = failures.len(), "Every audio backend failed");
        let reason = if failures.is_empty() {
            "no audio backend configured".to_string()
        } else {
            failures.join("; ")
        };
        Err(MediaError::DecodeFailed {
            path: path.to_path_buf(),
            reason,
        })
    }
}

/// Replace non-finite samples, clip to [-1, 1], and lift quiet signals
///
/// A signal whose peak is below [`QUIET_PEAK`] is scaled by
/// `1 / (peak + 1e-8)`; pure silence stays silent.
pub fn sanitize(samples: &mut [f32]) {
    let mut peak = 0.0f32;
    for s in samples.iter_mut() {
        if !s.is_finite() {
            *s = 0.0;
        }
        *s = s.clamp(-1.0, 1.0);
        peak = peak.max(s.abs());
    }

    if peak < QUIET_PEAK {
        let gain = 1.0 / (peak + NORMALIZE_EPSILON);
        for s in samples.iter_mut() {
            *s = (*s * gain).clamp(-1.0, 1.0);
        }
    }
}

/// Read a WAV file and mix it down to mono
///
/// Returns the samples, the file's sample rate and its channel count.
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32, usize), MediaError> {
    let decode_failed = |reason: String| MediaError::DecodeFailed {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = hound::WavReader::open(path).map_err(|e| decode_failed(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| decode_failed(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| decode_failed(e.to_string()))?
        }
    };

    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok((mono, spec.sample_rate, channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FailingBackend;

    impl AudioBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn decode(&self, _: &Path, _: u32, _: f64) -> Result<DecodedAudio, MediaError> {
            Err(MediaError::NoStream("audio"))
        }
    }

    struct FixedBackend {
        samples: Vec<f32>,
        calls: AtomicUsize,
    }

    impl AudioBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn decode(&self, _: &Path, rate: u32, _: f64) -> Result<DecodedAudio, MediaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DecodedAudio::from_samples(self.samples.clone(), rate))
        }
    }

    fn existing_file(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("input.bin");
        std::fs::write(&path, b"data").unwrap();
        path
    }

    #[test]
    fn test_sanitize_replaces_nan_and_clips() {
        let mut samples = vec![f32::NAN, 2.0, -3.0, f32::INFINITY, 0.5];
        sanitize(&mut samples);
        assert_eq!(samples, vec![0.0, 1.0, -1.0, 0.0, 0.5]);
    }

    #[test]
    fn test_sanitize_normalizes_quiet_signal() {
        let mut samples = vec![0.05, -0.025, 0.0];
        sanitize(&mut samples);
        assert!((samples[0] - 1.0).abs() < 1e-5);
        assert!((samples[1] + 0.5).abs() < 1e-5);

        let mut silence = vec![0.0; 8];
        sanitize(&mut silence);
        assert!(silence.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_chain_falls_through_to_working_backend() {
        let dir = TempDir::new().unwrap();
        let path = existing_file(&dir);
        let fixed = Arc::new(FixedBackend {
            samples: vec![0.5; 100],
            calls: AtomicUsize::new(0),
        });
        let chain = AudioLoaderChain::new(vec![Arc::new(FailingBackend), fixed.clone()], 16_000);

        let audio = chain.load(&path, 60.0).unwrap();
        assert_eq!(audio.backend, "memory");
        assert_eq!(audio.samples.len(), 100);
        assert_eq!(fixed.calls.load(Ordering::SeqCst), 1);
        assert_eq!(chain.backend_names(), vec!["failing", "fixed"]);
    }

    #[test]
    fn test_chain_caps_duration_with_centered_segment() {
        let dir = TempDir::new().unwrap();
        let path = existing_file(&dir);
        // 3 seconds at 10 Hz, ramp so position is visible
        let samples: Vec<f32> = (0..30).map(|i| 0.5 + i as f32 / 100.0).collect();
        let chain = AudioLoaderChain::new(
            vec![Arc::new(FixedBackend {
                samples,
                calls: AtomicUsize::new(0),
            })],
            10,
        );

        let audio = chain.load(&path, 1.0).unwrap();
        assert_eq!(audio.samples.len(), 10);
        assert!((audio.samples[0] - 0.60).abs() < 1e-6);
        assert_eq!(audio.source_duration_seconds, 3.0);
    }

    #[test]
    fn test_chain_reports_every_failure() {
        let dir = TempDir::new().unwrap();
        let path = existing_file(&dir);
        let chain = AudioLoaderChain::new(vec![Arc::new(FailingBackend), Arc::new(FailingBackend)], 16_000);

        match chain.load(&path, 60.0) {
            Err(MediaError::DecodeFailed { reason, .. }) => {
                assert_eq!(reason.matches("failing:").count(), 2);
            }
            other => panic!("expected DecodeFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let chain = AudioLoaderChain::new(vec![Arc::new(FailingBackend)], 16_000);
        assert!(matches!(
            chain.load(Path::new("/nonexistent/clip.wav"), 60.0),
            Err(MediaError::NotFound(_))
        ));
    }

    #[test]
    fn test_read_wav_mono_mixes_channels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(16_384i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let (mono, rate, channels) = read_wav_mono(&path).unwrap();
        assert_eq!(rate, 8_000);
        assert_eq!(channels, 2);
        assert_eq!(mono.len(), 100);
        assert!((mono[0] - 0.25).abs() < 1e-6);
    }
}
