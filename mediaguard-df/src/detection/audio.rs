//! Audio deepfake detector
//!
//! Learned model (optional) + spectral artifacts + prosody over mono audio.

use super::engine::{FusionEngine, FusionInput};
use super::weighting::WeightingPolicy;
use super::{DetectionResult, QualityMetadata};
use crate::media::{AudioLoaderChain, DecodedAudio};
use crate::model::ModelHandle;
use crate::scorers::{LearnedModelScorer, ProsodyScorer, SpectralScorer};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Clips shorter than this are flagged too short
pub const TOO_SHORT_SECONDS: f64 = 1.0;
/// Sources longer than this are flagged too long
pub const TOO_LONG_SECONDS: f64 = 300.0;
const GOOD_QUALITY_SECONDS: f64 = 2.0;

impl FusionInput for DecodedAudio {
    fn quality(&self) -> anyhow::Result<QualityMetadata> {
        if self.sample_rate == 0 {
            anyhow::bail!("sample rate is zero");
        }
        if self.samples.is_empty() {
            anyhow::bail!("no samples decoded");
        }

        let duration = self.duration_seconds();
        let (max_amplitude, sum) = self
            .samples
            .iter()
            .fold((0.0f64, 0.0f64), |(max, sum), &s| {
                let a = (s as f64).abs();
                (max.max(a), sum + a)
            });

        Ok(QualityMetadata {
            duration_seconds: Some(duration),
            sample_rate: Some(self.sample_rate),
            sample_count: Some(self.samples.len()),
            max_amplitude: Some(max_amplitude),
            mean_amplitude: Some(sum / self.samples.len() as f64),
            is_too_short: Some(duration < TOO_SHORT_SECONDS),
            is_too_long: Some(self.source_duration_seconds > TOO_LONG_SECONDS),
            ..Default::default()
        })
    }

    fn describe(&self, details: &mut Map<String, Value>) {
        let duration = self.duration_seconds();
        details.insert("audio_duration".to_string(), json!(duration));
        details.insert(
            "audio_quality".to_string(),
            json!(if duration > GOOD_QUALITY_SECONDS { "good" } else { "poor" }),
        );
        details.insert("decoder".to_string(), json!(self.backend));
    }
}

/// Audio detection entry point
pub struct AudioDetector {
    loader: AudioLoaderChain,
    engine: FusionEngine<DecodedAudio>,
    max_duration_seconds: f64,
}

impl AudioDetector {
    /// Standard audio pipeline around a shared model handle
    pub fn new(
        loader: AudioLoaderChain,
        model: Arc<ModelHandle>,
        threshold: f64,
        max_duration_seconds: f64,
    ) -> Self {
        let engine = FusionEngine::new(WeightingPolicy::audio(), threshold)
            .with_scorer(LearnedModelScorer::new(model))
            .with_scorer(SpectralScorer)
            .with_scorer(ProsodyScorer::default());
        Self::with_engine(loader, engine, max_duration_seconds)
    }

    pub fn with_engine(
        loader: AudioLoaderChain,
        engine: FusionEngine<DecodedAudio>,
        max_duration_seconds: f64,
    ) -> Self {
        Self {
            loader,
            engine,
            max_duration_seconds,
        }
    }

    pub fn loader(&self) -> &AudioLoaderChain {
        &self.loader
    }

    pub fn threshold(&self) -> f64 {
        self.engine.threshold()
    }

    /// Decode `path` and fuse every audio method
    ///
    /// Never fails: an unreadable input yields [`DetectionResult::fallback`].
    pub fn detect(&self, path: &Path) -> DetectionResult {
        info!(path = %path.display(), "Starting audio deepfake analysis");
        self.engine
            .detect(|| self.loader.load(path, self.max_duration_seconds))
    }

    /// Fuse already decoded audio
    pub fn detect_clip(&self, audio: &DecodedAudio) -> DetectionResult {
        self.engine.fuse(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DetectionMethod, FALLBACK_CONFIDENCE};
    use crate::media::SymphoniaBackend;

    fn detector() -> AudioDetector {
        AudioDetector::new(
            AudioLoaderChain::new(vec![Arc::new(SymphoniaBackend::new())], 16_000),
            Arc::new(ModelHandle::disabled()),
            0.5,
            60.0,
        )
    }

    #[test]
    fn test_silent_clip_fuses_spectral_and_prosody_fallback() {
        let audio = DecodedAudio::from_samples(vec![0.0; 16_000 * 5], 16_000);
        let result = detector().detect_clip(&audio);

        assert_eq!(result.method_scores.len(), 2);
        assert!((result.method_scores.get(DetectionMethod::SpectralAnalysis).unwrap() - 0.6).abs() < 1e-9);
        assert_eq!(result.method_scores.get(DetectionMethod::ProsodyAnalysis), Some(0.3));
        // weights 0.48 / 0.32 after the quiet-signal damping
        assert!((result.confidence - 0.48).abs() < 1e-9);
        assert!(!result.is_fake);
        assert_eq!(result.details["model_used"], json!(false));
        assert_eq!(result.details["audio_quality"], json!("good"));
        assert!((result.details["total_weight"].as_f64().unwrap() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_quality_flags() {
        let short = DecodedAudio::from_samples(vec![0.2; 15_984], 16_000);
        let quality = short.quality().unwrap();
        assert_eq!(quality.is_too_short, Some(true));
        assert_eq!(quality.is_too_long, Some(false));
        assert!((quality.mean_amplitude.unwrap() - 0.2).abs() < 1e-6);

        let exact = DecodedAudio::from_samples(vec![0.2; 16_000], 16_000);
        assert_eq!(exact.quality().unwrap().is_too_short, Some(false));

        let mut long = exact.clone();
        long.source_duration_seconds = 301.0;
        assert_eq!(long.quality().unwrap().is_too_long, Some(true));
    }

    #[test]
    fn test_missing_file_is_fallback() {
        let result = detector().detect(Path::new("/nonexistent/voice.wav"));
        assert!(!result.is_fake);
        assert_eq!(result.confidence, FALLBACK_CONFIDENCE);
        assert!(result.method_scores.is_empty());
        assert!(result.error().unwrap().contains("/nonexistent/voice.wav"));
    }
}
