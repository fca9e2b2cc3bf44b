//! Detection results and the fusion pipeline
//!
//! Every detector runs the same pipeline (see [`engine`]): collect quality
//! facts, run each method in isolation, weight the methods by availability
//! and quality, and average. The types here are what comes out of it.

pub mod audio;
pub mod engine;
pub mod video;
pub mod weighting;

pub use audio::AudioDetector;
pub use engine::{aggregate, FusionEngine, FusionInput, FusionRun, FusionStage, MethodOutcome};
pub use video::{VideoDetector, VideoEvidence};
pub use weighting::{DampingRule, QualityCondition, WeightVector, WeightingPolicy};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Placeholder score for a weighted method with no score
pub const NEUTRAL_SCORE: f64 = 0.5;
/// Confidence reported when the pipeline could not run at all
pub const FALLBACK_CONFIDENCE: f64 = 0.1;
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Scoring methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    LearnedModel,
    SpectralAnalysis,
    ProsodyAnalysis,
    FacialAnalysis,
    LipSync,
    BlinkAnalysis,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::LearnedModel => "learned_model",
            DetectionMethod::SpectralAnalysis => "spectral_analysis",
            DetectionMethod::ProsodyAnalysis => "prosody_analysis",
            DetectionMethod::FacialAnalysis => "facial_analysis",
            DetectionMethod::LipSync => "lip_sync",
            DetectionMethod::BlinkAnalysis => "blink_analysis",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores of the methods that produced one, each in [0, 1]
///
/// A missing method means unavailable, never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MethodScores(BTreeMap<DetectionMethod, f64>);

impl MethodScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a score, clamped to [0, 1]; non-finite values become neutral
    pub fn insert(&mut self, method: DetectionMethod, score: f64) {
        let score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            NEUTRAL_SCORE
        };
        self.0.insert(method, score);
    }

    pub fn get(&self, method: DetectionMethod) -> Option<f64> {
        self.0.get(&method).copied()
    }

    pub fn contains(&self, method: DetectionMethod) -> bool {
        self.0.contains_key(&method)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DetectionMethod, f64)> + '_ {
        self.0.iter().map(|(m, s)| (*m, *s))
    }
}

impl FromIterator<(DetectionMethod, f64)> for MethodScores {
    fn from_iter<T: IntoIterator<Item = (DetectionMethod, f64)>>(iter: T) -> Self {
        let mut scores = Self::new();
        for (method, score) in iter {
            scores.insert(method, score);
        }
        scores
    }
}

/// Facts about the input used to modulate weights
///
/// Every field is optional; a detector fills in what applies to its
/// modality and a failed extraction leaves the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualityMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_amplitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_amplitude: Option<f64>,
    /// Face crops found at the 1 fps classifier cadence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_sampled: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_audio_track: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_too_short: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_too_long: Option<bool>,
}

/// Outcome of one detection call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub is_fake: bool,
    /// Fused suspicion in [0, 1]
    pub confidence: f64,
    pub method_scores: MethodScores,
    pub quality: QualityMetadata,
    pub details: Map<String, Value>,
}

impl DetectionResult {
    /// Low-confidence "real" result for a pipeline that could not run
    pub fn fallback(message: impl Into<String>) -> Self {
        let mut details = Map::new();
        details.insert("error".to_string(), Value::String(message.into()));
        Self {
            is_fake: false,
            confidence: FALLBACK_CONFIDENCE,
            method_scores: MethodScores::new(),
            quality: QualityMetadata::default(),
            details,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.method_scores.is_empty() && self.details.contains_key("error")
    }

    pub fn error(&self) -> Option<&str> {
        self.details.get("error").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_scores_are_clamped() {
        let mut scores = MethodScores::new();
        scores.insert(DetectionMethod::SpectralAnalysis, 1.7);
        scores.insert(DetectionMethod::ProsodyAnalysis, -0.2);
        scores.insert(DetectionMethod::LipSync, f64::NAN);

        assert_eq!(scores.get(DetectionMethod::SpectralAnalysis), Some(1.0));
        assert_eq!(scores.get(DetectionMethod::ProsodyAnalysis), Some(0.0));
        assert_eq!(scores.get(DetectionMethod::LipSync), Some(NEUTRAL_SCORE));
        assert_eq!(scores.get(DetectionMethod::LearnedModel), None);
    }

    #[test]
    fn test_method_scores_serialize_by_name() {
        let scores: MethodScores = [
            (DetectionMethod::BlinkAnalysis, 0.7),
            (DetectionMethod::LearnedModel, 0.25),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            serde_json::to_value(&scores).unwrap(),
            json!({"learned_model": 0.25, "blink_analysis": 0.7})
        );
    }

    #[test]
    fn test_fallback_result_shape() {
        let result = DetectionResult::fallback("File not found: /nope.wav");
        assert!(!result.is_fake);
        assert_eq!(result.confidence, FALLBACK_CONFIDENCE);
        assert!(result.is_fallback());
        assert_eq!(result.error(), Some("File not found: /nope.wav"));

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["method_scores"], json!({}));
        assert_eq!(value["quality"], json!({}));
        assert_eq!(value["details"], json!({"error": "File not found: /nope.wav"}));
    }
}
