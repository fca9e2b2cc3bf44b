//! Fusion engine
//!
//! `Init → ExtractQuality → RunMethods → ComputeWeights → Aggregate → Done`,
//! with `ErrorFallback` reachable from any stage. Each scorer runs in
//! isolation; an error becomes either the scorer's documented fallback score
//! or "unavailable", and is reported in `details` either way.

use super::weighting::{WeightVector, WeightingPolicy};
use super::{
    DetectionMethod, DetectionResult, MethodScores, QualityMetadata, DEFAULT_THRESHOLD,
    NEUTRAL_SCORE,
};
use crate::scorers::Scorer;
use serde_json::{json, Map, Value};
use std::fmt::Display;
use tracing::{debug, error, info, warn};

/// Evidence the engine can fuse
pub trait FusionInput {
    /// Quality facts for weighting; an error means "unknown", not fatal
    fn quality(&self) -> anyhow::Result<QualityMetadata>;

    /// Modality-specific diagnostics for `details`
    fn describe(&self, _details: &mut Map<String, Value>) {}
}

/// Pipeline stages, recorded in the order they were entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionStage {
    Init,
    ExtractQuality,
    RunMethods,
    ComputeWeights,
    Aggregate,
    Done,
    ErrorFallback,
}

/// What one scorer produced
#[derive(Debug, Clone, PartialEq)]
pub enum MethodOutcome {
    Scored(f64),
    /// Scorer failed; its documented default stands in
    Fallback { score: f64, reason: String },
    /// Scorer failed and has no default
    Unavailable { reason: String },
}

impl MethodOutcome {
    pub fn score(&self) -> Option<f64> {
        match self {
            MethodOutcome::Scored(score) | MethodOutcome::Fallback { score, .. } => Some(*score),
            MethodOutcome::Unavailable { .. } => None,
        }
    }
}

/// Result plus the stages the pipeline went through
#[derive(Debug, Clone)]
pub struct FusionRun {
    pub result: DetectionResult,
    pub stages: Vec<FusionStage>,
}

/// Weighted average over methods with nonzero weight
///
/// A weighted method without a score contributes [`NEUTRAL_SCORE`]. A zero
/// total weight yields [`NEUTRAL_SCORE`]. The result is clamped to [0, 1].
pub fn aggregate(weights: &WeightVector, scores: &MethodScores) -> f64 {
    let (numerator, total) = weights
        .iter()
        .filter(|(_, w)| *w > 0.0)
        .fold((0.0, 0.0), |(num, total), (method, weight)| {
            let score = scores.get(method).unwrap_or(NEUTRAL_SCORE);
            (num + weight * score, total + weight)
        });

    if total > 0.0 {
        (numerator / total).clamp(0.0, 1.0)
    } else {
        NEUTRAL_SCORE
    }
}

/// Runs scorers over `I` and fuses their outputs
pub struct FusionEngine<I: ?Sized> {
    policy: WeightingPolicy,
    threshold: f64,
    scorers: Vec<Box<dyn Scorer<I>>>,
}

impl<I: FusionInput + ?Sized> FusionEngine<I> {
    pub fn new(policy: WeightingPolicy, threshold: f64) -> Self {
        Self {
            policy,
            threshold: if threshold.is_finite() {
                threshold.clamp(0.0, 1.0)
            } else {
                DEFAULT_THRESHOLD
            },
            scorers: Vec::new(),
        }
    }

    pub fn with_scorer(mut self, scorer: impl Scorer<I> + 'static) -> Self {
        self.scorers.push(Box::new(scorer));
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn policy(&self) -> &WeightingPolicy {
        &self.policy
    }

    /// Run every scorer, isolating failures
    pub fn run_methods(&self, input: &I) -> Vec<(DetectionMethod, MethodOutcome)> {
        self.scorers
            .iter()
            .map(|scorer| {
                let method = scorer.method();
                let outcome = match scorer.score(input) {
                    Ok(score) if score.is_finite() => MethodOutcome::Scored(score.clamp(0.0, 1.0)),
                    Ok(score) => Self::failed(scorer.as_ref(), format!("non-finite score {}", score)),
                    Err(e) => Self::failed(scorer.as_ref(), e.to_string()),
                };
                match &outcome {
                    MethodOutcome::Scored(score) => debug!(method = %method, score, "Method scored"),
                    MethodOutcome::Fallback { score, reason } => {
                        warn!(method = %method, score, reason = %reason, "Method failed, using fallback score")
                    }
                    MethodOutcome::Unavailable { reason } => {
                        debug!(method = %method, reason = %reason, "Method unavailable")
                    }
                }
                (method, outcome)
            })
            .collect()
    }

    fn failed(scorer: &dyn Scorer<I>, reason: String) -> MethodOutcome {
        match scorer.fallback() {
            Some(score) => MethodOutcome::Fallback { score, reason },
            None => MethodOutcome::Unavailable { reason },
        }
    }

    /// Fuse already loaded evidence
    pub fn run(&self, input: &I) -> FusionRun {
        let mut stages = vec![FusionStage::Init, FusionStage::ExtractQuality];

        let quality = input.quality().unwrap_or_else(|e| {
            warn!(error = %e, "Quality extraction failed, weighting without it");
            QualityMetadata::default()
        });

        stages.push(FusionStage::RunMethods);
        let outcomes = self.run_methods(input);

        let method_scores: MethodScores = outcomes
            .iter()
            .filter_map(|(method, outcome)| outcome.score().map(|s| (*method, s)))
            .collect();

        if method_scores.is_empty() {
            error!(methods = outcomes.len(), "No detection method produced a score");
            stages.push(FusionStage::ErrorFallback);
            return FusionRun {
                result: DetectionResult::fallback("no detection method produced a score"),
                stages,
            };
        }

        stages.push(FusionStage::ComputeWeights);
        let model_available = self.policy.model_method().map_or(false, |model| {
            outcomes
                .iter()
                .any(|(method, outcome)| *method == model && matches!(outcome, MethodOutcome::Scored(_)))
        });
        let weights = self.policy.compute(model_available, &quality);

        stages.push(FusionStage::Aggregate);
        let confidence = aggregate(&weights, &method_scores);
        let is_fake = confidence >= self.threshold;

        let mut fallbacks = Map::new();
        let mut unavailable = Map::new();
        for (method, outcome) in &outcomes {
            match outcome {
                MethodOutcome::Fallback { reason, .. } => {
                    fallbacks.insert(method.to_string(), Value::String(reason.clone()));
                }
                MethodOutcome::Unavailable { reason } => {
                    unavailable.insert(method.to_string(), Value::String(reason.clone()));
                }
                MethodOutcome::Scored(_) => {}
            }
        }

        let mut details = Map::new();
        details.insert("model_used".to_string(), json!(model_available));
        details.insert("weights".to_string(), json!(weights));
        details.insert("total_weight".to_string(), json!(weights.total()));
        details.insert("threshold".to_string(), json!(self.threshold));
        if !fallbacks.is_empty() {
            details.insert("fallbacks".to_string(), Value::Object(fallbacks));
        }
        if !unavailable.is_empty() {
            details.insert("unavailable".to_string(), Value::Object(unavailable));
        }
        input.describe(&mut details);

        stages.push(FusionStage::Done);
        info!(
            is_fake,
            confidence = format!("{:.3}", confidence),
            methods = method_scores.len(),
            model_used = model_available,
            "Fusion complete"
        );

        FusionRun {
            result: DetectionResult {
                is_fake,
                confidence,
                method_scores,
                quality,
                details,
            },
            stages,
        }
    }

    pub fn fuse(&self, input: &I) -> DetectionResult {
        self.run(input).result
    }
}

impl<I: FusionInput> FusionEngine<I> {
    /// Load evidence and fuse it; a load failure is a fallback result
    pub fn detect<E: Display>(&self, load: impl FnOnce() -> Result<I, E>) -> DetectionResult {
        match load() {
            Ok(input) => self.fuse(&input),
            Err(e) => {
                error!(error = %e, "Detection pipeline failed");
                DetectionResult::fallback(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::FALLBACK_CONFIDENCE;
    use crate::scorers::ScoreError;

    struct Input {
        quality: Option<QualityMetadata>,
    }

    impl FusionInput for Input {
        fn quality(&self) -> anyhow::Result<QualityMetadata> {
            self.quality
                .clone()
                .ok_or_else(|| anyhow::anyhow!("metadata unreadable"))
        }

        fn describe(&self, details: &mut Map<String, Value>) {
            details.insert("kind".to_string(), json!("test"));
        }
    }

    struct Fixed {
        method: DetectionMethod,
        result: Option<f64>,
        fallback: Option<f64>,
    }

    impl Scorer<Input> for Fixed {
        fn method(&self) -> DetectionMethod {
            self.method
        }

        fn score(&self, _: &Input) -> Result<f64, ScoreError> {
            self.result
                .ok_or_else(|| ScoreError::Computation("boom".to_string()))
        }

        fn fallback(&self) -> Option<f64> {
            self.fallback
        }
    }

    fn fixed(method: DetectionMethod, result: Option<f64>, fallback: Option<f64>) -> Fixed {
        Fixed {
            method,
            result,
            fallback,
        }
    }

    fn audio_engine(model: Option<f64>, spectral: Option<f64>, prosody: Option<f64>) -> FusionEngine<Input> {
        FusionEngine::new(WeightingPolicy::audio(), 0.5)
            .with_scorer(fixed(DetectionMethod::LearnedModel, model, None))
            .with_scorer(fixed(DetectionMethod::SpectralAnalysis, spectral, Some(0.5)))
            .with_scorer(fixed(DetectionMethod::ProsodyAnalysis, prosody, Some(0.3)))
    }

    fn clean() -> Input {
        Input {
            quality: Some(QualityMetadata::default()),
        }
    }

    #[test]
    fn test_happy_path_stages_and_weights() {
        let run = audio_engine(Some(0.9), Some(0.4), Some(0.1)).run(&clean());
        assert_eq!(
            run.stages,
            vec![
                FusionStage::Init,
                FusionStage::ExtractQuality,
                FusionStage::RunMethods,
                FusionStage::ComputeWeights,
                FusionStage::Aggregate,
                FusionStage::Done,
            ]
        );
        // 0.6 * 0.9 + 0.24 * 0.4 + 0.16 * 0.1
        let expected = 0.54 + 0.096 + 0.016;
        assert!((run.result.confidence - expected).abs() < 1e-9);
        assert!(run.result.is_fake);
        assert_eq!(run.result.details["model_used"], json!(true));
        assert_eq!(run.result.details["kind"], json!("test"));
    }

    #[test]
    fn test_model_unavailable_gets_zero_weight() {
        let result = audio_engine(None, Some(0.4), Some(0.1)).fuse(&clean());
        assert!(!result.method_scores.contains(DetectionMethod::LearnedModel));
        assert_eq!(result.details["weights"]["learned_model"], json!(0.0));
        assert!(result.details["unavailable"]["learned_model"].is_string());
        assert!((result.confidence - (0.6 * 0.4 + 0.4 * 0.1)).abs() < 1e-9);
        assert!(!result.is_fake);
    }

    #[test]
    fn test_heuristic_failure_uses_fallback_score() {
        let result = audio_engine(None, Some(0.6), None).fuse(&clean());
        assert_eq!(result.method_scores.get(DetectionMethod::ProsodyAnalysis), Some(0.3));
        assert_eq!(result.details["fallbacks"]["prosody_analysis"], json!("Computation failed: boom"));
    }

    #[test]
    fn test_quality_failure_is_not_fatal() {
        let run = audio_engine(None, Some(0.6), Some(0.3)).run(&Input { quality: None });
        assert_eq!(run.stages.last(), Some(&FusionStage::Done));
        assert_eq!(run.result.quality, QualityMetadata::default());
    }

    #[test]
    fn test_no_scores_falls_back() {
        let engine = FusionEngine::new(WeightingPolicy::audio(), 0.5)
            .with_scorer(fixed(DetectionMethod::LearnedModel, None, None));
        let run = engine.run(&clean());
        assert_eq!(run.stages.last(), Some(&FusionStage::ErrorFallback));
        assert_eq!(run.result.confidence, FALLBACK_CONFIDENCE);
        assert!(!run.result.is_fake);
    }

    #[test]
    fn test_load_failure_is_fallback_result() {
        let engine = audio_engine(None, Some(0.6), Some(0.3));
        let result = engine.detect(|| Err::<Input, _>("File not found: /missing.wav"));
        assert!(result.is_fallback());
        assert_eq!(result.error(), Some("File not found: /missing.wav"));
    }

    #[test]
    fn test_aggregate_edge_cases() {
        let zero: WeightVector = [(DetectionMethod::LipSync, 0.0)].into_iter().collect();
        assert_eq!(aggregate(&zero, &MethodScores::new()), NEUTRAL_SCORE);

        // weighted slot without a score reads as neutral
        let weights: WeightVector = [
            (DetectionMethod::LipSync, 1.0),
            (DetectionMethod::BlinkAnalysis, 1.0),
        ]
        .into_iter()
        .collect();
        let scores: MethodScores = [(DetectionMethod::LipSync, 1.0)].into_iter().collect();
        assert!((aggregate(&weights, &scores) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let engine = FusionEngine::new(WeightingPolicy::audio(), 0.5)
            .with_scorer(fixed(DetectionMethod::SpectralAnalysis, Some(0.5), Some(0.5)))
            .with_scorer(fixed(DetectionMethod::ProsodyAnalysis, Some(0.5), Some(0.3)));
        let result = engine.fuse(&clean());
        assert_eq!(result.confidence, 0.5);
        assert!(result.is_fake);
    }
}
