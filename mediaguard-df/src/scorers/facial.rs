//! Facial frame-classifier score
//!
//! Each face crop is classified on its own. A crop the model fails on is
//! skipped; the method fails only when no crop scores. The median frame
//! probability is pulled toward neutral by a reliability factor that reaches
//! 1 at ten scored frames.

use super::{clamp_unit, ScoreError, Scorer};
use crate::detection::video::VideoEvidence;
use crate::detection::{DetectionMethod, NEUTRAL_SCORE};
use crate::features::face::FaceCrop;
use crate::features::median;
use crate::model::{sigmoid, LearnedModel, ModelHandle, ModelInput};
use std::sync::Arc;
use tracing::{debug, warn};

/// Score when no classifier or no face is available
pub const NO_MODEL_SCORE: f64 = 0.35;
/// Scored frames needed for full reliability
pub const RELIABLE_FRAME_COUNT: usize = 10;

pub struct FacialScorer {
    handle: Arc<ModelHandle>,
}

impl FacialScorer {
    pub fn new(handle: Arc<ModelHandle>) -> Self {
        Self { handle }
    }
}

/// Frame outputs already in [0, 1] are probabilities; anything else is a logit
pub fn frame_probability(output: f64) -> f64 {
    if (0.0..=1.0).contains(&output) {
        output
    } else {
        clamp_unit(sigmoid(output))
    }
}

/// Median probability shrunk toward 0.5 by `min(1, n / 10)`
pub fn reliability_weighted(frame_scores: &[f64]) -> Option<f64> {
    let m = median(frame_scores)?;
    let reliability = (frame_scores.len() as f64 / RELIABLE_FRAME_COUNT as f64).min(1.0);
    Some(clamp_unit(NEUTRAL_SCORE + (m - NEUTRAL_SCORE) * reliability))
}

fn classify(model: &dyn LearnedModel, crop: &FaceCrop) -> Result<f64, ScoreError> {
    let size = crop.size as usize;
    let input = ModelInput::new(vec![1, 3, size, size], crop.to_chw())?;
    let output = model
        .infer(&input)?
        .first()
        .copied()
        .ok_or_else(|| ScoreError::Computation("model returned no output".to_string()))?;
    Ok(frame_probability(output as f64))
}

impl Scorer<VideoEvidence> for FacialScorer {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::FacialAnalysis
    }

    fn score(&self, evidence: &VideoEvidence) -> Result<f64, ScoreError> {
        let model = self.handle.require()?;
        if evidence.face_crops.is_empty() {
            return Err(ScoreError::InsufficientData("no face crops".to_string()));
        }

        let mut frame_scores = Vec::with_capacity(evidence.face_crops.len());
        let mut last_error = None;
        for (index, crop) in evidence.face_crops.iter().enumerate() {
            match classify(model.as_ref(), crop) {
                Ok(probability) => frame_scores.push(probability),
                Err(e) => {
                    warn!(crop = index, model = model.name(), error = %e, "Face crop inference failed, skipping");
                    last_error = Some(e);
                }
            }
        }

        let Some(score) = reliability_weighted(&frame_scores) else {
            return Err(last_error
                .unwrap_or_else(|| ScoreError::Computation("no frame scores".to_string())));
        };
        debug!(
            frames = frame_scores.len(),
            skipped = evidence.face_crops.len() - frame_scores.len(),
            score,
            "Facial frames scored"
        );
        Ok(score)
    }

    fn fallback(&self) -> Option<f64> {
        Some(NO_MODEL_SCORE)
    }
}
