//! Learned audio classifier score

use super::{ScoreError, Scorer};
use crate::detection::DetectionMethod;
use crate::media::DecodedAudio;
use crate::model::{sigmoid, ModelHandle, ModelInput};
use std::sync::Arc;
use tracing::debug;

/// Runs the waveform through the shared model; unavailable without one
pub struct LearnedModelScorer {
    handle: Arc<ModelHandle>,
}

impl LearnedModelScorer {
    pub fn new(handle: Arc<ModelHandle>) -> Self {
        Self { handle }
    }
}

impl Scorer<DecodedAudio> for LearnedModelScorer {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::LearnedModel
    }

    fn score(&self, audio: &DecodedAudio) -> Result<f64, ScoreError> {
        let model = self.handle.require()?;
        let input = ModelInput::waveform(&audio.samples)?;
        let logits = model.infer(&input)?;
        let logit = logits
            .first()
            .copied()
            .ok_or_else(|| ScoreError::Computation("model returned no logits".to_string()))?;

        let probability = sigmoid(logit as f64);
        debug!(model = model.name(), logit, probability, "Audio model scored");
        Ok(probability)
    }

    fn fallback(&self) -> Option<f64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinearProbe, ModelError};

    #[test]
    fn test_logit_goes_through_sigmoid() {
        let probe = LinearProbe::new("test", 0.0, vec![4.0]);
        let scorer = LearnedModelScorer::new(Arc::new(ModelHandle::preloaded(Arc::new(probe))));
        let audio = DecodedAudio::from_samples(vec![0.5; 1_000], 16_000);

        // logit 2.0
        let score = scorer.score(&audio).unwrap();
        assert!((score - sigmoid(2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_no_model_is_unavailable() {
        let scorer = LearnedModelScorer::new(Arc::new(ModelHandle::disabled()));
        let audio = DecodedAudio::from_samples(vec![0.5; 1_000], 16_000);

        assert!(matches!(
            scorer.score(&audio),
            Err(ScoreError::Model(ModelError::NotConfigured))
        ));
        assert_eq!(scorer.fallback(), None);
    }
}
