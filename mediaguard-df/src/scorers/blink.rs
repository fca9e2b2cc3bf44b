//! Blink-abnormality score

use super::{clamp_unit, ScoreError, Scorer};
use crate::detection::video::VideoEvidence;
use crate::detection::DetectionMethod;
use crate::features::face::{blink_statistics, BlinkStatistics};
use tracing::debug;

/// Score when too few EAR samples were collected
pub const FEW_SAMPLES_SCORE: f64 = 0.6;
pub const MIN_EAR_SAMPLES: usize = 10;

const LOW_RATE_PER_MINUTE: f64 = 4.0;
const LOW_RATE_PENALTY: f64 = 0.4;
const HIGH_RATE_PER_MINUTE: f64 = 30.0;
const HIGH_RATE_PENALTY: f64 = 0.3;
const FLAT_EAR_STD: f64 = 0.01;
const FLAT_EAR_PENALTY: f64 = 0.3;

#[derive(Debug, Default, Clone, Copy)]
pub struct BlinkScorer;

/// Penalties for a blink rate outside the human range and for static eyes
pub fn blink_abnormality(stats: &BlinkStatistics) -> f64 {
    let mut score = 0.0;
    if stats.rate_per_minute < LOW_RATE_PER_MINUTE {
        score += LOW_RATE_PENALTY;
    }
    if stats.rate_per_minute > HIGH_RATE_PER_MINUTE {
        score += HIGH_RATE_PENALTY;
    }
    if stats.ear_std < FLAT_EAR_STD {
        score += FLAT_EAR_PENALTY;
    }
    clamp_unit(score)
}

/// Abnormality of an EAR series sampled at `sample_fps`
pub fn score_ear_series(ear: &[f64], sample_fps: f64) -> Result<f64, ScoreError> {
    if ear.len() < MIN_EAR_SAMPLES {
        return Err(ScoreError::InsufficientData(format!(
            "{} EAR samples, need {}",
            ear.len(),
            MIN_EAR_SAMPLES
        )));
    }
    let stats = blink_statistics(ear, sample_fps)
        .ok_or_else(|| ScoreError::Computation(format!("invalid sample rate {}", sample_fps)))?;
    debug!(
        blinks = stats.blinks,
        rate_per_minute = stats.rate_per_minute,
        threshold = stats.threshold,
        ear_std = stats.ear_std,
        "Blink statistics"
    );
    Ok(blink_abnormality(&stats))
}

impl Scorer<VideoEvidence> for BlinkScorer {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::BlinkAnalysis
    }

    fn score(&self, evidence: &VideoEvidence) -> Result<f64, ScoreError> {
        score_ear_series(&evidence.ear_series, evidence.sample_fps)
    }

    fn fallback(&self) -> Option<f64> {
        Some(FEW_SAMPLES_SCORE)
    }
}
