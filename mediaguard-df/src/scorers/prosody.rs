//! Prosody score
//!
//! Three independent penalties, each either fully applied or not:
//! tempo far from a speaking cadence, a flat onset envelope, and a
//! monotone pitch track.

use super::{clamp_unit, ScoreError, Scorer, ANALYSIS_SECONDS};
use crate::detection::DetectionMethod;
use crate::features::pitch::PitchTracker;
use crate::features::rhythm::{estimate_tempo, onset_strength, TEMPO_PRIOR_BPM};
use crate::features::{std_dev, FeatureError};
use crate::media::DecodedAudio;
use tracing::debug;

/// Score used when prosody cannot be measured
pub const PROSODY_FALLBACK: f64 = 0.3;

const TEMPO_PENALTY: f64 = 0.3;
/// Relative deviation from the prior tempo that counts as abnormal
const TEMPO_DEVIATION: f64 = 0.5;
const FLAT_ONSET_PENALTY: f64 = 0.3;
const FLAT_ONSET_STD: f64 = 0.1;
const MONOTONE_PENALTY: f64 = 0.4;
const MONOTONE_PITCH_STD_HZ: f64 = 20.0;
const MIN_VOICED_FRAMES: usize = 10;

pub struct ProsodyScorer {
    pitch: PitchTracker,
}

impl Default for ProsodyScorer {
    fn default() -> Self {
        Self::new(PitchTracker::default())
    }
}

impl ProsodyScorer {
    pub fn new(pitch: PitchTracker) -> Self {
        Self { pitch }
    }
}

/// Measurements the penalties are decided on
#[derive(Debug, Clone, PartialEq)]
pub struct ProsodyMeasurements {
    pub tempo_bpm: Option<f64>,
    pub onset_std: f64,
    /// Voiced f0 values; empty when no estimator produced a track
    pub f0: Vec<f64>,
}

impl ProsodyMeasurements {
    pub fn penalty(&self) -> f64 {
        let mut score = 0.0;

        if let Some(tempo) = self.tempo_bpm {
            if (tempo - TEMPO_PRIOR_BPM).abs() / TEMPO_PRIOR_BPM > TEMPO_DEVIATION {
                score += TEMPO_PENALTY;
            }
        }

        if self.onset_std < FLAT_ONSET_STD {
            score += FLAT_ONSET_PENALTY;
        }

        if self.f0.len() > MIN_VOICED_FRAMES {
            if let Some(pitch_std) = std_dev(&self.f0) {
                if pitch_std < MONOTONE_PITCH_STD_HZ {
                    score += MONOTONE_PENALTY;
                }
            }
        }

        clamp_unit(score)
    }
}

impl Scorer<DecodedAudio> for ProsodyScorer {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::ProsodyAnalysis
    }

    fn score(&self, audio: &DecodedAudio) -> Result<f64, ScoreError> {
        let segment = audio.centered_segment(ANALYSIS_SECONDS);
        if segment.iter().all(|&s| s == 0.0) {
            return Err(FeatureError::Silent.into());
        }

        let envelope = onset_strength(segment);
        let tempo_bpm = estimate_tempo(&envelope, audio.sample_rate);
        let onset_std = std_dev(&envelope).unwrap_or(0.0);

        let f0 = match self.pitch.track(segment, audio.sample_rate) {
            Ok(track) => track.f0,
            Err(e) => {
                debug!(error = %e, "No pitch track, skipping monotone check");
                Vec::new()
            }
        };

        let measurements = ProsodyMeasurements {
            tempo_bpm,
            onset_std,
            f0,
        };
        debug!(
            tempo_bpm = ?measurements.tempo_bpm,
            onset_std = measurements.onset_std,
            voiced_frames = measurements.f0.len(),
            "Prosody measurements"
        );
        Ok(measurements.penalty())
    }

    fn fallback(&self) -> Option<f64> {
        Some(PROSODY_FALLBACK)
    }
}
