//! Spectral-artifact score

use super::{clamp_unit, ScoreError, Scorer, ANALYSIS_SECONDS};
use crate::detection::DetectionMethod;
use crate::features::spectral::{self, SpectralFeatures};
use crate::media::DecodedAudio;
use tracing::debug;

/// Score for clips under one second of audio
pub const SHORT_AUDIO_SCORE: f64 = 0.35;

const ZCR_WEIGHT: f64 = 0.25;
const ZCR_SCALE: f64 = 8.0;
const RMS_WEIGHT: f64 = 0.20;
const CENTROID_WEIGHT: f64 = 0.15;
const BANDWIDTH_WEIGHT: f64 = 0.15;
const CEPSTRAL_WEIGHT: f64 = 0.15;
const CONTRAST_WEIGHT: f64 = 0.10;

const SPEECH_BAND_HZ: (f64, f64) = (100.0, 4000.0);
const SPEECH_CENTRE_HZ: f64 = 2000.0;
const WIDE_BANDWIDTH_HZ: f64 = 4000.0;
const CEPSTRAL_FLOOR: f64 = 100.0;
const CEPSTRAL_SCALE: f64 = 500.0;
const LOW_CONTRAST_DB: f64 = 5.0;

/// Weighted sum of clamped sub-scores over the median spectral features
#[derive(Debug, Default, Clone, Copy)]
pub struct SpectralScorer;

impl Scorer<DecodedAudio> for SpectralScorer {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::SpectralAnalysis
    }

    fn score(&self, audio: &DecodedAudio) -> Result<f64, ScoreError> {
        let segment = audio.centered_segment(ANALYSIS_SECONDS);
        if segment.len() < audio.sample_rate as usize {
            debug!(samples = segment.len(), "Audio under one second, spectral score fixed");
            return Ok(SHORT_AUDIO_SCORE);
        }

        let features = spectral::extract(segment, audio.sample_rate)?;
        debug!(
            rms = features.rms,
            zcr = features.zcr,
            centroid = features.centroid,
            bandwidth = features.bandwidth,
            contrast = features.contrast,
            c0 = features.mfcc[0],
            "Spectral features"
        );
        Ok(artifact_score(&features))
    }
}

/// Combine sub-scores; the weights sum to 1
pub fn artifact_score(features: &SpectralFeatures) -> f64 {
    let zcr = clamp_unit(features.zcr * ZCR_SCALE);
    let rms = clamp_unit((0.5 - features.rms).max(0.0) * 2.0);

    let centroid = if features.centroid < SPEECH_BAND_HZ.0 || features.centroid > SPEECH_BAND_HZ.1 {
        clamp_unit((features.centroid - SPEECH_CENTRE_HZ).abs() / SPEECH_CENTRE_HZ)
    } else {
        0.0
    };

    let bandwidth = if features.bandwidth > WIDE_BANDWIDTH_HZ {
        clamp_unit((features.bandwidth - SPEECH_CENTRE_HZ) / 3000.0)
    } else {
        0.0
    };

    // c0 tracks overall log energy; far from zero means unusually loud or quiet
    let c0 = features.mfcc[0].abs();
    let cepstral = if c0 > CEPSTRAL_FLOOR {
        clamp_unit(c0 / CEPSTRAL_SCALE)
    } else {
        0.0
    };

    let contrast = clamp_unit((LOW_CONTRAST_DB - features.contrast).max(0.0) / LOW_CONTRAST_DB);

    clamp_unit(
        ZCR_WEIGHT * zcr
            + RMS_WEIGHT * rms
            + CENTROID_WEIGHT * centroid
            + BANDWIDTH_WEIGHT * bandwidth
            + CEPSTRAL_WEIGHT * cepstral
            + CONTRAST_WEIGHT * contrast,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> SpectralFeatures {
        SpectralFeatures {
            rms: 0.5,
            zcr: 0.0,
            centroid: 2000.0,
            bandwidth: 2000.0,
            rolloff: 3000.0,
            contrast: 10.0,
            mfcc: [0.0; 5],
        }
    }

    #[test]
    fn test_clean_speech_like_features_score_zero() {
        assert_eq!(artifact_score(&features()), 0.0);
    }

    #[test]
    fn test_every_sub_score_saturates_to_one() {
        let worst = SpectralFeatures {
            rms: 0.0,
            zcr: 1.0,
            centroid: 8000.0,
            bandwidth: 9000.0,
            rolloff: 7000.0,
            contrast: 0.0,
            mfcc: [-900.0, 0.0, 0.0, 0.0, 0.0],
        };
        assert!((artifact_score(&worst) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sub_score_thresholds() {
        let mut f = features();
        f.centroid = 3999.0;
        f.bandwidth = 4000.0;
        f.mfcc[0] = 100.0;
        assert_eq!(artifact_score(&f), 0.0);

        f.centroid = 50.0;
        assert!((artifact_score(&f) - 0.15 * 0.975).abs() < 1e-12);
    }

    #[test]
    fn test_silence_scores_point_six() {
        let audio = DecodedAudio::from_samples(vec![0.0; 16_000 * 5], 16_000);
        let score = SpectralScorer.score(&audio).unwrap();
        // rms 0.20 + centroid 0.15 + c0 0.15 + contrast 0.10
        assert!((score - 0.6).abs() < 1e-9, "score {}", score);
    }

    #[test]
    fn test_one_second_boundary() {
        let exact = DecodedAudio::from_samples(vec![0.0; 16_000], 16_000);
        assert!((SpectralScorer.score(&exact).unwrap() - 0.6).abs() < 1e-9);

        let short = DecodedAudio::from_samples(vec![0.0; 15_984], 16_000);
        assert_eq!(SpectralScorer.score(&short).unwrap(), SHORT_AUDIO_SCORE);
    }

    #[test]
    fn test_deterministic() {
        let samples: Vec<f32> = (0..32_000)
            .map(|i| ((i as f32 * 0.07).sin() * 0.4 + (i as f32 * 0.31).cos() * 0.2))
            .collect();
        let audio = DecodedAudio::from_samples(samples, 16_000);
        let a = SpectralScorer.score(&audio).unwrap();
        let b = SpectralScorer.score(&audio).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
        assert!((0.0..=1.0).contains(&a));
    }
}
