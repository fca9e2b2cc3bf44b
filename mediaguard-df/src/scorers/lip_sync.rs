//! Lip-sync mismatch score
//!
//! Correlates the mouth-opening series with the audio RMS envelope brought
//! to the same length, over a few frames of lag either way.

use super::{clamp_unit, ScoreError, Scorer};
use crate::detection::video::{AudioTrack, VideoEvidence};
use crate::detection::DetectionMethod;
use crate::features::{pearson, resample_linear};
use tracing::debug;

/// A video without any audio track
pub const NO_AUDIO_SCORE: f64 = 0.6;
/// Shortest series (either side) worth correlating
pub const MIN_SERIES_LEN: usize = 5;
/// Lag search radius in samples (±300 ms at 10 Hz)
pub const MAX_LAG: usize = 3;

#[derive(Debug, Default, Clone, Copy)]
pub struct LipSyncScorer;

/// Best Pearson correlation over lags in `-max_lag..=max_lag`
///
/// `audio` must already be at the cadence of `mouth`. Lags whose overlap has
/// no variance are skipped; if none remain the result is -1.
pub fn best_lagged_correlation(audio: &[f64], mouth: &[f64], max_lag: usize) -> f64 {
    let n = audio.len().min(mouth.len());
    let (audio, mouth) = (&audio[..n], &mouth[..n]);
    let mut best = -1.0f64;

    for lag in -(max_lag as isize)..=(max_lag as isize) {
        let shift = lag.unsigned_abs();
        if shift >= n {
            continue;
        }
        let correlation = if lag < 0 {
            pearson(&audio[..n - shift], &mouth[shift..])
        } else {
            pearson(&audio[shift..], &mouth[..n - shift])
        };
        if let Some(c) = correlation {
            best = best.max(c);
        }
    }
    best
}

/// `1 − (best + 1) / 2`, clamped
pub fn sync_mismatch(audio_envelope: &[f64], mouth: &[f64]) -> Result<f64, ScoreError> {
    if audio_envelope.len() < MIN_SERIES_LEN || mouth.len() < MIN_SERIES_LEN {
        return Err(ScoreError::InsufficientData(format!(
            "audio envelope {} / mouth series {}, need {} each",
            audio_envelope.len(),
            mouth.len(),
            MIN_SERIES_LEN
        )));
    }

    let audio = resample_linear(audio_envelope, mouth.len());
    let best = best_lagged_correlation(&audio, mouth, MAX_LAG);
    debug!(best_correlation = best, samples = mouth.len(), "Lip-sync correlation");
    Ok(clamp_unit(1.0 - (best + 1.0) / 2.0))
}

impl Scorer<VideoEvidence> for LipSyncScorer {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::LipSync
    }

    fn score(&self, evidence: &VideoEvidence) -> Result<f64, ScoreError> {
        match &evidence.audio {
            AudioTrack::Missing => Ok(NO_AUDIO_SCORE),
            AudioTrack::Failed(reason) => Err(ScoreError::Computation(format!(
                "audio track unreadable: {}",
                reason
            ))),
            AudioTrack::Present(envelope) => sync_mismatch(envelope, &evidence.mouth_series),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(len: usize, phase: usize) -> Vec<f64> {
        (0..len)
            .map(|i| ((i + phase) as f64 * 0.7).sin() + 0.3 * ((i + phase) as f64 * 1.9).cos())
            .collect()
    }

    #[test]
    fn test_synchronised_series_have_no_mismatch() {
        let mouth = wave(50, 0);
        let score = sync_mismatch(&mouth, &mouth).unwrap();
        assert!(score.abs() < 1e-9, "score {}", score);
    }

    #[test]
    fn test_small_offset_is_found_by_lag_search() {
        let mouth = wave(60, 0);
        let audio = wave(60, 2);
        assert!(sync_mismatch(&audio, &mouth).unwrap() < 1e-9);
    }

    #[test]
    fn test_flat_series_is_full_mismatch() {
        let mouth = wave(30, 0);
        assert_eq!(sync_mismatch(&[0.5; 30], &mouth).unwrap(), 1.0);
    }

    #[test]
    fn test_short_series() {
        assert!(matches!(
            sync_mismatch(&[0.1, 0.2, 0.3, 0.4], &wave(20, 0)),
            Err(ScoreError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_envelope_is_resampled_to_mouth_cadence() {
        // envelope at 3x the mouth rate, same shape
        let mouth: Vec<f64> = (0..20).map(|i| (i as f64 * 0.5).sin()).collect();
        let audio = resample_linear(&mouth, 58);
        assert!(sync_mismatch(&audio, &mouth).unwrap() < 0.01);
    }
}
