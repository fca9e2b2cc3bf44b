//! Onset strength and tempo
//!
//! Onset strength is positive spectral flux on a dB spectrogram, averaged
//! over frequency. Tempo is the autocorrelation peak of that envelope,
//! weighted by a log-normal prior around 120 BPM.

use super::{frames, hann_window};
use rustfft::{num_complex::Complex, FftPlanner};

pub const ONSET_FFT_SIZE: usize = 2048;
pub const ONSET_HOP: usize = 512;

/// Prior centre for tempo estimation (BPM)
pub const TEMPO_PRIOR_BPM: f64 = 120.0;

const MIN_BPM: f64 = 30.0;
const MAX_BPM: f64 = 300.0;
/// Prior width in octaves
const PRIOR_OCTAVES: f64 = 1.0;
const AMIN: f64 = 1e-10;
const TOP_DB: f64 = 80.0;

/// Onset-strength envelope, one value per hop
///
/// The first frame has no predecessor and is reported as zero.
pub fn onset_strength(samples: &[f32]) -> Vec<f64> {
    let framed = frames(samples, ONSET_FFT_SIZE, ONSET_HOP);
    if framed.is_empty() {
        return Vec::new();
    }

    let window = hann_window(ONSET_FFT_SIZE);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(ONSET_FFT_SIZE);
    let n_bins = ONSET_FFT_SIZE / 2 + 1;

    let mut spectrogram: Vec<Vec<f64>> = framed
        .iter()
        .map(|frame| {
            let mut buffer: Vec<Complex<f32>> = frame
                .iter()
                .zip(&window)
                .map(|(&s, &w)| Complex::new(s * w, 0.0))
                .collect();
            fft.process(&mut buffer);
            buffer[..n_bins]
                .iter()
                .map(|c| 10.0 * (c.norm_sqr() as f64).max(AMIN).log10())
                .collect()
        })
        .collect();

    let peak = spectrogram
        .iter()
        .flatten()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let floor = peak - TOP_DB;
    for row in &mut spectrogram {
        for value in row.iter_mut() {
            *value = value.max(floor);
        }
    }

    let mut envelope = Vec::with_capacity(spectrogram.len());
    envelope.push(0.0);
    for pair in spectrogram.windows(2) {
        let flux: f64 = pair[1]
            .iter()
            .zip(&pair[0])
            .map(|(cur, prev)| (cur - prev).max(0.0))
            .sum();
        envelope.push(flux / n_bins as f64);
    }
    envelope
}

/// Estimate tempo (BPM) from an onset envelope
///
/// Returns `None` when the envelope is flat or too short to cover the
/// slowest tempo searched.
pub fn estimate_tempo(envelope: &[f64], sample_rate: u32) -> Option<f64> {
    if sample_rate == 0 || envelope.len() < 4 {
        return None;
    }
    if envelope.iter().all(|v| v.abs() <= AMIN) {
        return None;
    }

    let frame_rate = sample_rate as f64 / ONSET_HOP as f64;
    let min_lag = ((60.0 * frame_rate / MAX_BPM).ceil() as usize).max(1);
    let max_lag = ((60.0 * frame_rate / MIN_BPM).floor() as usize).min(envelope.len() - 1);
    if min_lag > max_lag {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    for lag in min_lag..=max_lag {
        let correlation: f64 = envelope
            .iter()
            .zip(&envelope[lag..])
            .map(|(a, b)| a * b)
            .sum();
        let bpm = 60.0 * frame_rate / lag as f64;
        let prior = (-0.5 * ((bpm / TEMPO_PRIOR_BPM).log2() / PRIOR_OCTAVES).powi(2)).exp();
        let weighted = correlation * prior;
        if best.map_or(true, |(_, b)| weighted > b) {
            best = Some((lag, weighted));
        }
    }

    match best {
        Some((lag, weighted)) if weighted > 0.0 => Some(60.0 * frame_rate / lag as f64),
        _ => None,
    }
}

/// Min-max normalized RMS envelope (frame 2048, hop 512)
///
/// A constant signal maps to all zeros rather than dividing by zero.
pub fn rms_envelope(samples: &[f32]) -> Vec<f64> {
    let energies: Vec<f64> = frames(samples, ONSET_FFT_SIZE, ONSET_HOP)
        .iter()
        .map(|frame| {
            let sum: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
            (sum / frame.len() as f64).sqrt()
        })
        .collect();

    let min = energies.iter().copied().fold(f64::INFINITY, f64::min);
    let max = energies.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    energies
        .iter()
        .map(|e| (e - min) / (max - min + 1e-9))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Short clicks every `period` seconds
    fn click_track(sample_rate: u32, seconds: f64, period: f64) -> Vec<f32> {
        let n = (sample_rate as f64 * seconds) as usize;
        let every = (sample_rate as f64 * period) as usize;
        let mut samples = vec![0.0f32; n];
        for start in (0..n).step_by(every) {
            for (i, s) in samples[start..(start + 200).min(n)].iter_mut().enumerate() {
                *s = if i % 2 == 0 { 0.8 } else { -0.8 };
            }
        }
        samples
    }

    #[test]
    fn test_silence_has_flat_envelope_and_no_tempo() {
        let envelope = onset_strength(&vec![0.0; 16_000 * 3]);
        assert!(!envelope.is_empty());
        assert!(envelope.iter().all(|&v| v == 0.0));
        assert_eq!(estimate_tempo(&envelope, 16_000), None);
    }

    #[test]
    fn test_clicks_produce_onsets() {
        let envelope = onset_strength(&click_track(16_000, 4.0, 0.5));
        let max = envelope.iter().copied().fold(0.0, f64::max);
        assert!(max > 1.0);
    }

    #[test]
    fn test_click_tempo_near_120() {
        let envelope = onset_strength(&click_track(16_000, 8.0, 0.5));
        let tempo = estimate_tempo(&envelope, 16_000).unwrap();
        assert!((tempo - 120.0).abs() < 12.0, "tempo {}", tempo);
    }

    #[test]
    fn test_rms_envelope_is_normalized() {
        let mut samples = vec![0.0f32; 16_000];
        samples[8_000..].iter_mut().for_each(|s| *s = 0.5);
        let envelope = rms_envelope(&samples);
        assert!(envelope.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert!(envelope[0] < 1e-6);
        assert!(envelope[envelope.len() - 1] > 0.99);
        assert!(rms_envelope(&[]).is_empty());
    }

    #[test]
    fn test_short_envelope_has_no_tempo() {
        assert_eq!(estimate_tempo(&[0.0, 1.0, 0.0], 16_000), None);
    }
}
