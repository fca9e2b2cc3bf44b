//! Feature extraction
//!
//! Pure signal-level measurements consumed by the scorers. Nothing in here
//! knows about detection methods or weights.

pub mod face;
pub mod pitch;
pub mod rhythm;
pub mod spectral;

use thiserror::Error;

/// Feature extraction errors
#[derive(Debug, Error)]
pub enum FeatureError {
    /// Input shorter than the extractor's minimum window
    #[error("Input too short: need {needed} samples, got {got}")]
    TooShort { needed: usize, got: usize },

    /// Signal carries no energy to measure
    #[error("Signal is silent")]
    Silent,

    /// Numeric failure (empty spectrum, non-finite intermediate)
    #[error("Degenerate input: {0}")]
    Degenerate(String),
}

/// Median of a slice (mean of the two middle values for even lengths)
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Percentile with linear interpolation between closest ranks
///
/// `p` is in [0, 100]. Matches the usual "linear" definition: rank
/// `p/100 * (n-1)` interpolated between its neighbours.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Pearson correlation coefficient
///
/// Returns `None` when the lengths differ, fewer than two points are given,
/// or either series has zero variance.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let mean_a = mean(a)?;
    let mean_b = mean(b)?;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    let r = cov / denom;
    r.is_finite().then_some(r.clamp(-1.0, 1.0))
}

/// Linearly resample a series onto `len` evenly spaced points
///
/// Endpoints are preserved. An empty input yields an empty output.
pub fn resample_linear(series: &[f64], len: usize) -> Vec<f64> {
    if series.is_empty() || len == 0 {
        return Vec::new();
    }
    if series.len() == 1 || len == 1 {
        return vec![series[0]; len];
    }

    let last = (series.len() - 1) as f64;
    (0..len)
        .map(|i| {
            let pos = i as f64 * last / (len - 1) as f64;
            let lower = pos.floor() as usize;
            let upper = (lower + 1).min(series.len() - 1);
            let frac = pos - lower as f64;
            series[lower] + (series[upper] - series[lower]) * frac
        })
        .collect()
}

/// Symmetric Hann window of `len` points
pub(crate) fn hann_window(len: usize) -> Vec<f32> {
    if len <= 1 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / len as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Slice `samples` into frames of `frame_length` advancing by `hop`
///
/// Input shorter than one frame produces a single zero-padded frame, so
/// every non-empty input yields at least one frame.
pub(crate) fn frames(samples: &[f32], frame_length: usize, hop: usize) -> Vec<Vec<f32>> {
    if samples.is_empty() || frame_length == 0 || hop == 0 {
        return Vec::new();
    }
    if samples.len() <= frame_length {
        let mut frame = samples.to_vec();
        frame.resize(frame_length, 0.0);
        return vec![frame];
    }

    let count = 1 + (samples.len() - frame_length) / hop;
    (0..count)
        .map(|i| samples[i * hop..i * hop + frame_length].to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 100.0), Some(5.0));
        assert_eq!(percentile(&values, 50.0), Some(3.0));
        // rank 0.2 * 4 = 0.8
        assert!((percentile(&values, 20.0).unwrap() - 1.8).abs() < 1e-12);
    }

    #[test]
    fn test_std_dev_population() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std_dev(&values).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_perfect_and_flat() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        let c = [8.0, 6.0, 4.0, 2.0];
        assert!((pearson(&a, &b).unwrap() - 1.0).abs() < 1e-12);
        assert!((pearson(&a, &c).unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(pearson(&a, &[1.0, 1.0, 1.0, 1.0]), None);
        assert_eq!(pearson(&a, &b[..3]), None);
    }

    #[test]
    fn test_resample_linear_preserves_endpoints() {
        let out = resample_linear(&[0.0, 1.0], 5);
        assert_eq!(out, vec![0.0, 0.25, 0.5, 0.75, 1.0]);

        let out = resample_linear(&[0.0, 10.0, 20.0, 30.0], 2);
        assert_eq!(out, vec![0.0, 30.0]);
        assert!(resample_linear(&[], 4).is_empty());
    }

    #[test]
    fn test_frames_pads_short_input() {
        let framed = frames(&[1.0, 2.0], 4, 2);
        assert_eq!(framed, vec![vec![1.0, 2.0, 0.0, 0.0]]);

        let framed = frames(&[0.0; 10], 4, 2);
        assert_eq!(framed.len(), 4);
    }
}
