//! Short-time spectral statistics
//!
//! Every measurement is taken per frame (Hann window, fixed frame/hop) and
//! reduced across frames with the median, so a handful of transient frames
//! cannot drag the summary.

use super::{frames, hann_window, median, FeatureError};
use rustfft::{num_complex::Complex, FftPlanner};
use tracing::debug;

/// Analysis frame length (samples)
pub const FRAME_LENGTH: usize = 1024;
/// Hop between frames (samples)
pub const HOP_LENGTH: usize = 256;
/// Number of cepstral coefficients reported
pub const REPORTED_MFCC: usize = 5;

const N_MELS: usize = 40;
const N_MFCC: usize = 13;
const ROLLOFF_PERCENT: f64 = 0.85;
const CONTRAST_LOW_HZ: f64 = 200.0;
const CONTRAST_BANDS: usize = 6;
const CONTRAST_QUANTILE: f64 = 0.02;
const AMIN: f64 = 1e-10;
const TOP_DB: f64 = 80.0;

/// Median-reduced spectral feature set
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralFeatures {
    pub rms: f64,
    pub zcr: f64,
    /// Hz
    pub centroid: f64,
    /// Hz
    pub bandwidth: f64,
    /// Hz
    pub rolloff: f64,
    /// dB, peak-to-valley across octave bands
    pub contrast: f64,
    /// First cepstral coefficients (c0 first)
    pub mfcc: [f64; REPORTED_MFCC],
}

/// Extract the spectral feature set from mono samples
pub fn extract(samples: &[f32], sample_rate: u32) -> Result<SpectralFeatures, FeatureError> {
    if samples.is_empty() {
        return Err(FeatureError::TooShort {
            needed: 1,
            got: 0,
        });
    }
    if sample_rate == 0 {
        return Err(FeatureError::Degenerate("sample rate is zero".to_string()));
    }

    let framed = frames(samples, FRAME_LENGTH, HOP_LENGTH);
    let window = hann_window(FRAME_LENGTH);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FRAME_LENGTH);

    let n_bins = FRAME_LENGTH / 2 + 1;
    let bin_hz = sample_rate as f64 / FRAME_LENGTH as f64;
    let freqs: Vec<f64> = (0..n_bins).map(|k| k as f64 * bin_hz).collect();
    let mel_bank = mel_filterbank(sample_rate, n_bins);
    let band_edges = contrast_band_edges(sample_rate);

    let mut rms = Vec::with_capacity(framed.len());
    let mut zcr = Vec::with_capacity(framed.len());
    let mut centroid = Vec::with_capacity(framed.len());
    let mut bandwidth = Vec::with_capacity(framed.len());
    let mut rolloff = Vec::with_capacity(framed.len());
    let mut contrast = Vec::new();
    let mut log_mel: Vec<Vec<f64>> = Vec::with_capacity(framed.len());

    for frame in &framed {
        rms.push(frame_rms(frame));
        zcr.push(zero_crossing_rate(frame));

        let mut buffer: Vec<Complex<f32>> = frame
            .iter()
            .zip(&window)
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        fft.process(&mut buffer);
        let magnitude: Vec<f64> = buffer[..n_bins].iter().map(|c| c.norm() as f64).collect();

        let (c, b, r) = centroid_bandwidth_rolloff(&magnitude, &freqs);
        centroid.push(c);
        bandwidth.push(b);
        rolloff.push(r);

        contrast.extend(band_contrast(&magnitude, &freqs, &band_edges));

        let power: Vec<f64> = magnitude.iter().map(|m| m * m).collect();
        log_mel.push(
            mel_bank
                .iter()
                .map(|filter| {
                    let energy: f64 = filter.iter().zip(&power).map(|(w, p)| w * p).sum();
                    10.0 * energy.max(AMIN).log10()
                })
                .collect(),
        );
    }

    // Dynamic range is clamped over the whole spectrogram, not per frame
    let peak_db = log_mel
        .iter()
        .flatten()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let floor_db = peak_db - TOP_DB;

    let mut cepstra: [Vec<f64>; REPORTED_MFCC] = Default::default();
    for bands in &mut log_mel {
        for value in bands.iter_mut() {
            *value = value.max(floor_db);
        }
        let coeffs = dct_ortho(bands, N_MFCC);
        for (i, track) in cepstra.iter_mut().enumerate() {
            track.push(coeffs[i]);
        }
    }

    let reduce = |values: &[f64]| median(values).unwrap_or(0.0);
    let mut mfcc = [0.0; REPORTED_MFCC];
    for (slot, track) in mfcc.iter_mut().zip(&cepstra) {
        *slot = reduce(track);
    }

    let features = SpectralFeatures {
        rms: reduce(&rms),
        zcr: reduce(&zcr),
        centroid: reduce(&centroid),
        bandwidth: reduce(&bandwidth),
        rolloff: reduce(&rolloff),
        contrast: reduce(&contrast),
        mfcc,
    };

    debug!(
        frames = framed.len(),
        rms = features.rms,
        zcr = features.zcr,
        centroid = features.centroid,
        bandwidth = features.bandwidth,
        contrast = features.contrast,
        mfcc1 = features.mfcc[0],
        "Spectral features extracted"
    );

    Ok(features)
}

fn frame_rms(frame: &[f32]) -> f64 {
    let energy: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (energy / frame.len() as f64).sqrt()
}

/// Fraction of adjacent sample pairs whose sign differs
fn zero_crossing_rate(frame: &[f32]) -> f64 {
    let crossings = frame
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f64 / frame.len() as f64
}

/// Magnitude-weighted centroid, spread around it, and the 85% energy rolloff
///
/// A frame with no energy reports zero for all three.
fn centroid_bandwidth_rolloff(magnitude: &[f64], freqs: &[f64]) -> (f64, f64, f64) {
    let total: f64 = magnitude.iter().sum();
    if total <= AMIN {
        return (0.0, 0.0, 0.0);
    }

    let centroid = magnitude
        .iter()
        .zip(freqs)
        .map(|(m, f)| m * f)
        .sum::<f64>()
        / total;

    let spread = magnitude
        .iter()
        .zip(freqs)
        .map(|(m, f)| m * (f - centroid).powi(2))
        .sum::<f64>()
        / total;

    let target = ROLLOFF_PERCENT * total;
    let mut cumulative = 0.0;
    let mut rolloff = freqs.last().copied().unwrap_or(0.0);
    for (m, f) in magnitude.iter().zip(freqs) {
        cumulative += m;
        if cumulative >= target {
            rolloff = *f;
            break;
        }
    }

    (centroid, spread.sqrt(), rolloff)
}

/// Octave band edges starting at 200 Hz, last band closed at Nyquist
fn contrast_band_edges(sample_rate: u32) -> Vec<f64> {
    let nyquist = sample_rate as f64 / 2.0;
    let mut edges = vec![0.0];
    for i in 0..CONTRAST_BANDS {
        let edge = CONTRAST_LOW_HZ * 2f64.powi(i as i32);
        if edge >= nyquist {
            break;
        }
        edges.push(edge);
    }
    edges.push(nyquist);
    edges
}

/// Peak-minus-valley (dB) per band for one frame
fn band_contrast(magnitude: &[f64], freqs: &[f64], edges: &[f64]) -> Vec<f64> {
    let last_band = edges.len().saturating_sub(2);
    edges
        .windows(2)
        .enumerate()
        .filter_map(|(band, bounds)| {
            let (lo, hi) = (bounds[0], bounds[1]);
            let mut values: Vec<f64> = magnitude
                .iter()
                .zip(freqs)
                .filter(|&(_, &f)| f >= lo && (f < hi || (band == last_band && f <= hi)))
                .map(|(m, _)| *m)
                .collect();
            if values.is_empty() {
                return None;
            }
            values.sort_by(|a, b| a.total_cmp(b));

            let idx = ((CONTRAST_QUANTILE * values.len() as f64).round() as usize).max(1);
            let valley = values[..idx].iter().sum::<f64>() / idx as f64;
            let peak = values[values.len() - idx..].iter().sum::<f64>() / idx as f64;
            Some(10.0 * peak.max(AMIN).log10() - 10.0 * valley.max(AMIN).log10())
        })
        .collect()
}

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filters with area normalisation, one row per filter
fn mel_filterbank(sample_rate: u32, n_bins: usize) -> Vec<Vec<f64>> {
    let nyquist = sample_rate as f64 / 2.0;
    let max_mel = hz_to_mel(nyquist);
    let points: Vec<f64> = (0..N_MELS + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (N_MELS + 1) as f64))
        .collect();
    let bin_hz = sample_rate as f64 / FRAME_LENGTH as f64;

    (0..N_MELS)
        .map(|m| {
            let (left, center, right) = (points[m], points[m + 1], points[m + 2]);
            let norm = 2.0 / (right - left);
            (0..n_bins)
                .map(|k| {
                    let f = k as f64 * bin_hz;
                    let rising = (f - left) / (center - left);
                    let falling = (right - f) / (right - center);
                    rising.min(falling).max(0.0) * norm
                })
                .collect()
        })
        .collect()
}

/// Orthonormal DCT-II, first `n_out` coefficients
fn dct_ortho(input: &[f64], n_out: usize) -> Vec<f64> {
    let n = input.len() as f64;
    (0..n_out)
        .map(|k| {
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, x)| {
                    x * (std::f64::consts::PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos()
                })
                .sum();
            let scale = if k == 0 {
                (1.0 / n).sqrt()
            } else {
                (2.0 / n).sqrt()
            };
            sum * scale
        })
        .collect()
}
