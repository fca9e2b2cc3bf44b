//! Fundamental-frequency tracking
//!
//! Estimators are interchangeable and tried in priority order by
//! [`PitchTracker`]; the first one that can handle the input wins. Every
//! estimator reports voiced frames only.

use super::FeatureError;
use rustfft::{num_complex::Complex, FftPlanner};
use tracing::debug;

/// Lowest fundamental searched (Hz)
pub const PITCH_FMIN: f64 = 50.0;
/// Highest fundamental searched (Hz)
pub const PITCH_FMAX: f64 = 400.0;

/// Frames quieter than this RMS are treated as unvoiced
const VOICING_RMS: f64 = 1e-3;

/// A fundamental-frequency estimator
pub trait PitchEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Voiced f0 values in Hz, one per voiced frame
    fn track(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f64>, FeatureError>;
}

/// Pitch track with the estimator that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct PitchTrack {
    pub f0: Vec<f64>,
    pub estimator: &'static str,
}

/// Prioritized list of pitch estimators
pub struct PitchTracker {
    estimators: Vec<Box<dyn PitchEstimator>>,
}

impl Default for PitchTracker {
    fn default() -> Self {
        Self::new(vec![Box::new(Yin::default()), Box::new(Autocorrelation::default())])
    }
}

impl PitchTracker {
    pub fn new(estimators: Vec<Box<dyn PitchEstimator>>) -> Self {
        Self { estimators }
    }

    /// Run estimators in order, returning the first success
    ///
    /// When every estimator fails the last error is returned.
    pub fn track(&self, samples: &[f32], sample_rate: u32) -> Result<PitchTrack, FeatureError> {
        let mut last_error = FeatureError::Degenerate("no pitch estimator configured".to_string());
        for estimator in &self.estimators {
            match estimator.track(samples, sample_rate) {
                Ok(f0) => {
                    debug!(
                        estimator = estimator.name(),
                        voiced_frames = f0.len(),
                        "Pitch track extracted"
                    );
                    return Ok(PitchTrack {
                        f0,
                        estimator: estimator.name(),
                    });
                }
                Err(e) => {
                    debug!(estimator = estimator.name(), error = %e, "Pitch estimator failed, trying next");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

/// Lag search range in samples: (shortest period, longest period)
fn lag_bounds(sample_rate: u32) -> Result<(usize, usize), FeatureError> {
    let min_lag = (sample_rate as f64 / PITCH_FMAX).floor() as usize;
    let max_lag = (sample_rate as f64 / PITCH_FMIN).ceil() as usize;
    if min_lag < 2 {
        return Err(FeatureError::Degenerate(format!(
            "sample rate {} too low for pitch tracking",
            sample_rate
        )));
    }
    Ok((min_lag, max_lag))
}

fn hop_for(sample_rate: u32) -> usize {
    // 10 ms
    (sample_rate as usize / 100).max(1)
}

fn rms(frame: &[f64]) -> f64 {
    (frame.iter().map(|x| x * x).sum::<f64>() / frame.len().max(1) as f64).sqrt()
}

/// YIN estimator (cumulative mean normalized difference)
///
/// The difference function is computed through an FFT cross-correlation so
/// long inputs stay cheap.
pub struct Yin {
    threshold: f64,
}

impl Default for Yin {
    fn default() -> Self {
        Self { threshold: 0.15 }
    }
}

impl Yin {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl PitchEstimator for Yin {
    fn name(&self) -> &'static str {
        "yin"
    }

    fn track(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f64>, FeatureError> {
        let (min_lag, max_lag) = lag_bounds(sample_rate)?;
        let window = 2 * max_lag;
        let frame_length = window + max_lag;
        if samples.len() < frame_length {
            return Err(FeatureError::TooShort {
                needed: frame_length,
                got: samples.len(),
            });
        }

        let fft_len = (window + frame_length).next_power_of_two();
        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(fft_len);
        let inverse = planner.plan_fft_inverse(fft_len);

        let signal: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        let mut voiced = Vec::new();

        for start in (0..=signal.len() - frame_length).step_by(hop_for(sample_rate)) {
            let frame = &signal[start..start + frame_length];
            if rms(&frame[..window]) < VOICING_RMS {
                continue;
            }

            let mut head: Vec<Complex<f64>> = frame[..window]
                .iter()
                .map(|&x| Complex::new(x, 0.0))
                .collect();
            head.resize(fft_len, Complex::new(0.0, 0.0));
            let mut full: Vec<Complex<f64>> =
                frame.iter().map(|&x| Complex::new(x, 0.0)).collect();
            full.resize(fft_len, Complex::new(0.0, 0.0));

            forward.process(&mut head);
            forward.process(&mut full);
            let mut cross: Vec<Complex<f64>> =
                head.iter().zip(&full).map(|(a, b)| a.conj() * b).collect();
            inverse.process(&mut cross);

            let mut prefix = Vec::with_capacity(frame_length + 1);
            prefix.push(0.0);
            for x in frame {
                let last = prefix[prefix.len() - 1];
                prefix.push(last + x * x);
            }
            let energy_head = prefix[window];

            let mut cmnd = vec![1.0; max_lag + 1];
            let mut running = 0.0;
            for tau in 1..=max_lag {
                let correlation = cross[tau].re / fft_len as f64;
                let energy_lagged = prefix[tau + window] - prefix[tau];
                let diff = (energy_head + energy_lagged - 2.0 * correlation).max(0.0);
                running += diff;
                cmnd[tau] = if running > 0.0 {
                    diff * tau as f64 / running
                } else {
                    1.0
                };
            }

            let Some(mut tau) = (min_lag..=max_lag).find(|&t| cmnd[t] < self.threshold) else {
                continue;
            };
            while tau < max_lag && cmnd[tau + 1] < cmnd[tau] {
                tau += 1;
            }

            let mut period = tau as f64;
            if tau > 1 && tau < max_lag {
                let (prev, cur, next) = (cmnd[tau - 1], cmnd[tau], cmnd[tau + 1]);
                let denom = prev - 2.0 * cur + next;
                if denom.abs() > f64::EPSILON {
                    period += 0.5 * (prev - next) / denom;
                }
            }

            let f0 = sample_rate as f64 / period;
            if (PITCH_FMIN..=PITCH_FMAX).contains(&f0) {
                voiced.push(f0);
            }
        }

        Ok(voiced)
    }
}

/// Normalized autocorrelation peak picking
///
/// Needs a shorter analysis window than YIN, so it still answers for clips
/// YIN rejects.
pub struct Autocorrelation {
    min_correlation: f64,
}

impl Default for Autocorrelation {
    fn default() -> Self {
        Self {
            min_correlation: 0.5,
        }
    }
}

impl PitchEstimator for Autocorrelation {
    fn name(&self) -> &'static str {
        "autocorrelation"
    }

    fn track(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f64>, FeatureError> {
        let (min_lag, max_lag) = lag_bounds(sample_rate)?;
        let window = max_lag;
        let frame_length = window + max_lag;
        if samples.len() < frame_length {
            return Err(FeatureError::TooShort {
                needed: frame_length,
                got: samples.len(),
            });
        }

        let signal: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        let mut voiced = Vec::new();

        for start in (0..=signal.len() - frame_length).step_by(hop_for(sample_rate)) {
            let frame = &signal[start..start + frame_length];
            let head = &frame[..window];
            if rms(head) < VOICING_RMS {
                continue;
            }
            let energy_head: f64 = head.iter().map(|x| x * x).sum();

            let scores: Vec<f64> = (min_lag..=max_lag)
                .map(|tau| {
                    let lagged = &frame[tau..tau + window];
                    let energy_lagged: f64 = lagged.iter().map(|x| x * x).sum();
                    let dot: f64 = head.iter().zip(lagged).map(|(a, b)| a * b).sum();
                    let denom = (energy_head * energy_lagged).sqrt();
                    if denom > 0.0 {
                        dot / denom
                    } else {
                        0.0
                    }
                })
                .collect();

            let best = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if best < self.min_correlation {
                continue;
            }

            // Earliest local peak close to the best avoids octave-down picks
            let index = (1..scores.len().saturating_sub(1))
                .find(|&i| {
                    scores[i] >= 0.9 * best
                        && scores[i] >= scores[i - 1]
                        && scores[i] >= scores[i + 1]
                })
                .or_else(|| scores.iter().position(|&s| s == best));

            if let Some(index) = index {
                let f0 = sample_rate as f64 / (min_lag + index) as f64;
                if (PITCH_FMIN..=PITCH_FMAX).contains(&f0) {
                    voiced.push(f0);
                }
            }
        }

        Ok(voiced)
    }
}
