//! Per-method scorers
//!
//! A scorer turns one modality's evidence into a suspicion score in [0, 1]
//! (higher = more likely synthetic). Scorers return `Err` instead of guessing;
//! the fusion engine decides what an error means through [`Scorer::fallback`].

pub mod blink;
pub mod facial;
pub mod learned;
pub mod lip_sync;
pub mod prosody;
pub mod spectral;

pub use blink::BlinkScorer;
pub use facial::FacialScorer;
pub use learned::LearnedModelScorer;
pub use lip_sync::LipSyncScorer;
pub use prosody::ProsodyScorer;
pub use spectral::SpectralScorer;

use crate::detection::{DetectionMethod, NEUTRAL_SCORE};
use crate::features::FeatureError;
use crate::media::MediaError;
use crate::model::ModelError;
use thiserror::Error;

/// Centered span of audio the heuristic scorers look at
pub const ANALYSIS_SECONDS: f64 = 30.0;

/// Why a scorer could not produce a score
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Computation failed: {0}")]
    Computation(String),
}

/// One detection method over evidence of type `I`
pub trait Scorer<I: ?Sized>: Send + Sync {
    fn method(&self) -> DetectionMethod;

    fn score(&self, input: &I) -> Result<f64, ScoreError>;

    /// Score substituted when [`score`](Self::score) fails
    ///
    /// `None` marks the method unavailable instead.
    fn fallback(&self) -> Option<f64> {
        Some(NEUTRAL_SCORE)
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
