//! Adaptive weighting policy
//!
//! Base weights give the learned model a fixed share when it produced a
//! score and split the rest across heuristics in a fixed ratio. Without the
//! model its weight is exactly zero and the heuristics take all of the mass.
//! Quality damping then multiplies every weight; it is never renormalized,
//! because fusion divides by the damped total.

use super::{DetectionMethod, QualityMetadata};
use serde::Serialize;
use std::collections::BTreeMap;

/// A quality signal that makes every method less trustworthy
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityCondition {
    /// `is_too_short` flag set
    TooShort,
    /// Mean absolute amplitude below the value
    LowMeanAmplitude(f64),
    /// Duration (seconds) below the value
    ShortDuration(f64),
    /// Fewer face frames than the value
    FewFaces(usize),
}

impl QualityCondition {
    /// Whether the condition holds; missing metadata never triggers it
    pub fn holds(&self, quality: &QualityMetadata) -> bool {
        match *self {
            QualityCondition::TooShort => quality.is_too_short.unwrap_or(false),
            QualityCondition::LowMeanAmplitude(min) => {
                quality.mean_amplitude.map_or(false, |a| a < min)
            }
            QualityCondition::ShortDuration(min) => {
                quality.duration_seconds.map_or(false, |d| d < min)
            }
            QualityCondition::FewFaces(min) => quality.face_count.map_or(false, |n| n < min),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DampingRule {
    pub condition: QualityCondition,
    /// In (0, 1]
    pub factor: f64,
}

/// Non-negative weight per method
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WeightVector(BTreeMap<DetectionMethod, f64>);

impl WeightVector {
    pub fn get(&self, method: DetectionMethod) -> f64 {
        self.0.get(&method).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DetectionMethod, f64)> + '_ {
        self.0.iter().map(|(m, w)| (*m, *w))
    }

    fn scale(&mut self, factor: f64) {
        for weight in self.0.values_mut() {
            *weight *= factor;
        }
    }
}

impl FromIterator<(DetectionMethod, f64)> for WeightVector {
    fn from_iter<T: IntoIterator<Item = (DetectionMethod, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(m, w)| (m, w.max(0.0))).collect())
    }
}

/// Base split plus quality damping for one modality
#[derive(Debug, Clone, PartialEq)]
pub struct WeightingPolicy {
    /// The learned method and its share when it produced a score
    model: Option<(DetectionMethod, f64)>,
    /// Heuristic methods and their relative shares
    heuristics: Vec<(DetectionMethod, f64)>,
    damping: Vec<DampingRule>,
}

impl WeightingPolicy {
    pub fn new(
        model: Option<(DetectionMethod, f64)>,
        heuristics: Vec<(DetectionMethod, f64)>,
        damping: Vec<DampingRule>,
    ) -> Self {
        Self {
            model,
            heuristics,
            damping,
        }
    }

    /// Audio: model 0.6, spectral:prosody 0.6:0.4
    pub fn audio() -> Self {
        Self::new(
            Some((DetectionMethod::LearnedModel, 0.6)),
            vec![
                (DetectionMethod::SpectralAnalysis, 0.6),
                (DetectionMethod::ProsodyAnalysis, 0.4),
            ],
            vec![
                DampingRule {
                    condition: QualityCondition::TooShort,
                    factor: 0.7,
                },
                DampingRule {
                    condition: QualityCondition::LowMeanAmplitude(0.05),
                    factor: 0.8,
                },
            ],
        )
    }

    /// Video: frame classifier 0.5, lip-sync:blink 0.6:0.4
    pub fn video() -> Self {
        Self::new(
            Some((DetectionMethod::FacialAnalysis, 0.5)),
            vec![
                (DetectionMethod::LipSync, 0.6),
                (DetectionMethod::BlinkAnalysis, 0.4),
            ],
            vec![
                DampingRule {
                    condition: QualityCondition::ShortDuration(3.0),
                    factor: 0.8,
                },
                DampingRule {
                    condition: QualityCondition::FewFaces(5),
                    factor: 0.7,
                },
            ],
        )
    }

    pub fn model_method(&self) -> Option<DetectionMethod> {
        self.model.map(|(method, _)| method)
    }

    pub fn methods(&self) -> impl Iterator<Item = DetectionMethod> + '_ {
        self.model
            .iter()
            .map(|(m, _)| *m)
            .chain(self.heuristics.iter().map(|(m, _)| *m))
    }

    /// Pre-damping weights; they sum to 1 whenever any heuristic has mass
    pub fn base_weights(&self, model_available: bool) -> WeightVector {
        let model_share = match self.model {
            Some((_, share)) if model_available => share.clamp(0.0, 1.0),
            _ => 0.0,
        };
        let heuristic_total: f64 = self.heuristics.iter().map(|(_, s)| s.max(0.0)).sum();
        let remaining = 1.0 - model_share;

        let model = self.model.map(|(method, _)| (method, model_share));
        let heuristics = self.heuristics.iter().map(|&(method, share)| {
            let weight = if heuristic_total > 0.0 {
                remaining * share.max(0.0) / heuristic_total
            } else {
                0.0
            };
            (method, weight)
        });
        model.into_iter().chain(heuristics).collect()
    }

    /// Product of the factors of every rule that holds
    pub fn damping_factor(&self, quality: &QualityMetadata) -> f64 {
        self.damping
            .iter()
            .filter(|rule| rule.condition.holds(quality))
            .map(|rule| rule.factor.clamp(0.0, 1.0))
            .product()
    }

    pub fn compute(&self, model_available: bool, quality: &QualityMetadata) -> WeightVector {
        let mut weights = self.base_weights(model_available);
        weights.scale(self.damping_factor(quality));
        weights
    }
}
