//! JSON logistic probe
//!
//! The built-in artifact format: `{"name": "...", "bias": b, "weights": [...]}`.
//! Each batch item is mean-pooled into `weights.len()` equal buckets and the
//! logit is `bias + Σ wᵢ·poolᵢ`.

use super::{LearnedModel, ModelError, ModelInput, ModelLoader};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearProbe {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub bias: f32,
    pub weights: Vec<f32>,
}

fn default_name() -> String {
    "linear-probe".to_string()
}

impl LinearProbe {
    pub fn new(name: impl Into<String>, bias: f32, weights: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            bias,
            weights,
        }
    }

    /// Parse and validate a probe from JSON text
    pub fn from_json(text: &str) -> Result<Self, ModelError> {
        let probe: Self = serde_json::from_str(text).map_err(|e| ModelError::Load(e.to_string()))?;
        if probe.weights.is_empty() {
            return Err(ModelError::Load("probe has no weights".to_string()));
        }
        if !probe.bias.is_finite() || probe.weights.iter().any(|w| !w.is_finite()) {
            return Err(ModelError::Load("probe has non-finite parameters".to_string()));
        }
        Ok(probe)
    }

    /// Mean of each of `buckets` contiguous slices of `values`
    fn pool(values: &[f32], buckets: usize) -> Vec<f32> {
        (0..buckets)
            .map(|b| {
                let start = b * values.len() / buckets;
                let end = ((b + 1) * values.len() / buckets).max(start + 1).min(values.len());
                let slice = &values[start.min(end)..end];
                if slice.is_empty() {
                    0.0
                } else {
                    slice.iter().sum::<f32>() / slice.len() as f32
                }
            })
            .collect()
    }
}

impl LearnedModel for LinearProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&self, input: &ModelInput) -> Result<Vec<f32>, ModelError> {
        let buckets = self.weights.len();
        (0..input.batch_size())
            .map(|i| {
                let item = input
                    .item(i)
                    .ok_or_else(|| ModelError::Shape(format!("missing batch item {}", i)))?;
                if item.len() < buckets {
                    return Err(ModelError::Shape(format!(
                        "item has {} values, probe needs at least {}",
                        item.len(),
                        buckets
                    )));
                }
                let pooled = Self::pool(item, buckets);
                let logit = self.bias + pooled.iter().zip(&self.weights).map(|(x, w)| x * w).sum::<f32>();
                if logit.is_finite() {
                    Ok(logit)
                } else {
                    Err(ModelError::Inference("non-finite logit".to_string()))
                }
            })
            .collect()
    }
}

/// Loads [`LinearProbe`] JSON artifacts
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearProbeLoader;

impl ModelLoader for LinearProbeLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn LearnedModel>, ModelError> {
        if !path.is_file() {
            return Err(ModelError::ArtifactMissing(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|e| ModelError::Load(e.to_string()))?;
        let probe = LinearProbe::from_json(&text)?;
        info!(
            path = %path.display(),
            model = %probe.name,
            inputs = probe.weights.len(),
            "Loaded linear probe"
        );
        Ok(Arc::new(probe))
    }
}
