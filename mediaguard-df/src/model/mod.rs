//! Learned-model collaborator
//!
//! The detectors never depend on a particular inference runtime. A model is
//! anything that maps a shaped float tensor to a small logit vector, and a
//! loader turns an artifact path into such a model.

pub mod handle;
pub mod linear_probe;

pub use handle::{ModelHandle, ModelStatus};
pub use linear_probe::{LinearProbe, LinearProbeLoader};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Model errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// No artifact path configured for this detector
    #[error("No model configured")]
    NotConfigured,

    #[error("Model artifact not found: {0}")]
    ArtifactMissing(PathBuf),

    /// Artifact exists but could not be loaded
    #[error("Model load failed: {0}")]
    Load(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    /// Input tensor does not match what the model accepts
    #[error("Shape mismatch: {0}")]
    Shape(String),
}

/// Dense row-major float tensor
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl ModelInput {
    /// # Errors
    /// `ModelError::Shape` when the element count does not match `shape`
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, ModelError> {
        let expected: usize = shape.iter().product();
        if shape.is_empty() || expected != data.len() {
            return Err(ModelError::Shape(format!(
                "shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Batch of one mono waveform: `[1, T]`
    pub fn waveform(samples: &[f32]) -> Result<Self, ModelError> {
        Self::new(vec![1, samples.len()], samples.to_vec())
    }

    /// Leading dimension for rank >= 2, else 1
    pub fn batch_size(&self) -> usize {
        if self.shape.len() >= 2 {
            self.shape[0]
        } else {
            1
        }
    }

    /// Row-major values of batch item `index`
    pub fn item(&self, index: usize) -> Option<&[f32]> {
        let batch = self.batch_size();
        if batch == 0 || index >= batch {
            return None;
        }
        let stride = self.data.len() / batch;
        self.data.get(index * stride..(index + 1) * stride)
    }
}

/// A trained classifier producing logits
pub trait LearnedModel: Send + Sync {
    fn name(&self) -> &str;

    /// Logits, one per batch item for binary classifiers
    fn infer(&self, input: &ModelInput) -> Result<Vec<f32>, ModelError>;
}

/// Loads a model artifact from disk
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn LearnedModel>, ModelError>;
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_input_shape_checked() {
        assert!(ModelInput::new(vec![2, 3], vec![0.0; 6]).is_ok());
        assert!(matches!(
            ModelInput::new(vec![2, 3], vec![0.0; 5]),
            Err(ModelError::Shape(_))
        ));
        assert!(ModelInput::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_batch_items() {
        let input = ModelInput::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(input.batch_size(), 2);
        assert_eq!(input.item(1), Some(&[3.0, 4.0][..]));
        assert_eq!(input.item(2), None);

        let flat = ModelInput::new(vec![3], vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(flat.batch_size(), 1);
        assert_eq!(flat.item(0).map(|v| v.len()), Some(3));
    }

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) > 0.9999);
        assert!(sigmoid(-10.0) < 0.0001);
    }
}
