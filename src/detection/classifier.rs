use rten::Model;
use rten_tensor::prelude::*;
use rten_tensor::{NdTensor, Tensor};
use std::path::{Path, PathBuf};

use crate::config::TensorLayout;
use crate::detection::preprocessing::GrayF32;
use crate::error::{Result, ScoringError};
use crate::models::NUM_CLASSES;

/// A pretrained digit classifier.
///
/// `predict` receives a square patch normalized to [0, 1] (white = 1) and
/// returns one probability per class: digits 0-9 followed by "garbage".
pub trait DigitModel: Send + Sync {
    fn predict(&self, patch: &GrayF32) -> Result<[f32; NUM_CLASSES]>;
}

/// Digit classifier backed by an `.rten` model file
pub struct RtenDigitModel {
    model: Model,
    layout: TensorLayout,
}

impl RtenDigitModel {
    /// Load the model once; it is shared by every scoring run
    pub fn load(path: &Path, layout: TensorLayout) -> Result<Self> {
        if !path.exists() {
            return Err(ScoringError::ModelLoad {
                path: path.display().to_string(),
                reason: "file not found".into(),
            });
        }
        let model = Model::load_file(path).map_err(|e| ScoringError::ModelLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { model, layout })
    }

    /// `$HOME/.cache/clockscore/digits.rten`
    pub fn default_path() -> Result<PathBuf> {
        let home_dir = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| ScoringError::Config("neither HOME nor USERPROFILE is set".into()))?;
        Ok(Path::new(&home_dir).join(".cache/clockscore/digits.rten"))
    }
}

impl DigitModel for RtenDigitModel {
    fn predict(&self, patch: &GrayF32) -> Result<[f32; NUM_CLASSES]> {
        let (w, h) = (patch.width() as usize, patch.height() as usize);
        let shape = match self.layout {
            TensorLayout::Nhwc => [1, h, w, 1],
            TensorLayout::Nchw => [1, 1, h, w],
        };
        let input = NdTensor::from_data(shape, patch.as_raw().clone());

        let output = self
            .model
            .run_one(input.view().into(), None)
            .map_err(|e| ScoringError::ClassifierInference(e.to_string()))?;
        let probs: Tensor<f32> = output
            .try_into()
            .map_err(|e| ScoringError::ClassifierInference(format!("unexpected output: {}", e)))?;

        let values: Vec<f32> = probs.iter().copied().collect();
        to_distribution(&values)
    }
}

/// Check a raw model output has one finite, non-negative value per class
pub fn to_distribution(values: &[f32]) -> Result<[f32; NUM_CLASSES]> {
    let probs: [f32; NUM_CLASSES] = values.try_into().map_err(|_| {
        ScoringError::ClassifierInference(format!(
            "expected {} class scores, got {}",
            NUM_CLASSES,
            values.len()
        ))
    })?;
    if probs.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(ScoringError::ClassifierInference(
            "class scores must be finite and non-negative".into(),
        ));
    }
    Ok(probs)
}
