use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, ScoringError};

/// Scoring policy: every threshold the pipeline applies.
///
/// The defaults are the fixed clinical policy. A JSON file can override
/// individual fields for experiments; anything omitted keeps its default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub preprocess: PreprocessConfig,
    pub face: FaceConfig,
    pub regions: RegionConfig,
    pub digits: DigitConfig,
    pub hands: HandConfig,
    pub rubric: RubricConfig,
}

impl ScoringConfig {
    /// Load a config from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: ScoringConfig = serde_json::from_str(&text)
            .map_err(|e| ScoringError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a stage meaningless
    pub fn validate(&self) -> Result<()> {
        if self.digits.input_size == 0 {
            return Err(ScoringError::Config("digits.input_size must be positive".into()));
        }
        if self.regions.min_area > self.regions.max_area {
            return Err(ScoringError::Config(
                "regions.min_area must not exceed regions.max_area".into(),
            ));
        }
        if self.digits.angle_sigma <= 0.0 || self.digits.radius_scale <= 0.0 {
            return Err(ScoringError::Config("digit prior spreads must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Gray level above which a pixel counts as paper
    pub ink_threshold: u8,
    pub hysteresis_low: f32,
    pub hysteresis_high: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            ink_threshold: 240,
            hysteresis_low: 0.01,
            hysteresis_high: 0.20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FaceConfig {
    /// Douglas-Peucker tolerance as a fraction of the contour perimeter
    pub approx_epsilon_ratio: f64,
    /// Largest relative area change for a vertex to count as removable
    pub smoothing_tolerance: f64,
    /// Stroke width used when painting the boundary out of the bleached image
    pub bleach_stroke: u32,
    /// Stroke width used when painting the raw contour out of the region view
    pub region_stroke: u32,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            approx_epsilon_ratio: 0.009,
            smoothing_tolerance: 0.005,
            bleach_stroke: 25,
            region_stroke: 17,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegionConfig {
    pub delta: u8,
    pub min_area: u32,
    pub max_area: u32,
    pub max_variation: f32,
    pub min_diversity: f32,
    /// Boxes with either side above this are dropped
    pub max_box_side: u32,
    /// Overlap (relative to the smaller box) at which the smaller box is dropped
    pub intersect_threshold: f32,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            delta: 5,
            min_area: 60,
            max_area: 14400,
            max_variation: 0.5,
            min_diversity: 0.2,
            max_box_side: 80,
            intersect_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, H, W, 1]`
    Nhwc,
    /// `[1, 1, H, W]`
    Nchw,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DigitConfig {
    /// Side of the square patch fed to the classifier
    pub input_size: u32,
    pub layout: TensorLayout,
    /// White border added around a crop before resizing
    pub pad: u32,
    pub acceptance_threshold: f32,
    /// Angular prior spread in degrees
    pub angle_sigma: f32,
    pub radius_mean: f32,
    pub radius_scale: f32,
    /// Accepted radial band, as fractions of the face radius (exclusive)
    pub min_radius_ratio: f32,
    pub max_radius_ratio: f32,
    /// Garbage must beat the runner-up by this factor to reject a box
    pub garbage_margin: f32,
}

impl Default for DigitConfig {
    fn default() -> Self {
        Self {
            input_size: 28,
            layout: TensorLayout::Nhwc,
            pad: 6,
            acceptance_threshold: 0.5,
            angle_sigma: 15.0,
            radius_mean: 0.7,
            radius_scale: 0.10,
            min_radius_ratio: 0.33,
            max_radius_ratio: 1.0,
            garbage_margin: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HandConfig {
    /// Half-width of the search window, as a fraction of the face radius
    pub search_ratio: f32,
    pub min_component_pixels: u32,
    /// Components whose bounding box covers this share of the face are dropped
    pub max_face_fraction: f32,
    pub dilate_radius: u8,
    pub harris_window: u32,
    pub harris_k: f32,
    /// Threshold on the 0..255 normalized corner response
    pub corner_threshold: f32,
    /// Half-width in degrees of the wedge assigned to each hand
    pub angle_buffer: f32,
}

impl Default for HandConfig {
    fn default() -> Self {
        Self {
            search_ratio: 0.3,
            min_component_pixels: 50,
            max_face_fraction: 0.8,
            dilate_radius: 6,
            harris_window: 15,
            harris_k: 0.04,
            corner_threshold: 100.0,
            angle_buffer: 7.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RubricConfig {
    pub min_circularity: f64,
    pub min_radius_ratio: f64,
    pub max_length_ratio: f64,
    pub max_intersect_distance: f64,
}

impl Default for RubricConfig {
    fn default() -> Self {
        Self {
            min_circularity: 0.85,
            min_radius_ratio: 0.75,
            max_length_ratio: 0.9,
            max_intersect_distance: 10.0,
        }
    }
}
