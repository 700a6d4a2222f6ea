use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::filter::filter3x3;
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::HashSet;

use crate::config::PreprocessConfig;
use crate::error::{Result, ScoringError};

pub type GrayF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Fixed 3x3 Gaussian, the binomial [1 2 1] kernel in both directions
const K_GAUSS: [f32; 9] = [
    1.0 / 16.0, 2.0 / 16.0, 1.0 / 16.0,
    2.0 / 16.0, 4.0 / 16.0, 2.0 / 16.0,
    1.0 / 16.0, 2.0 / 16.0, 1.0 / 16.0,
];

// Sobel kernels scaled by 1/4 so a unit step yields a unit response
const K_SOBEL_X: [f32; 9] = [
    -0.25, 0.0, 0.25,
    -0.5, 0.0, 0.5,
    -0.25, 0.0, 0.25,
];
const K_SOBEL_Y: [f32; 9] = [
    -0.25, -0.5, -0.25,
    0.0, 0.0, 0.0,
    0.25, 0.5, 0.25,
];

/// Every derived view of the input the later stages read from
#[derive(Debug, Clone)]
pub struct PreprocessedViews {
    pub gray: GrayImage,
    pub blurred: GrayImage,
    /// 255 for paper, 0 for ink
    pub threshold: GrayImage,
    /// 255 on edge pixels
    pub edges: GrayImage,
}

impl PreprocessedViews {
    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    pub fn height(&self) -> u32 {
        self.gray.height()
    }
}

/// Build all views of an image, rejecting empty input
pub fn preprocess(img: &DynamicImage, config: &PreprocessConfig) -> Result<PreprocessedViews> {
    if img.width() == 0 || img.height() == 0 {
        return Err(ScoringError::InvalidImage(format!(
            "image has zero size ({}x{})",
            img.width(),
            img.height()
        )));
    }

    let gray = to_grayscale(img);
    let blurred = apply_blur(&gray);
    let threshold = binarize(&blurred, config.ink_threshold);
    let edges = detect_edges(&threshold, config.hysteresis_low, config.hysteresis_high);

    Ok(PreprocessedViews { gray, blurred, threshold, edges })
}

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Apply the fixed 3x3 Gaussian blur
pub fn apply_blur(img: &GrayImage) -> GrayImage {
    let blurred: GrayF32 = filter3x3(&to_f32(img, 1.0), &K_GAUSS);
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        Luma([blurred.get_pixel(x, y)[0].round().clamp(0.0, 255.0) as u8])
    })
}

/// Pixels brighter than `level` become paper (255), the rest ink (0)
pub fn binarize(img: &GrayImage, level: u8) -> GrayImage {
    threshold(img, level, ThresholdType::Binary)
}

/// Scale an 8-bit image into floats, multiplying each sample by `scale`
pub fn to_f32(img: &GrayImage, scale: f32) -> GrayF32 {
    GrayF32::from_fn(img.width(), img.height(), |x, y| {
        Luma([img.get_pixel(x, y)[0] as f32 * scale])
    })
}

/// Sobel magnitude of an image normalized to [0, 1].
///
/// The one-pixel frame is zeroed since the kernel there reads replicated
/// samples.
pub fn sobel_magnitude(img: &GrayImage) -> GrayF32 {
    let unit = to_f32(img, 1.0 / 255.0);
    let gx: GrayF32 = filter3x3(&unit, &K_SOBEL_X);
    let gy: GrayF32 = filter3x3(&unit, &K_SOBEL_Y);
    let (w, h) = img.dimensions();

    GrayF32::from_fn(w, h, |x, y| {
        if x == 0 || y == 0 || x + 1 >= w || y + 1 >= h {
            return Luma([0.0]);
        }
        let a = gx.get_pixel(x, y)[0];
        let b = gy.get_pixel(x, y)[0];
        Luma([((a * a + b * b) / 2.0).sqrt()])
    })
}

/// Edge map: hysteresis-thresholded gradient magnitude unioned with the
/// strong-edge mask
pub fn detect_edges(img: &GrayImage, low: f32, high: f32) -> GrayImage {
    let magnitude = sobel_magnitude(img);
    let (w, h) = magnitude.dimensions();

    let weak = GrayImage::from_fn(w, h, |x, y| {
        Luma([if magnitude.get_pixel(x, y)[0] > low { 255 } else { 0 }])
    });
    let labels = connected_components(&weak, Connectivity::Four, Luma([0u8]));

    let strong_labels: HashSet<u32> = magnitude
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] > high)
        .map(|(x, y, _)| labels.get_pixel(x, y)[0])
        .filter(|&label| label != 0)
        .collect();

    GrayImage::from_fn(w, h, |x, y| {
        let strong = magnitude.get_pixel(x, y)[0] > high;
        let linked = strong_labels.contains(&labels.get_pixel(x, y)[0]);
        Luma([if strong || linked { 255 } else { 0 }])
    })
}
