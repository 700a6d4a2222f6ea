use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use tracing::debug;

use crate::config::DigitConfig;
use crate::detection::classifier::DigitModel;
use crate::detection::preprocessing::{to_f32, GrayF32};
use crate::error::{Result, ScoringError};
use crate::models::{ClockFace, DigitBox, DigitDetection, GARBAGE_CLASS, NUM_CLASSES};

/// Lowest angular prior a digit can get, so the classifier can still
/// outvote a misplaced digit
const PRIOR_FLOOR: f32 = 1e-3;

/// Digits accepted on one face, in box order
#[derive(Debug, Clone, Default)]
pub struct DigitReading {
    pub detections: Vec<DigitDetection>,
}

impl DigitReading {
    pub fn angles(&self) -> Vec<f64> {
        self.detections.iter().map(|d| d.angle).collect()
    }

    pub fn radius_ratios(&self) -> Vec<f64> {
        self.detections.iter().map(|d| d.radius_ratio).collect()
    }

    pub fn areas(&self) -> Vec<f64> {
        self.detections.iter().map(|d| d.bbox.area() as f64).collect()
    }

    pub fn labels(&self) -> impl Iterator<Item = u8> + '_ {
        self.detections.iter().map(|d| d.label)
    }
}

/// Classify every box and keep the ones that read as digits in a
/// plausible place on the face
pub fn classify_regions(
    threshold: &GrayImage,
    boxes: &[DigitBox],
    face: &ClockFace,
    model: &dyn DigitModel,
    config: &DigitConfig,
) -> Result<DigitReading> {
    let center = face.center();
    let mut reading = DigitReading::default();

    for bbox in boxes {
        let (bx, by) = bbox.center();
        let dx = bx - center.x;
        let dy = by - center.y;
        let r = (dx * dx + dy * dy).sqrt();
        let ratio = if face.radius > 0.0 { r / face.radius } else { f64::INFINITY };
        if ratio <= config.min_radius_ratio as f64 || ratio >= config.max_radius_ratio as f64 {
            continue;
        }
        let angle = polar_angle(dx, dy);

        let patch = prepare_patch(threshold, bbox, config);
        let probs = model.predict(&patch)?;
        let fused = fuse(&probs, &angle_priors(angle as f32, config.angle_sigma))?;
        let radial = radial_prior(ratio as f32, config.radius_mean, config.radius_scale);

        if let Some((label, posterior)) = decide(&fused, radial, config) {
            reading.detections.push(DigitDetection {
                bbox: *bbox,
                label,
                fused,
                posterior,
                angle,
                radius_ratio: ratio,
            });
        }
    }

    debug!(
        "Accepted {} digits from {} candidate boxes",
        reading.detections.len(),
        boxes.len()
    );
    Ok(reading)
}

/// Angle of an offset in degrees, counter-clockwise from 3 o'clock, with
/// image rows growing downwards
pub fn polar_angle(dx: f64, dy: f64) -> f64 {
    (-dy.atan2(dx).to_degrees() + 360.0) % 360.0
}

/// Position of an hour mark under [`polar_angle`]: 12 sits at 90 degrees
fn hour_angle(hour: u32) -> f32 {
    (90.0 - 30.0 * hour as f32).rem_euclid(360.0)
}

fn angular_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

/// How plausible each class is at `angle`.
///
/// A digit scores by the closest hour mark it appears in (so "1" peaks at
/// 1, 10, 11 and 12); garbage is equally plausible everywhere.
pub fn angle_priors(angle: f32, sigma: f32) -> [f32; NUM_CLASSES] {
    let mut priors = [PRIOR_FLOOR; NUM_CLASSES];
    for hour in 1..=12u32 {
        let d = angular_distance(angle, hour_angle(hour));
        let weight = (-(d * d) / (2.0 * sigma * sigma)).exp();
        for digit in hour.to_string().bytes().map(|b| (b - b'0') as usize) {
            priors[digit] = priors[digit].max(weight);
        }
    }
    priors[GARBAGE_CLASS] = 1.0;
    priors
}

/// Normal density of the radial position
pub fn radial_prior(ratio: f32, mean: f32, scale: f32) -> f32 {
    let z = (ratio - mean) / scale;
    (-0.5 * z * z).exp() / (scale * (2.0 * std::f32::consts::PI).sqrt())
}

/// Classifier output weighted by the angular prior, renormalized to sum to one
pub fn fuse(
    probs: &[f32; NUM_CLASSES],
    priors: &[f32; NUM_CLASSES],
) -> Result<[f32; NUM_CLASSES]> {
    let mut fused = [0.0f32; NUM_CLASSES];
    for i in 0..NUM_CLASSES {
        fused[i] = probs[i] * priors[i];
    }
    let total: f32 = fused.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
        return Err(ScoringError::ClassifierInference(
            "classifier returned no probability mass".into(),
        ));
    }
    for p in fused.iter_mut() {
        *p /= total;
    }
    Ok(fused)
}

/// Pick a label from the fused distribution.
///
/// A garbage win only rejects the box when it beats the runner-up by the
/// configured margin; otherwise the best digit competes alone. The winner
/// must clear the acceptance threshold once weighted by `radial`.
pub fn decide(fused: &[f32; NUM_CLASSES], radial: f32, config: &DigitConfig) -> Option<(u8, f32)> {
    let posteriors: Vec<f32> = fused.iter().map(|p| p * radial).collect();
    let (mut label, mut best) = argmax(&posteriors);

    if label == GARBAGE_CLASS {
        let runner_up = posteriors
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != GARBAGE_CLASS)
            .map(|(_, p)| *p)
            .fold(0.0f32, f32::max);
        if best > runner_up * config.garbage_margin {
            return None;
        }
        (label, best) = argmax(&posteriors[..GARBAGE_CLASS]);
    }

    (best > config.acceptance_threshold).then_some((label as u8, best))
}

/// First index of the largest value
fn argmax(values: &[f32]) -> (usize, f32) {
    values
        .iter()
        .enumerate()
        .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
}

/// Crop a box out of the binary image, center it on a white square and
/// scale it to the classifier input
pub fn prepare_patch(threshold: &GrayImage, bbox: &DigitBox, config: &DigitConfig) -> GrayF32 {
    let crop_w = (bbox.width + 1).min(threshold.width().saturating_sub(bbox.x));
    let crop_h = (bbox.height + 1).min(threshold.height().saturating_sub(bbox.y));
    let crop = imageops::crop_imm(threshold, bbox.x, bbox.y, crop_w, crop_h).to_image();

    let side = bbox.width.max(bbox.height) + config.pad;
    let mut canvas = GrayImage::from_pixel(side, side, Luma([255u8]));
    let offset_x = (side - bbox.width) / 2;
    let offset_y = (side - bbox.height) / 2;
    imageops::overlay(&mut canvas, &crop, offset_x.into(), offset_y.into());

    let resized = imageops::resize(&canvas, config.input_size, config.input_size, FilterType::Triangle);
    to_f32(&resized, 1.0 / 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_oclock_is_zero_degrees_and_twelve_is_ninety() {
        assert!((polar_angle(10.0, 0.0) - 0.0).abs() < 1e-9);
        assert!((polar_angle(0.0, -10.0) - 90.0).abs() < 1e-9);
        assert!((polar_angle(-10.0, 0.0) - 180.0).abs() < 1e-9);
        assert!((polar_angle(0.0, 10.0) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn priors_peak_at_expected_hours() {
        let at_three = angle_priors(0.0, 15.0);
        assert!((at_three[3] - 1.0).abs() < 1e-6);
        assert!(at_three[9] <= PRIOR_FLOOR + 1e-6);

        let at_ten = angle_priors(150.0, 15.0);
        assert!((at_ten[0] - 1.0).abs() < 1e-6);
        assert!((at_ten[1] - 1.0).abs() < 1e-6);
    }
}
