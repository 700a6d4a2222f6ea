use clockscore::detection::preprocessing::GrayF32;
use clockscore::models::{GARBAGE_CLASS, NUM_CLASSES};
use clockscore::{DigitModel, Pipeline, ScoringError};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;
use std::sync::Arc;
use tempfile::TempDir;

pub const CANVAS: u32 = 400;
pub const FACE_RADIUS: f64 = 150.0;
pub const DIGIT_RADIUS: f64 = 105.0;
pub const GLYPH_HEIGHT: u32 = 30;
/// Horizontal distance between the two glyphs of hours 10, 11 and 12
pub const GLYPH_PAIR_OFFSET: f64 = 7.0;
pub const MINUTE_HAND: (f64, f64) = (45.0, 80.0);
pub const HOUR_HAND: (f64, f64) = (135.0, 40.0);

/// What to put on a synthetic clock drawing
#[derive(Debug, Clone)]
pub struct ClockDrawing {
    pub omit_hours: Vec<u32>,
    pub hands: bool,
    /// Where the hands meet, relative to the canvas center
    pub hand_offset: (f64, f64),
}

impl Default for ClockDrawing {
    fn default() -> Self {
        Self {
            omit_hours: Vec::new(),
            hands: true,
            hand_offset: (0.0, 0.0),
        }
    }
}

/// Each digit is drawn as a solid bar whose width encodes its value
pub fn glyph_width(digit: u32) -> u32 {
    3 + 3 * digit
}

/// Share of a classifier patch covered by a glyph's ink: the binarized
/// glyph grows by one pixel per side and sits on a padded square canvas
pub fn expected_ink(digit: u32) -> f32 {
    let ink_w = (glyph_width(digit) + 2) as f32;
    let ink_h = (GLYPH_HEIGHT + 2) as f32;
    let side = ink_h + 6.0;
    ink_w * ink_h / (side * side)
}

fn center() -> (f64, f64) {
    (CANVAS as f64 / 2.0, CANVAS as f64 / 2.0)
}

/// Point at `radius` from the canvas center, `degrees` counter-clockwise
/// from 3 o'clock
pub fn polar_point(degrees: f64, radius: f64) -> (f64, f64) {
    let (cx, cy) = center();
    let t = degrees.to_radians();
    (cx + radius * t.cos(), cy - radius * t.sin())
}

fn stamp_line(img: &mut GrayImage, from: (f64, f64), to: (f64, f64), pen: i32) {
    let steps = ((to.0 - from.0).abs().max((to.1 - from.1).abs()).ceil() as i32).max(1);
    for s in 0..=steps {
        let t = s as f64 / steps as f64;
        let x = from.0 + (to.0 - from.0) * t;
        let y = from.1 + (to.1 - from.1) * t;
        draw_filled_circle_mut(img, (x.round() as i32, y.round() as i32), pen, Luma([0u8]));
    }
}

fn draw_glyph(img: &mut GrayImage, digit: u32, cx: f64, cy: f64) {
    let w = glyph_width(digit);
    let x = (cx - w as f64 / 2.0).round() as i32;
    let y = (cy - GLYPH_HEIGHT as f64 / 2.0).round() as i32;
    draw_filled_rect_mut(img, Rect::at(x, y).of_size(w, GLYPH_HEIGHT), Luma([0u8]));
}

/// Render a clock drawing: a round face, the hour numbers and two hands
pub fn render_clock(drawing: &ClockDrawing) -> DynamicImage {
    let mut img = GrayImage::from_pixel(CANVAS, CANVAS, Luma([255u8]));

    let (cx, cy) = center();
    for i in 0..1440 {
        let t = (i as f64 * 0.25).to_radians();
        let x = cx + FACE_RADIUS * t.cos();
        let y = cy + FACE_RADIUS * t.sin();
        draw_filled_circle_mut(&mut img, (x.round() as i32, y.round() as i32), 1, Luma([0u8]));
    }

    for hour in 1..=12u32 {
        if drawing.omit_hours.contains(&hour) {
            continue;
        }
        let (gx, gy) = polar_point(90.0 - 30.0 * hour as f64, DIGIT_RADIUS);
        let digits: Vec<u32> = hour.to_string().bytes().map(|b| (b - b'0') as u32).collect();
        match digits.as_slice() {
            [d] => draw_glyph(&mut img, *d, gx, gy),
            [a, b] => {
                draw_glyph(&mut img, *a, gx - GLYPH_PAIR_OFFSET, gy);
                draw_glyph(&mut img, *b, gx + GLYPH_PAIR_OFFSET, gy);
            }
            _ => {}
        }
    }

    if drawing.hands {
        let (dx, dy) = drawing.hand_offset;
        let joint = (cx + dx, cy + dy);
        for (angle, length) in [MINUTE_HAND, HOUR_HAND] {
            let (tx, ty) = polar_point(angle, length);
            stamp_line(&mut img, joint, (tx + dx, ty + dy), 2);
        }
    }

    DynamicImage::ImageLuma8(img)
}

pub fn blank_page() -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(CANVAS, CANVAS, Luma([255u8])))
}

/// Reads the glyph value back from how much of the patch is inked
pub struct GlyphWidthModel;

impl DigitModel for GlyphWidthModel {
    fn predict(&self, patch: &GrayF32) -> clockscore::Result<[f32; NUM_CLASSES]> {
        let n = (patch.width() * patch.height()).max(1) as f32;
        let ink = patch.pixels().map(|p| 1.0 - p[0]).sum::<f32>() / n;
        let digit = (0..10u32)
            .min_by(|a, b| {
                (expected_ink(*a) - ink)
                    .abs()
                    .total_cmp(&(expected_ink(*b) - ink).abs())
            })
            .unwrap_or(0);

        let mut probs = [0.01f32; NUM_CLASSES];
        probs[digit as usize] = 0.9;
        Ok(probs)
    }
}

/// Returns the same distribution for every patch
pub struct FixedModel(pub [f32; NUM_CLASSES]);

impl DigitModel for FixedModel {
    fn predict(&self, _patch: &GrayF32) -> clockscore::Result<[f32; NUM_CLASSES]> {
        Ok(self.0)
    }
}

/// Everything is garbage
pub fn garbage_model() -> FixedModel {
    let mut probs = [0.0f32; NUM_CLASSES];
    probs[GARBAGE_CLASS] = 1.0;
    FixedModel(probs)
}

/// Inference always fails
pub struct FailingModel;

impl DigitModel for FailingModel {
    fn predict(&self, _patch: &GrayF32) -> clockscore::Result<[f32; NUM_CLASSES]> {
        Err(ScoringError::ClassifierInference("backend unavailable".into()))
    }
}

pub fn glyph_pipeline() -> Pipeline {
    Pipeline::new(Arc::new(GlyphWidthModel))
}

/// Writes an image as `<dir>/<name>.png` inside a fresh temp directory
pub fn save_to_temp_dir(img: &DynamicImage, name: &str) -> anyhow::Result<TempDir> {
    let dir = TempDir::new()?;
    img.save(dir.path().join(format!("{}.png", name)))?;
    Ok(dir)
}
