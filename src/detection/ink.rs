use image::{GrayImage, Luma};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::point::Point;
use imageproc::rect::Rect;

use crate::models::DigitBox;

pub const PAPER: u8 = 255;
pub const INK: u8 = 0;

/// Ink left unexplained by the recognized structures
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InkReport {
    /// Share of the original ink mass still present after bleaching
    pub leftover_ink: Option<f64>,
    /// Mean gray level over ink pixels
    pub pen_pressure: Option<f64>,
}

/// Trace a closed curve with a round pen of the given stroke width
pub fn stroke_closed_curve(img: &mut GrayImage, points: &[Point<i32>], width: u32, value: u8) {
    let radius = (width / 2) as i32;
    let color = Luma([value]);
    let n = points.len();
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        let steps = (a.x - b.x).abs().max((a.y - b.y).abs()).max(1);
        for s in 0..=steps {
            let t = s as f64 / steps as f64;
            let x = a.x as f64 + (b.x - a.x) as f64 * t;
            let y = a.y as f64 + (b.y - a.y) as f64 * t;
            draw_filled_circle_mut(img, (x.round() as i32, y.round() as i32), radius, color);
        }
    }
}

/// Fill a box including its far edge
pub fn fill_box(img: &mut GrayImage, bbox: &DigitBox, value: u8) {
    let rect = Rect::at(bbox.x as i32, bbox.y as i32).of_size(bbox.width + 1, bbox.height + 1);
    draw_filled_rect_mut(img, rect, Luma([value]));
}

/// Fill the rectangle spanning two corners, both included
pub fn fill_corners(img: &mut GrayImage, corners: [u32; 4], value: u8) {
    let [x0, y0, x1, y1] = corners;
    let rect = Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0 + 1, y1 - y0 + 1);
    draw_filled_rect_mut(img, rect, Luma([value]));
}

/// Total ink in a binary image, one unit per fully black pixel
pub fn ink_mass(img: &GrayImage) -> f64 {
    img.pixels().map(|p| (255 - p[0]) as f64 / 255.0).sum()
}

/// Compare ink before and after bleaching, and estimate pen pressure from
/// the grayscale levels of inked pixels
pub fn account_ink(threshold: &GrayImage, bleached: &GrayImage, gray: &GrayImage) -> InkReport {
    let original = ink_mass(threshold);
    let leftover_ink = (original > 0.0).then(|| ink_mass(bleached) / original);

    let (sum, count) = gray
        .pixels()
        .filter(|p| p[0] < 255)
        .fold((0u64, 0u64), |(s, c), p| (s + p[0] as u64, c + 1));
    let pen_pressure = (count > 0).then(|| sum as f64 / count as f64);

    InkReport { leftover_ink, pen_pressure }
}
