use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;

use crate::pipeline::Analysis;

const RED: Rgb<u8> = Rgb([255, 0, 0]);
const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
const GREEN: Rgb<u8> = Rgb([0, 200, 0]);
const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
const MAGENTA: Rgb<u8> = Rgb([255, 0, 255]);
const DARK_GREEN: Rgb<u8> = Rgb([0, 100, 0]);

/// Seven-segment label glyph size
const LABEL_WIDTH: f32 = 6.0;
const LABEL_HEIGHT: f32 = 10.0;

/// Lit segments per digit, in order a b c d e f g
const SEGMENTS: [[bool; 7]; 10] = [
    [true, true, true, true, true, true, false],
    [false, true, true, false, false, false, false],
    [true, true, false, true, true, false, true],
    [true, true, true, true, false, false, true],
    [false, true, true, false, false, true, true],
    [true, false, true, true, false, true, true],
    [true, false, true, true, true, true, true],
    [true, true, true, false, false, false, false],
    [true, true, true, true, true, true, true],
    [true, true, true, true, false, true, true],
];

/// Draw what the pipeline recognized on top of the input drawing.
///
/// Each accepted digit box is labelled with its class as a small
/// seven-segment figure just above the box.
pub fn render(img: &DynamicImage, analysis: &Analysis) -> RgbImage {
    let mut canvas = img.to_rgb8();

    // Hand pixels get a blue tint
    for (x, y, p) in analysis.hands.mask.enumerate_pixels() {
        if p[0] == 0 || x >= canvas.width() || y >= canvas.height() {
            continue;
        }
        let px = canvas.get_pixel_mut(x, y);
        for c in 0..3 {
            px[c] = ((px[c] as u16 + BLUE[c] as u16) / 2) as u8;
        }
    }

    let points = &analysis.face.boundary.points;
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        draw_line_segment_mut(
            &mut canvas,
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
            RED,
        );
    }

    let circle = analysis.face.circle_center;
    let circle_center = (circle.x.round() as i32, circle.y.round() as i32);
    draw_hollow_circle_mut(&mut canvas, circle_center, analysis.face.radius.round() as i32, YELLOW);
    draw_filled_circle_mut(&mut canvas, circle_center, 3, YELLOW);

    let centroid = analysis.face.center();
    draw_filled_circle_mut(
        &mut canvas,
        (centroid.x.round() as i32, centroid.y.round() as i32),
        3,
        RED,
    );

    for detection in &analysis.digits.detections {
        let b = detection.bbox;
        if b.width == 0 || b.height == 0 {
            continue;
        }
        let rect = Rect::at(b.x as i32, b.y as i32).of_size(b.width, b.height);
        draw_hollow_rect_mut(&mut canvas, rect, GREEN);
        let top = b.y as f32 - LABEL_HEIGHT - 3.0;
        draw_label(&mut canvas, detection.label, b.x as f32 + 2.0, top, DARK_GREEN);
    }

    if let Some(pivot) = analysis.hands.pivot {
        draw_filled_circle_mut(
            &mut canvas,
            (pivot.x.round() as i32, pivot.y.round() as i32),
            4,
            MAGENTA,
        );
    }

    canvas
}

/// Draw `digit` as a seven-segment figure with its top-left corner at
/// (`x`, `y`); segments falling off the canvas are clipped
fn draw_label(canvas: &mut RgbImage, digit: u8, x: f32, y: f32, color: Rgb<u8>) {
    let Some(lit) = SEGMENTS.get(digit as usize) else {
        return;
    };
    let (l, r) = (x, x + LABEL_WIDTH);
    let (t, m, b) = (y, y + LABEL_HEIGHT / 2.0, y + LABEL_HEIGHT);
    let segments = [
        ((l, t), (r, t)),
        ((r, t), (r, m)),
        ((r, m), (r, b)),
        ((l, b), (r, b)),
        ((l, m), (l, b)),
        ((l, t), (l, m)),
        ((l, m), (r, m)),
    ];
    for (on, (from, to)) in lit.iter().zip(segments) {
        if *on {
            draw_line_segment_mut(canvas, from, to, color);
        }
    }
}
