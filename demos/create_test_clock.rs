use image::{GrayImage, Luma};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use std::f32::consts::PI;

/// Draws a clock outline with a slightly wobbly radius and two hands, for
/// trying the CLI without a scanned drawing
fn main() -> anyhow::Result<()> {
    let (w, h) = (500u32, 500u32);
    let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
    let mut img = GrayImage::from_pixel(w, h, Luma([255u8]));

    // Face, with a little wobble in the radius
    for i in 0..2000 {
        let t = i as f32 / 2000.0 * 2.0 * PI;
        let r = 200.0 + 3.0 * (3.0 * t).sin();
        let (x, y) = (cx + r * t.cos(), cy + r * t.sin());
        draw_filled_circle_mut(&mut img, (x as i32, y as i32), 1, Luma([0u8]));
    }

    // Hands
    for (degrees, length) in [(60.0f32, 150.0f32), (120.0, 90.0)] {
        let t = degrees.to_radians();
        for offset in -1..=1 {
            let o = offset as f32;
            draw_line_segment_mut(
                &mut img,
                (cx + o, cy + o),
                (cx + length * t.cos() + o, cy - length * t.sin() + o),
                Luma([0u8]),
            );
        }
    }

    img.save("test_clock.png")?;
    println!("Created test_clock.png ({}x{} clock outline with hands)", w, h);
    Ok(())
}
