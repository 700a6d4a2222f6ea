use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::filter::filter3x3;
use imageproc::morphology::dilate;
use imageproc::point::Point;
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::HashMap;
use tracing::debug;

use crate::config::HandConfig;
use crate::detection::census::kmeans_1d;
use crate::detection::digits::polar_angle;
use crate::detection::preprocessing::{to_f32, GrayF32};
use crate::models::ClockFace;

const K_SOBEL_X: [f32; 9] = [-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0];
const K_SOBEL_Y: [f32; 9] = [-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0];

const GMM_MAX_ITER: usize = 100;
const GMM_TOL: f64 = 1e-3;
/// Added to each component variance so a collapsed cluster stays usable
const GMM_REG: f64 = 1e-6;

/// Bounding box and pixel count of one labelled component
#[derive(Debug, Clone, Copy)]
struct ComponentStats {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    pixel_count: u32,
}

impl ComponentStats {
    fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

/// One of the two angular clusters of hand ink
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandCluster {
    /// Cluster mean in whole degrees
    pub mean_angle: f64,
    /// Mask pixels inside the cluster wedge
    pub point_count: u32,
    /// Farthest wedge pixel from the pivot; absent when the wedge is empty
    pub length: Option<f64>,
}

/// Ink attributed to the hands and what was measured from it
#[derive(Debug, Clone)]
pub struct HandReading {
    /// 255 on hand pixels
    pub mask: GrayImage,
    /// Combined component bounds as `[x0, y0, x1, y1]`, far edges exclusive
    pub bbox: Option<[u32; 4]>,
    pub num_components: u32,
    pub pixel_count: u32,
    pub pivot: Option<Point<f64>>,
    pub clusters: Option<[HandCluster; 2]>,
}

impl HandReading {
    pub fn has_ink(&self) -> bool {
        self.pixel_count > 0
    }

    pub fn hands_angle(&self) -> Option<f64> {
        self.clusters.map(|[a, b]| (a.mean_angle - b.mean_angle).abs())
    }

    /// Short hand length over long hand length
    pub fn length_ratio(&self) -> Option<f64> {
        let [a, b] = self.clusters?;
        let (la, lb) = (a.length?, b.length?);
        let long = la.max(lb);
        (long > 0.0).then(|| la.min(lb) / long)
    }

    pub fn density_ratio(&self) -> Option<f64> {
        let [a, b] = self.clusters?;
        let big = a.point_count.max(b.point_count);
        (big > 0).then(|| a.point_count.min(b.point_count) as f64 / big as f64)
    }

    pub fn bb_ratio(&self) -> Option<f64> {
        let [x0, y0, x1, y1] = self.bbox?;
        let (w, h) = (x1 - x0, y1 - y0);
        let big = w.max(h);
        (big > 0).then(|| w.min(h) as f64 / big as f64)
    }

    /// Distance between the pivot and `center`
    pub fn intersect_distance(&self, center: Point<f64>) -> Option<f64> {
        let pivot = self.pivot?;
        Some(((pivot.x - center.x).powi(2) + (pivot.y - center.y).powi(2)).sqrt())
    }
}

/// Segment the hands out of a bleached binary image (face outline and
/// digits already painted white) and measure them
pub fn measure_hands(bleached: &GrayImage, face: &ClockFace, config: &HandConfig) -> HandReading {
    let center = face.center();
    let (mask, bbox, num_components) = hand_mask(bleached, face, config);
    let pixel_count = mask.pixels().filter(|p| p[0] > 0).count() as u32;

    let mut reading = HandReading {
        mask,
        bbox,
        num_components,
        pixel_count,
        pivot: None,
        clusters: None,
    };
    if !reading.has_ink() {
        debug!("No hand pixels near the face center");
        return reading;
    }

    reading.pivot = bbox.and_then(|b| locate_pivot(&reading.mask, b, center, config));
    if reading.pivot.is_none() {
        debug!("No corner found on the hand mask");
    }

    let origin = reading.pivot.unwrap_or(center);
    reading.clusters = cluster_hands(&reading.mask, origin, config.angle_buffer as f64);
    if reading.clusters.is_none() {
        debug!("Too few hand pixels to split into two hands");
    }

    debug!(
        "Hands: {} components, {} pixels, pivot={:?}",
        reading.num_components, reading.pixel_count, reading.pivot
    );
    reading
}

/// Union of the ink components that overlap the square search window
/// around the face center
fn hand_mask(
    bleached: &GrayImage,
    face: &ClockFace,
    config: &HandConfig,
) -> (GrayImage, Option<[u32; 4]>, u32) {
    let (w, h) = bleached.dimensions();
    let ink = GrayImage::from_fn(w, h, |x, y| Luma([255 - bleached.get_pixel(x, y)[0]]));
    let labels = connected_components(&ink, Connectivity::Eight, Luma([0u8]));

    let mut regions: HashMap<u32, ComponentStats> = HashMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0];
        if label == 0 {
            continue;
        }
        regions
            .entry(label)
            .and_modify(|s| {
                s.min_x = s.min_x.min(x);
                s.min_y = s.min_y.min(y);
                s.max_x = s.max_x.max(x);
                s.max_y = s.max_y.max(y);
                s.pixel_count += 1;
            })
            .or_insert(ComponentStats {
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
                pixel_count: 1,
            });
    }

    let center = face.center();
    let half = face.radius * config.search_ratio as f64;
    let search = [
        (center.x - half) as i64,
        (center.y - half) as i64,
        (center.x + half) as i64,
        (center.y + half) as i64,
    ];
    let max_area = face.area() * config.max_face_fraction as f64;

    let mut kept: Vec<u32> = regions
        .iter()
        .filter(|(_, s)| {
            let rect = [
                s.min_x as i64,
                s.min_y as i64,
                (s.min_x + s.width()) as i64,
                (s.min_y + s.height()) as i64,
            ];
            s.pixel_count >= config.min_component_pixels
                && ((s.width() * s.height()) as f64) < max_area
                && rects_overlap(rect, search)
        })
        .map(|(label, _)| *label)
        .collect();
    kept.sort_unstable();

    let mut bbox: Option<[u32; 4]> = None;
    for label in &kept {
        let s = regions[label];
        let b = [s.min_x, s.min_y, s.min_x + s.width(), s.min_y + s.height()];
        bbox = Some(match bbox {
            None => b,
            Some(a) => [a[0].min(b[0]), a[1].min(b[1]), a[2].max(b[2]), a[3].max(b[3])],
        });
    }

    let mask = GrayImage::from_fn(w, h, |x, y| {
        let label = labels.get_pixel(x, y)[0];
        Luma([if label != 0 && kept.binary_search(&label).is_ok() { 255 } else { 0 }])
    });
    (mask, bbox, kept.len() as u32)
}

fn rects_overlap(a: [i64; 4], b: [i64; 4]) -> bool {
    a[0] <= b[2] && b[0] <= a[2] && a[1] <= b[3] && b[1] <= a[3]
}

/// The strong Harris corner of the hand mask closest to `center`, limited
/// to pixels within the dilated mask
fn locate_pivot(
    mask: &GrayImage,
    bbox: [u32; 4],
    center: Point<f64>,
    config: &HandConfig,
) -> Option<Point<f64>> {
    // Work on a window around the hands; the response is zero elsewhere
    let margin = config.dilate_radius as u32 + config.harris_window;
    let x0 = bbox[0].saturating_sub(margin);
    let y0 = bbox[1].saturating_sub(margin);
    let x1 = (bbox[2] + margin).min(mask.width());
    let y1 = (bbox[3] + margin).min(mask.height());
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    let window = image::imageops::crop_imm(mask, x0, y0, x1 - x0, y1 - y0).to_image();
    // Dilation fills the notch between the hands, so it only bounds the search
    let reach = dilate(&window, Norm::LInf, config.dilate_radius);

    let response = harris_response(&window, config.harris_window, config.harris_k);
    let (min, max) = response
        .pixels()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    if max - min <= f32::EPSILON {
        return None;
    }

    let mut closest: Option<(Point<f64>, f64)> = None;
    for (x, y, p) in response.enumerate_pixels() {
        let normalized = (p[0] - min) / (max - min) * 255.0;
        if normalized <= config.corner_threshold || reach.get_pixel(x, y)[0] == 0 {
            continue;
        }
        let point = Point::new((x + x0) as f64, (y + y0) as f64);
        let d = ((point.x - center.x).powi(2) + (point.y - center.y).powi(2)).sqrt();
        if closest.is_none_or(|(_, best)| d < best) {
            closest = Some((point, d));
        }
    }
    closest.map(|(p, _)| p)
}

/// Harris corner response `det(M) - k * trace(M)^2` with the structure
/// tensor summed over a square window
pub fn harris_response(img: &GrayImage, window: u32, k: f32) -> GrayF32 {
    let unit = to_f32(img, 1.0 / 255.0);
    let gx: GrayF32 = filter3x3(&unit, &K_SOBEL_X);
    let gy: GrayF32 = filter3x3(&unit, &K_SOBEL_Y);
    let (w, h) = img.dimensions();

    let xx = integral(w, h, |x, y| gx.get_pixel(x, y)[0].powi(2) as f64);
    let yy = integral(w, h, |x, y| gy.get_pixel(x, y)[0].powi(2) as f64);
    let xy = integral(w, h, |x, y| (gx.get_pixel(x, y)[0] * gy.get_pixel(x, y)[0]) as f64);

    let half = window / 2;
    GrayF32::from_fn(w, h, |x, y| {
        let (l, t) = (x.saturating_sub(half), y.saturating_sub(half));
        let (r, b) = ((x + half + 1).min(w), (y + half + 1).min(h));
        let sxx = box_sum(&xx, w, l, t, r, b);
        let syy = box_sum(&yy, w, l, t, r, b);
        let sxy = box_sum(&xy, w, l, t, r, b);
        let det = sxx * syy - sxy * sxy;
        let trace = sxx + syy;
        Luma([(det - k as f64 * trace * trace) as f32])
    })
}

/// Summed-area table with a zero row and column in front
fn integral(w: u32, h: u32, f: impl Fn(u32, u32) -> f64) -> Vec<f64> {
    let stride = (w + 1) as usize;
    let mut table = vec![0.0; stride * (h + 1) as usize];
    for y in 0..h {
        let mut row = 0.0;
        for x in 0..w {
            row += f(x, y);
            let i = (y as usize + 1) * stride + x as usize + 1;
            table[i] = table[i - stride] + row;
        }
    }
    table
}

/// Sum over columns `l..r` and rows `t..b`
fn box_sum(table: &[f64], w: u32, l: u32, t: u32, r: u32, b: u32) -> f64 {
    let stride = (w + 1) as usize;
    let at = |x: u32, y: u32| table[y as usize * stride + x as usize];
    at(r, b) - at(l, b) - at(r, t) + at(l, t)
}

/// Split the mask into two hands by angle around `origin`
fn cluster_hands(mask: &GrayImage, origin: Point<f64>, buffer: f64) -> Option<[HandCluster; 2]> {
    let mut angles = Vec::new();
    let mut radii = Vec::new();
    for (x, y, p) in mask.enumerate_pixels() {
        if p[0] == 0 {
            continue;
        }
        let dx = x as f64 - origin.x;
        let dy = y as f64 - origin.y;
        angles.push(polar_angle(dx, dy));
        radii.push((dx * dx + dy * dy).sqrt());
    }
    if angles.len() < 2 {
        return None;
    }

    let means = gaussian_mixture_means(&angles)?;
    let cluster = |mean: f64| {
        let mean = mean.trunc();
        let mut point_count = 0u32;
        let mut length: Option<f64> = None;
        for (a, r) in angles.iter().zip(&radii) {
            if *a > mean - buffer && *a < mean + buffer {
                point_count += 1;
                length = Some(length.map_or(*r, |l| l.max(*r)));
            }
        }
        HandCluster {
            mean_angle: mean,
            point_count,
            length,
        }
    };
    Some([cluster(means[0]), cluster(means[1])])
}

/// Means of a two-component 1-D Gaussian mixture fitted by EM, seeded
/// from 2-means
pub fn gaussian_mixture_means(values: &[f64]) -> Option<[f64; 2]> {
    if values.len() < 2 {
        return None;
    }
    let seeds = kmeans_1d(values, 2);
    let mut means = [seeds[0], *seeds.get(1).unwrap_or(&seeds[0])];

    let n = values.len() as f64;
    let mut weights = [0.5f64; 2];
    let mut vars = [0.0f64; 2];
    let mut counts = [0.0f64; 2];
    for v in values {
        let c = if (v - means[0]).abs() <= (v - means[1]).abs() { 0 } else { 1 };
        vars[c] += (v - means[c]).powi(2);
        counts[c] += 1.0;
    }
    for c in 0..2 {
        weights[c] = (counts[c] / n).max(GMM_REG);
        let spread = if counts[c] > 0.0 { vars[c] / counts[c] } else { 1.0 };
        vars[c] = spread + GMM_REG;
    }

    let mut resp = vec![[0.0f64; 2]; values.len()];
    let mut prev_ll = f64::NEG_INFINITY;
    for _ in 0..GMM_MAX_ITER {
        // E-step in log space
        let mut ll = 0.0;
        for (i, v) in values.iter().enumerate() {
            let logp = [0, 1].map(|c| {
                weights[c].ln() - 0.5 * ((2.0 * std::f64::consts::PI * vars[c]).ln())
                    - (v - means[c]).powi(2) / (2.0 * vars[c])
            });
            let top = logp[0].max(logp[1]);
            let norm = top + ((logp[0] - top).exp() + (logp[1] - top).exp()).ln();
            resp[i] = [(logp[0] - norm).exp(), (logp[1] - norm).exp()];
            ll += norm;
        }
        ll /= n;

        // M-step
        for c in 0..2 {
            let nk: f64 = resp.iter().map(|r| r[c]).sum::<f64>() + 10.0 * f64::EPSILON;
            let mean = resp.iter().zip(values).map(|(r, v)| r[c] * v).sum::<f64>() / nk;
            let var = resp
                .iter()
                .zip(values)
                .map(|(r, v)| r[c] * (v - mean).powi(2))
                .sum::<f64>()
                / nk;
            weights[c] = nk / n;
            means[c] = mean;
            vars[c] = var + GMM_REG;
        }

        if (ll - prev_ll).abs() < GMM_TOL {
            break;
        }
        prev_ll = ll;
    }
    Some(means)
}
