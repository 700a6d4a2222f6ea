use image::GrayImage;
use imageproc::contours::find_contours;
use imageproc::geometry::{approximate_polygon_dp, arc_length, convex_hull};
use imageproc::point::Point;
use tracing::debug;

use crate::config::FaceConfig;
use crate::error::{Result, ScoringError};
use crate::models::{ClockFace, ContourCandidate, CurveKind};

const EPS: f64 = 1e-9;

/// Find the clock outline in an edge map.
///
/// The primary contour is the one with the largest enclosing circle; its raw
/// form, a smoothed polygon and its convex hull compete, and the roundest of
/// the three (highest radius ratio) becomes the face boundary.
pub fn locate_face(edges: &GrayImage, config: &FaceConfig) -> Result<ClockFace> {
    let contours = find_contours::<i32>(edges);
    debug!("Found {} contours in edge map", contours.len());

    let mut primary: Option<(Vec<Point<i32>>, f64)> = None;
    for contour in contours {
        if contour.points.is_empty() {
            continue;
        }
        let (_, radius) = min_enclosing_circle(&contour.points);
        let area = std::f64::consts::PI * radius * radius;
        // Ties keep the first contour found
        if primary.as_ref().is_none_or(|(_, best)| area > *best) {
            primary = Some((contour.points, area));
        }
    }
    let (primary, _) = primary.ok_or(ScoringError::NoClockFaceFound)?;

    let epsilon = config.approx_epsilon_ratio * arc_length(&primary, true);
    let hull = convex_hull(primary.as_slice());
    let mut simplified = approximate_polygon_dp(&primary, epsilon, true);

    let mut removals = 0u32;
    loop {
        let (next, stable) = smooth_contour(simplified, config.smoothing_tolerance);
        simplified = next;
        if stable {
            break;
        }
        removals += 1;
    }

    let fallback = Point::new((edges.width() / 2) as f64, (edges.height() / 2) as f64);
    let curves = [
        (CurveKind::Raw, measure_curve(primary.clone(), fallback)),
        (CurveKind::Simplified, measure_curve(simplified, fallback)),
        (CurveKind::Hull, measure_curve(hull, fallback)),
    ];

    let mut chosen = 0;
    for (i, (kind, curve)) in curves.iter().enumerate() {
        debug!(
            "{:?} curve: {} points, circularity={:.3}, radius_ratio={:.3}",
            kind,
            curve.points.len(),
            curve.circularity,
            curve.radius_ratio()
        );
        if curve.radius_ratio() > curves[chosen].1.radius_ratio() {
            chosen = i;
        }
    }

    let hull_circularity = curves[2].1.circularity;
    let [raw, simplified, hull] = curves;
    let (kind, boundary) = match chosen {
        1 => simplified,
        2 => hull,
        _ => raw,
    };
    if boundary.degenerate_moment {
        debug!("Boundary has zero area, centroid taken from image center");
    }

    let (circle_center, radius) = min_enclosing_circle(&boundary.points);
    let removed_points = if kind == CurveKind::Simplified { removals } else { 0 };

    Ok(ClockFace {
        boundary,
        kind,
        primary,
        circle_center,
        radius,
        removed_points,
        hull_circularity,
    })
}

/// Measure a closed curve; `fallback` stands in for the centroid when the
/// curve encloses no area
pub fn measure_curve(points: Vec<Point<i32>>, fallback: Point<f64>) -> ContourCandidate {
    let (m00, m10, m01) = polygon_moments(&points);
    let degenerate_moment = m00.abs() < EPS;
    let centroid = if degenerate_moment {
        fallback
    } else {
        Point::new(m10 / m00, m01 / m00)
    };

    let mut min_radius = f64::INFINITY;
    let mut max_radius = 0.0f64;
    for p in &points {
        let r = ((p.x as f64 - centroid.x).powi(2) + (p.y as f64 - centroid.y).powi(2)).sqrt();
        min_radius = min_radius.min(r);
        max_radius = max_radius.max(r);
    }
    if !min_radius.is_finite() {
        min_radius = 0.0;
    }

    let area = m00.abs();
    let perimeter = if points.len() > 1 { arc_length(&points, true) } else { 0.0 };
    let circularity = if perimeter > EPS {
        4.0 * std::f64::consts::PI * area / (perimeter * perimeter)
    } else {
        0.0
    };

    ContourCandidate {
        points,
        area,
        perimeter,
        circularity,
        centroid,
        min_radius,
        max_radius,
        degenerate_moment,
    }
}

/// Zeroth and first order moments of the polygon bounded by `points`
/// (Green's theorem over the closed outline; signed by orientation).
pub fn polygon_moments(points: &[Point<i32>]) -> (f64, f64, f64) {
    let n = points.len();
    if n < 3 {
        return (0.0, 0.0, 0.0);
    }
    let (mut m00, mut m10, mut m01) = (0.0, 0.0, 0.0);
    for i in 0..n {
        let (xi, yi) = (points[i].x as f64, points[i].y as f64);
        let next = points[(i + 1) % n];
        let (xj, yj) = (next.x as f64, next.y as f64);
        let cross = xi * yj - xj * yi;
        m00 += cross;
        m10 += cross * (xi + xj);
        m01 += cross * (yi + yj);
    }
    (m00 / 2.0, m10 / 6.0, m01 / 6.0)
}

/// Remove the vertex whose removal changes the enclosed area least, if that
/// change is below `tolerance` (relative to the polygon area).
///
/// Returns the polygon and whether it was already stable.
pub fn smooth_contour(polygon: Vec<Point<i32>>, tolerance: f64) -> (Vec<Point<i32>>, bool) {
    let n = polygon.len();
    if n <= 3 {
        return (polygon, true);
    }
    let total = polygon_moments(&polygon).0.abs();
    if total < EPS {
        return (polygon, true);
    }

    let mut cheapest: Option<(usize, f64)> = None;
    for i in 0..n {
        let prev = polygon[(i + n - 1) % n];
        let next = polygon[(i + 1) % n];
        let change = triangle_area(prev, polygon[i], next) / total;
        if cheapest.is_none_or(|(_, best)| change < best) {
            cheapest = Some((i, change));
        }
    }

    match cheapest {
        Some((i, change)) if change < tolerance => {
            let mut reduced = polygon;
            reduced.remove(i);
            (reduced, false)
        }
        _ => (polygon, true),
    }
}

fn triangle_area(a: Point<i32>, b: Point<i32>, c: Point<i32>) -> f64 {
    let abx = (b.x - a.x) as f64;
    let aby = (b.y - a.y) as f64;
    let acx = (c.x - a.x) as f64;
    let acy = (c.y - a.y) as f64;
    (abx * acy - aby * acx).abs() / 2.0
}

/// Smallest circle containing every point.
///
/// Runs the incremental construction over the convex hull, which has the
/// same enclosing circle as the full point set.
pub fn min_enclosing_circle(points: &[Point<i32>]) -> (Point<f64>, f64) {
    if points.is_empty() {
        return (Point::new(0.0, 0.0), 0.0);
    }
    let hull: Vec<Point<f64>> = convex_hull(points)
        .into_iter()
        .map(|p| Point::new(p.x as f64, p.y as f64))
        .collect();
    let pts = if hull.is_empty() {
        vec![Point::new(points[0].x as f64, points[0].y as f64)]
    } else {
        hull
    };

    let mut circle = (pts[0], 0.0);
    for i in 1..pts.len() {
        if contains(circle, pts[i]) {
            continue;
        }
        circle = (pts[i], 0.0);
        for j in 0..i {
            if contains(circle, pts[j]) {
                continue;
            }
            circle = circle_from_two(pts[i], pts[j]);
            for k in 0..j {
                if !contains(circle, pts[k]) {
                    circle = circle_from_three(pts[i], pts[j], pts[k]);
                }
            }
        }
    }
    circle
}

fn dist(a: Point<f64>, b: Point<f64>) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

fn contains(circle: (Point<f64>, f64), p: Point<f64>) -> bool {
    dist(circle.0, p) <= circle.1 * (1.0 + 1e-9) + 1e-7
}

fn circle_from_two(a: Point<f64>, b: Point<f64>) -> (Point<f64>, f64) {
    let center = Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
    (center, dist(a, b) / 2.0)
}

fn circle_from_three(a: Point<f64>, b: Point<f64>, c: Point<f64>) -> (Point<f64>, f64) {
    let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    if d.abs() < EPS {
        // Collinear: the widest pair spans the others
        let candidates = [circle_from_two(a, b), circle_from_two(a, c), circle_from_two(b, c)];
        return candidates
            .into_iter()
            .fold((a, 0.0), |best, cand| if cand.1 > best.1 { cand } else { best });
    }
    let a2 = a.x * a.x + a.y * a.y;
    let b2 = b.x * b.x + b.y * b.y;
    let c2 = c.x * c.x + c.y * c.y;
    let ux = (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d;
    let uy = (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d;
    let center = Point::new(ux, uy);
    (center, dist(center, a))
}
