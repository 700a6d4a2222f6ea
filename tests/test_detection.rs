mod common;

use clockscore::config::{DigitConfig, FaceConfig, RegionConfig};
use clockscore::detection::census::{angle_spacing, DigitCensus};
use clockscore::detection::classifier::to_distribution;
use clockscore::detection::contours::{locate_face, measure_curve};
use clockscore::detection::digits::{angle_priors, decide, fuse};
use clockscore::detection::preprocessing::preprocess;
use clockscore::detection::regions::{dedup_boxes, detect_regions};
use clockscore::models::GARBAGE_CLASS;
use imageproc::geometry::convex_hull;
use common::*;
use image::{GrayImage, Luma};
use imageproc::point::Point;

fn boxed(x: u32, y: u32, width: u32, height: u32) -> DigitBox {
    DigitBox::new(x, y, width, height, DetectorView::Threshold)
}

fn overlaps_too_much(a: &DigitBox, b: &DigitBox, threshold: f64) -> bool {
    let smaller = a.area().min(b.area());
    smaller > 0 && a.intersection_area(b) as f64 >= threshold * smaller as f64
}

#[test]
fn test_dedup_keeps_larger_of_overlapping_pair() {
    let big = boxed(10, 10, 20, 20);
    let small = boxed(15, 15, 10, 10);
    let kept = dedup_boxes(&[small, big], 0.5);
    assert_eq!(kept, vec![big]);
}

#[test]
fn test_dedup_keeps_disjoint_boxes() {
    let a = boxed(0, 0, 10, 10);
    let b = boxed(30, 30, 10, 10);
    let kept = dedup_boxes(&[a, b], 0.5);
    assert_eq!(kept.len(), 2);
}

#[test]
fn test_dedup_collapses_identical_boxes_from_different_views() {
    let a = boxed(5, 5, 12, 12);
    let b = DigitBox::new(5, 5, 12, 12, DetectorView::Grayscale);
    let kept = dedup_boxes(&[a, b, a], 0.5);
    assert_eq!(kept.len(), 1);
    assert!(kept[0].same_rect(&a));
}

#[test]
fn test_dedup_result_has_no_conflicts_and_ignores_order() {
    let candidates: Vec<DigitBox> = (0..40u32)
        .map(|i| boxed((i * 7) % 50, (i * 13) % 50, 8 + i % 9, 6 + (i * 5) % 11))
        .collect();
    let kept = dedup_boxes(&candidates, 0.5);

    for (i, a) in kept.iter().enumerate() {
        for b in &kept[i + 1..] {
            assert!(!overlaps_too_much(a, b, 0.5), "{:?} and {:?} conflict", a, b);
        }
    }

    let mut reversed = candidates.clone();
    reversed.reverse();
    assert_eq!(dedup_boxes(&reversed, 0.5), kept);
}

#[test]
fn test_equal_area_tie_has_single_deterministic_survivor() {
    let left = boxed(10, 10, 10, 10);
    let right = boxed(14, 10, 10, 10);
    let kept = dedup_boxes(&[right, left], 0.5);
    assert_eq!(kept, vec![left]);
    assert_eq!(dedup_boxes(&[left, right], 0.5), kept);
}

#[test]
fn test_census_counts_depend_only_on_labels() {
    let labels = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 1, 0, 1, 1, 1, 2];
    let full = DigitCensus::from_labels(labels);
    assert_eq!(full.missing, 0);
    assert_eq!(full.extra, 0);

    let mut shuffled = labels;
    shuffled.reverse();
    shuffled.swap(0, 7);
    assert_eq!(DigitCensus::from_labels(shuffled), full);
}

#[test]
fn test_census_reports_missing_and_extra() {
    // One "7" short and a second "3"
    let census = DigitCensus::from_labels([1u8, 2, 3, 3, 4, 5, 6, 8, 9, 1, 0, 1, 1, 1, 2]);
    assert_eq!(census.missing, 1);
    assert_eq!(census.extra, 1);

    let empty = DigitCensus::from_labels(std::iter::empty());
    assert_eq!(empty.missing, 15);
}

#[test]
fn test_angle_spacing_needs_two_clusters() {
    assert_eq!(angle_spacing(&[]), None);
    assert_eq!(angle_spacing(&[42.0]), None);
    let (mean, _) = angle_spacing(&[10.0, 40.0, 70.0]).unwrap();
    assert!((mean - 30.0).abs() < 1e-9);
}

#[test]
fn test_fused_distribution_sums_to_one() -> anyhow::Result<()> {
    let probs = [0.05, 0.3, 0.05, 0.1, 0.05, 0.05, 0.1, 0.05, 0.05, 0.1, 0.1];
    for angle in [0.0f32, 37.5, 90.0, 151.0, 270.0, 359.0] {
        let fused = fuse(&probs, &angle_priors(angle, 15.0))?;
        let total: f32 = fused.iter().sum();
        assert!((total - 1.0).abs() < 1e-6, "sum {} at {}", total, angle);
    }
    Ok(())
}

#[test]
fn test_prior_favours_digit_at_its_position() -> anyhow::Result<()> {
    // The classifier cannot tell 3 from 9; position decides
    let mut probs = [0.0f32; NUM_CLASSES];
    probs[3] = 0.5;
    probs[9] = 0.5;
    let fused = fuse(&probs, &angle_priors(0.0, 15.0))?;
    let (label, _) = decide(&fused, 4.0, &DigitConfig::default()).unwrap();
    assert_eq!(label, 3);
    Ok(())
}

#[test]
fn test_confident_garbage_rejects_box() -> anyhow::Result<()> {
    let mut probs = [0.0f32; NUM_CLASSES];
    probs[GARBAGE_CLASS] = 0.9;
    probs[3] = 0.1;
    let fused = fuse(&probs, &angle_priors(0.0, 15.0))?;
    assert_eq!(decide(&fused, 4.0, &DigitConfig::default()), None);
    Ok(())
}

#[test]
fn test_marginal_garbage_yields_to_best_digit() -> anyhow::Result<()> {
    let mut probs = [0.0f32; NUM_CLASSES];
    probs[GARBAGE_CLASS] = 0.55;
    probs[3] = 0.45;
    let fused = fuse(&probs, &angle_priors(0.0, 15.0))?;
    let (label, posterior) = decide(&fused, 4.0, &DigitConfig::default()).unwrap();
    assert_eq!(label, 3);
    assert!(posterior > 0.5);
    Ok(())
}

#[test]
fn test_weak_posterior_is_not_accepted() -> anyhow::Result<()> {
    let mut probs = [0.0f32; NUM_CLASSES];
    probs[3] = 1.0;
    let fused = fuse(&probs, &angle_priors(0.0, 15.0))?;
    // Far from the expected ring the radial weight is tiny
    assert_eq!(decide(&fused, 0.1, &DigitConfig::default()), None);
    Ok(())
}

#[test]
fn test_malformed_classifier_output_is_an_error() {
    assert!(matches!(
        to_distribution(&[0.5, 0.5, 0.0]),
        Err(ScoringError::ClassifierInference(_))
    ));
    let mut bad = [0.0f32; NUM_CLASSES];
    bad[2] = f32::NAN;
    assert!(matches!(to_distribution(&bad), Err(ScoringError::ClassifierInference(_))));
    assert!(to_distribution(&[0.1f32; NUM_CLASSES]).is_ok());
}

#[test]
fn test_all_zero_classifier_output_is_an_error() {
    let zeros = [0.0f32; NUM_CLASSES];
    assert!(matches!(
        fuse(&zeros, &angle_priors(0.0, 15.0)),
        Err(ScoringError::ClassifierInference(_))
    ));
}

#[test]
fn test_dense_circle_is_round() {
    // Vertices far apart so pixel rounding does not add a staircase
    let points: Vec<Point<i32>> = (0..90)
        .map(|i| {
            let t = (i as f64 * 4.0).to_radians();
            Point::new(
                (1200.0 + 1000.0 * t.cos()).round() as i32,
                (1200.0 + 1000.0 * t.sin()).round() as i32,
            )
        })
        .collect();
    let curve = measure_curve(points, Point::new(0.0, 0.0));
    assert!((curve.circularity - 1.0).abs() < 0.02, "circularity {}", curve.circularity);
    assert!(curve.radius_ratio() > 0.98);
    assert!((curve.centroid.x - 1200.0).abs() < 0.5);
    assert!(!curve.degenerate_moment);
}

#[test]
fn test_empty_edge_map_has_no_face() {
    let edges = GrayImage::from_pixel(100, 100, Luma([0u8]));
    assert!(matches!(
        locate_face(&edges, &FaceConfig::default()),
        Err(ScoringError::NoClockFaceFound)
    ));
}

#[test]
fn test_drawn_face_is_located() -> anyhow::Result<()> {
    let img = render_clock(&ClockDrawing::default());
    let views = preprocess(&img, &Default::default())?;
    let face = locate_face(&views.edges, &FaceConfig::default())?;

    let center = face.center();
    assert!((center.x - 200.0).abs() < 3.0 && (center.y - 200.0).abs() < 3.0);
    assert!((face.radius - FACE_RADIUS).abs() < 8.0, "radius {}", face.radius);
    assert!(face.boundary.circularity > 0.85);
    assert!(face.boundary.radius_ratio() > 0.75);
    assert!(face.center_deviation() < 3.0);
    Ok(())
}

#[test]
fn test_face_reports_hull_circularity() -> anyhow::Result<()> {
    let img = render_clock(&ClockDrawing::default());
    let views = preprocess(&img, &Default::default())?;
    let face = locate_face(&views.edges, &FaceConfig::default())?;

    let hull = measure_curve(convex_hull(face.primary.as_slice()), face.center());
    assert!((face.hull_circularity - hull.circularity).abs() < 1e-9);
    assert!(face.hull_circularity > 0.85);
    Ok(())
}

#[test]
fn test_glyphs_become_candidate_boxes() -> anyhow::Result<()> {
    let img = render_clock(&ClockDrawing {
        hands: false,
        ..ClockDrawing::default()
    });
    let views = preprocess(&img, &Default::default())?;
    let config = RegionConfig::default();
    let boxes = dedup_boxes(
        &detect_regions(&views.threshold, &config, DetectorView::Threshold),
        config.intersect_threshold,
    );

    // The binarized "3" bar at 3 o'clock, grown by a pixel on every side
    let (gx, gy) = polar_point(0.0, DIGIT_RADIUS);
    let expected_width = glyph_width(3) + 2;
    assert!(boxes.iter().any(|b| {
        let (cx, cy) = b.center();
        b.width == expected_width
            && b.height == GLYPH_HEIGHT + 2
            && (cx - gx).abs() < 2.0
            && (cy - gy).abs() < 2.0
    }));
    // Nothing larger than the side limit survives, so the face ring is gone
    assert!(boxes.iter().all(|b| b.width <= config.max_box_side && b.height <= config.max_box_side));
    Ok(())
}
