use crate::config::RubricConfig;
use crate::models::{FeatureVector, ScoreRecord};

/// Apply the rubric thresholds to a feature vector.
///
/// Hand criteria fail when their feature is absent.
pub fn score(features: &FeatureVector, rubric: &RubricConfig) -> ScoreRecord {
    let contour = features.circularity > rubric.min_circularity
        && features.radius_ratio > rubric.min_radius_ratio;
    let numbers = features.missing_digits == 0;
    // The hour hand must be strictly shorter than the minute hand
    let hand_length = features
        .length_ratio
        .is_some_and(|ratio| ratio < rubric.max_length_ratio);
    let hand_centering = features
        .intersect_distance
        .is_some_and(|d| d < rubric.max_intersect_distance);

    ScoreRecord::new(contour, numbers, hand_length, hand_centering)
}
