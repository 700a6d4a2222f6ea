mod common;

use clockscore::config::RubricConfig;
use clockscore::score;
use common::*;

fn well_drawn() -> FeatureVector {
    FeatureVector {
        circularity: 0.90,
        radius_ratio: 0.80,
        missing_digits: 0,
        length_ratio: Some(0.6),
        intersect_distance: Some(4.0),
        ..Default::default()
    }
}

#[test]
fn test_well_drawn_clock_scores_four() {
    let record = score(&well_drawn(), &RubricConfig::default());
    assert_eq!(record, ScoreRecord::new(true, true, true, true));
    assert_eq!(record.aggregate, 4);
    assert_eq!(record.scores(), [1, 1, 1, 1]);
}

#[test]
fn test_equal_hands_fail_hand_length() {
    let features = FeatureVector {
        length_ratio: Some(0.95),
        ..well_drawn()
    };
    let record = score(&features, &RubricConfig::default());
    assert_eq!(record.hand_length, 0);
    assert_eq!(record.aggregate, 3);
}

#[test]
fn test_missing_digit_fails_numbers() {
    let features = FeatureVector {
        missing_digits: 1,
        ..well_drawn()
    };
    let record = score(&features, &RubricConfig::default());
    assert_eq!(record.numbers, 0);
    assert_eq!(record.aggregate, 3);
}

#[test]
fn test_extra_digits_do_not_affect_numbers() {
    let features = FeatureVector {
        extra_digits: 3,
        ..well_drawn()
    };
    assert_eq!(score(&features, &RubricConfig::default()).numbers, 1);
}

#[test]
fn test_absent_hand_features_score_zero() {
    let features = FeatureVector {
        length_ratio: None,
        intersect_distance: None,
        ..well_drawn()
    };
    let record = score(&features, &RubricConfig::default());
    assert_eq!(record.hand_length, 0);
    assert_eq!(record.hand_centering, 0);
    assert_eq!(record.aggregate, 2);
}

#[test]
fn test_contour_needs_both_shape_criteria() {
    let rubric = RubricConfig::default();
    let oval = FeatureVector {
        radius_ratio: 0.70,
        ..well_drawn()
    };
    assert_eq!(score(&oval, &rubric).contour, 0);

    let jagged = FeatureVector {
        circularity: 0.80,
        ..well_drawn()
    };
    assert_eq!(score(&jagged, &rubric).contour, 0);
}

#[test]
fn test_thresholds_are_strict() {
    let rubric = RubricConfig::default();
    let on_the_line = FeatureVector {
        circularity: 0.85,
        radius_ratio: 0.75,
        length_ratio: Some(0.9),
        intersect_distance: Some(10.0),
        ..well_drawn()
    };
    let record = score(&on_the_line, &rubric);
    assert_eq!(record.scores(), [0, 1, 0, 0]);
}

#[test]
fn test_record_serializes_with_rubric_names() -> anyhow::Result<()> {
    let record = score(&well_drawn(), &RubricConfig::default());
    let json = serde_json::to_value(record)?;
    assert_eq!(json["Contour"], 1);
    assert_eq!(json["Hand_Length"], 1);
    assert_eq!(json["Hand_Centering"], 1);
    assert_eq!(json["Aggregate"], 4);
    assert_eq!(record.responses(), vec!["1", "1", "1", "1"]);
    Ok(())
}

#[test]
fn test_absent_features_are_left_out_of_json() -> anyhow::Result<()> {
    let json = serde_json::to_value(FeatureVector::default())?;
    assert!(json.get("LengthRatio").is_none());
    assert!(json.get("IntersectDistance").is_none());
    assert_eq!(json["MissingDigits"], 0);

    let json = serde_json::to_value(FeatureVector {
        bb_ratio: Some(0.5),
        ..Default::default()
    })?;
    assert_eq!(json["BBRatio"], 0.5);
    Ok(())
}
