mod common;

use common::*;
use std::path::Path;

#[test]
fn test_defaults_are_the_clinical_policy() {
    let config = ScoringConfig::default();
    assert_eq!(config.preprocess.ink_threshold, 240);
    assert_eq!(config.digits.acceptance_threshold, 0.5);
    assert_eq!(config.rubric.max_length_ratio, 0.9);
    assert_eq!(config.rubric.max_intersect_distance, 10.0);
    assert_eq!(config.rubric.min_circularity, 0.85);
    assert_eq!(config.rubric.min_radius_ratio, 0.75);
    assert!(config.validate().is_ok());
}

#[test]
fn test_json_overrides_only_named_fields() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("policy.json");
    std::fs::write(
        &path,
        r#"{ "rubric": { "max_intersect_distance": 12.5 }, "digits": { "layout": "nchw" } }"#,
    )?;

    let config = ScoringConfig::from_json_file(&path)?;
    assert_eq!(config.rubric.max_intersect_distance, 12.5);
    assert_eq!(config.rubric.max_length_ratio, 0.9);
    assert_eq!(config.digits.layout, clockscore::config::TensorLayout::Nchw);
    assert_eq!(config.regions, ScoringConfig::default().regions);
    Ok(())
}

#[test]
fn test_inconsistent_config_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("bad.json");
    std::fs::write(&path, r#"{ "regions": { "min_area": 500, "max_area": 100 } }"#)?;
    assert!(matches!(ScoringConfig::from_json_file(&path), Err(ScoringError::Config(_))));

    std::fs::write(&path, "{ not json")?;
    assert!(matches!(ScoringConfig::from_json_file(&path), Err(ScoringError::Config(_))));
    Ok(())
}

#[test]
fn test_missing_config_file_is_io_error() {
    let result = ScoringConfig::from_json_file(Path::new("/nonexistent/clockscore.json"));
    assert!(matches!(result, Err(ScoringError::Io(_))));
}

#[test]
fn test_missing_model_file_is_load_error() {
    let result = clockscore::RtenDigitModel::load(
        Path::new("/nonexistent/digits.rten"),
        clockscore::config::TensorLayout::Nhwc,
    );
    assert!(matches!(result, Err(ScoringError::ModelLoad { .. })));
}
