mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from clockscore for tests
pub use clockscore::detection::preprocessing::GrayF32;
pub use clockscore::models::{DetectorView, DigitBox, FeatureVector, ScoreRecord, NUM_CLASSES};
pub use clockscore::{DigitModel, Pipeline, ScoringConfig, ScoringError};
