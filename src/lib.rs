pub mod annotate;
pub mod config;
pub mod detection;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod scoring;
pub mod store;

pub use config::ScoringConfig;
pub use detection::{DigitModel, RtenDigitModel};
pub use error::{Result, ScoringError};
pub use models::{ClockFace, DigitBox, DigitDetection, FeatureVector, ScoreRecord};
pub use pipeline::{Analysis, DebugConfig, Pipeline, ScoringOutcome};
pub use scoring::score;
pub use store::{DirImageStore, ImageStore, JsonLinesScoreSink, MemoryScoreSink, PersistedScore, ScoreSink};
