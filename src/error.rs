use thiserror::Error;

/// Failures that terminate scoring of a single image.
///
/// Recoverable degradations (zero-area curves, missing hand ink, hand clusters
/// too thin to measure) never show up here; they surface as absent features.
#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("No clock face found: the edge map contains no contour")]
    NoClockFaceFound,

    #[error("Digit classifier inference failed: {0}")]
    ClassifierInference(String),

    #[error("Failed to load model from '{path}': {reason}")]
    ModelLoad { path: String, reason: String },

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Image store error for '{id}': {reason}")]
    Store { id: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScoringError>;
