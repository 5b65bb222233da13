use std::fmt;

use ort::Error as OrtError;

/// Errors surfaced by the classification pipeline.
///
/// Every failure aborts the call and propagates to the caller; the pipeline
/// performs no retries and produces no fallback values.
#[derive(Debug)]
pub enum ClassifierError {
    /// Error while loading or running the tokenizer
    TokenizerError(String),
    /// Error while loading or running the embedding model
    ModelError(String),
    /// Training data is empty, mismatched in length, or has too few classes
    ShapeError(String),
    /// Operation requires a fitted pipeline and none is present
    StateError(String),
    /// The classifier solver failed to fit
    TrainingError(String),
    /// Saving or loading the fitted pipeline failed
    PersistError(String),
    /// Error caused by invalid input parameters
    ValidationError(String),
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenizerError(msg) => write!(f, "Tokenizer error: {}", msg),
            Self::ModelError(msg) => write!(f, "Model error: {}", msg),
            Self::ShapeError(msg) => write!(f, "Shape error: {}", msg),
            Self::StateError(msg) => write!(f, "State error: {}", msg),
            Self::TrainingError(msg) => write!(f, "Training error: {}", msg),
            Self::PersistError(msg) => write!(f, "Persistence error: {}", msg),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ClassifierError {}

impl From<OrtError> for ClassifierError {
    fn from(err: OrtError) -> Self {
        ClassifierError::ModelError(err.to_string())
    }
}
