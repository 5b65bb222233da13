//! The two-stage classification pipeline and its building blocks.

mod error;
mod featurizer;
mod pipeline;

pub use error::ClassifierError;
pub use featurizer::{EmbeddingFeaturizer, TextEmbedder};
pub use pipeline::{
    load_training_data, Document, LabeledDocument, NewsCategoryClassifier, PipelineInfo,
};
