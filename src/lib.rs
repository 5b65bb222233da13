//! News-category classification: a pretrained sentence encoder feeding a
//! trainable multinomial logistic-regression head.
//!
//! The pipeline has two stages. An [`EmbeddingFeaturizer`] maps each document
//! to a fixed-length vector through an injected [`TextEmbedder`] handle
//! (usually a [`SentenceEncoder`] wrapping MiniLM via ONNX Runtime), and a
//! [`NewsCategoryClassifier`] owns the featurizer plus the linear head and
//! exposes fit, predict, and persistence.
//!
//! # Basic Usage
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use newscat::{
//!     BuiltinModel, Document, EmbeddingFeaturizer, NewsCategoryClassifier, SentenceEncoder,
//! };
//!
//! let encoder = Arc::new(SentenceEncoder::from_pretrained(BuiltinModel::MiniLM)?);
//! let mut classifier = NewsCategoryClassifier::new(EmbeddingFeaturizer::new(encoder));
//!
//! classifier.fit(
//!     &[
//!         "space rocket launch".into(),
//!         "stock market rises".into(),
//!         "new planet discovered".into(),
//!         "interest rates fall".into(),
//!     ],
//!     &[
//!         "science".into(),
//!         "business".into(),
//!         "science".into(),
//!         "business".into(),
//!     ],
//! )?;
//!
//! let scores = classifier.predict_proba(&Document::new("rover lands on mars", ""))?;
//! for (label, probability) in &scores {
//!     println!("{}: {:.3}", label, probability);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Sharing the encoder
//!
//! Encoder weights load once when the [`SentenceEncoder`] is constructed.
//! The handle is `Send + Sync`, so one encoder can back any number of
//! classifiers across threads:
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use newscat::{BuiltinModel, EmbeddingFeaturizer, NewsCategoryClassifier, SentenceEncoder, TextEmbedder};
//!
//! let encoder: Arc<dyn TextEmbedder> = Arc::new(SentenceEncoder::from_pretrained(BuiltinModel::MiniLM)?);
//! let mut sections = NewsCategoryClassifier::new(EmbeddingFeaturizer::new(Arc::clone(&encoder)));
//! let mut topics = NewsCategoryClassifier::new(EmbeddingFeaturizer::new(encoder));
//! # let _ = (&mut sections, &mut topics);
//! # Ok(())
//! # }
//! ```
//!
//! A fitted pipeline round-trips through [`NewsCategoryClassifier::dump`] and
//! [`NewsCategoryClassifier::load`]; the persisted blob carries the label set
//! and the trained head, while the encoder is re-injected at construction.

pub mod classifier;
pub mod encoder;
pub mod model_manager;
pub mod models;
mod runtime;

pub use classifier::{
    load_training_data, ClassifierError, Document, EmbeddingFeaturizer, LabeledDocument,
    NewsCategoryClassifier, PipelineInfo, TextEmbedder,
};
pub use encoder::SentenceEncoder;
pub use model_manager::{ModelError, ModelManager};
pub use models::{BuiltinModel, ModelCharacteristics, ModelInfo};
pub use runtime::{create_session_builder, RuntimeConfig};

pub fn init_logger() {
    env_logger::init();
}
