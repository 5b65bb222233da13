//! Builtin sentence-embedding models known to the model manager.

/// Sentence-embedding models that can be fetched and loaded by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinModel {
    /// all-MiniLM-L6-v2: 384-dimensional embeddings, 256-token context.
    /// A good default for short news documents.
    MiniLM,
}

/// Static characteristics of an embedding model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCharacteristics {
    /// Dimension of the embedding vectors the model produces
    pub embedding_size: usize,
    /// Maximum number of tokens the model accepts per input
    pub max_sequence_length: usize,
    /// Approximate on-disk size, used for download messaging
    pub model_size_mb: usize,
}

/// Download coordinates for a builtin model.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Directory name under the models cache
    pub name: &'static str,
    pub model_url: &'static str,
    pub tokenizer_url: &'static str,
}

impl BuiltinModel {
    pub fn characteristics(&self) -> ModelCharacteristics {
        match self {
            Self::MiniLM => ModelCharacteristics {
                embedding_size: 384,
                max_sequence_length: 256,
                model_size_mb: 85,
            },
        }
    }

    pub fn get_model_info(&self) -> ModelInfo {
        match self {
            Self::MiniLM => ModelInfo {
                name: "all-MiniLM-L6-v2",
                model_url: "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx",
                tokenizer_url: "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json",
            },
        }
    }
}
