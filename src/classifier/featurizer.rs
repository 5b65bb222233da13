//! The embedding featurizer: first stage of the pipeline.

use std::sync::Arc;

use ndarray::Array2;

use super::error::ClassifierError;

/// A handle to a pretrained text-embedding function.
///
/// This is the seam between the pipeline and the embedding model: the
/// featurizer receives a pre-constructed handle instead of loading weights
/// itself, so a single encoder can back many classifiers and tests can
/// substitute a deterministic implementation.
pub trait TextEmbedder: Send + Sync {
    /// Dimension of the vectors [`embed_batch`](Self::embed_batch) produces.
    fn embedding_size(&self) -> usize;

    /// Embeds each text, returning one vector per input in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ClassifierError>;

    /// Embeds a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, ClassifierError> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| ClassifierError::ModelError("Embedder returned no vector".into()))
    }
}

/// Maps documents to embedding vectors through an injected encoder.
///
/// Stateless with respect to training data: [`fit`](Self::fit) is a no-op
/// kept for fit/transform composability, and [`transform`](Self::transform)
/// only forwards to the encoder.
#[derive(Clone)]
pub struct EmbeddingFeaturizer {
    embedder: Arc<dyn TextEmbedder>,
}

impl std::fmt::Debug for EmbeddingFeaturizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingFeaturizer")
            .field("embedding_size", &self.embedder.embedding_size())
            .finish()
    }
}

impl EmbeddingFeaturizer {
    pub fn new(embedder: Arc<dyn TextEmbedder>) -> Self {
        Self { embedder }
    }

    pub fn embedding_size(&self) -> usize {
        self.embedder.embedding_size()
    }

    /// Nothing to learn from training data.
    pub fn fit(&mut self, _documents: &[String]) -> &mut Self {
        self
    }

    /// Embeds every document, preserving order.
    pub fn transform(&self, documents: &[String]) -> Result<Vec<Vec<f32>>, ClassifierError> {
        let texts: Vec<&str> = documents.iter().map(String::as_str).collect();
        let vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != documents.len() {
            return Err(ClassifierError::ModelError(format!(
                "Embedder returned {} vectors for {} documents",
                vectors.len(),
                documents.len()
            )));
        }
        Ok(vectors)
    }

    /// Embeds one document.
    pub fn transform_one(&self, document: &str) -> Result<Vec<f32>, ClassifierError> {
        self.embedder.embed(document)
    }

    /// Embeds every document into an `f64` feature matrix for the classifier,
    /// one row per document.
    pub fn feature_matrix(&self, documents: &[String]) -> Result<Array2<f64>, ClassifierError> {
        let vectors = self.transform(documents)?;
        let dim = self.embedding_size();
        let mut flat = Vec::with_capacity(documents.len() * dim);
        for (i, vector) in vectors.iter().enumerate() {
            if vector.len() != dim {
                return Err(ClassifierError::ModelError(format!(
                    "Document {} embedded to {} dimensions, expected {}",
                    i,
                    vector.len(),
                    dim
                )));
            }
            flat.extend(vector.iter().map(|&x| x as f64));
        }
        Array2::from_shape_vec((documents.len(), dim), flat)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to build feature matrix: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ConstantEmbedder {
        dim: usize,
    }

    impl TextEmbedder for ConstantEmbedder {
        fn embedding_size(&self) -> usize {
            self.dim
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ClassifierError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32; self.dim]).collect())
        }
    }

    #[test]
    fn transform_preserves_order_and_length() {
        let featurizer = EmbeddingFeaturizer::new(Arc::new(ConstantEmbedder { dim: 4 }));
        let docs = vec!["a".to_string(), "abc".to_string()];
        let vectors = featurizer.transform(&docs).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![1.0; 4]);
        assert_eq!(vectors[1], vec![3.0; 4]);
    }

    #[test]
    fn feature_matrix_has_one_row_per_document() {
        let featurizer = EmbeddingFeaturizer::new(Arc::new(ConstantEmbedder { dim: 3 }));
        let docs = vec!["xy".to_string(), "z".to_string()];
        let matrix = featurizer.feature_matrix(&docs).unwrap();
        assert_eq!(matrix.shape(), &[2, 3]);
        assert_eq!(matrix[[0, 0]], 2.0);
        assert_eq!(matrix[[1, 2]], 1.0);
    }

    #[test]
    fn fit_is_a_no_op() {
        let mut featurizer = EmbeddingFeaturizer::new(Arc::new(ConstantEmbedder { dim: 2 }));
        featurizer.fit(&["anything".to_string()]);
        assert_eq!(featurizer.embedding_size(), 2);
    }
}
