//! Sentence embedding via ONNX Runtime.
//!
//! [`SentenceEncoder`] wraps a sentence-transformers export (tokenizer +
//! ONNX graph) and produces mean-pooled, L2-normalized embeddings. It is the
//! concrete implementation of the [`TextEmbedder`] seam that the featurizer
//! consumes; constructing one loads the model weights once, and the handle
//! can then be shared across any number of classifiers.

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use crate::classifier::{ClassifierError, TextEmbedder};
use crate::model_manager::ModelManager;
use crate::models::{BuiltinModel, ModelCharacteristics};
use crate::runtime::{create_session_builder, RuntimeConfig};

/// Batch size used when featurizing training sets.
const ENCODE_BATCH: usize = 32;

/// A sentence encoder backed by a tokenizer and an ONNX Runtime session.
///
/// The session sits behind a mutex so the encoder is `Send + Sync` and can be
/// shared between classifier instances with `Arc`.
pub struct SentenceEncoder {
    model_path: String,
    tokenizer_path: String,
    tokenizer: Tokenizer,
    session: Mutex<Session>,
    characteristics: ModelCharacteristics,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<SentenceEncoder>();
    }
};

impl std::fmt::Debug for SentenceEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentenceEncoder")
            .field("model_path", &self.model_path)
            .field("tokenizer_path", &self.tokenizer_path)
            .field("embedding_size", &self.characteristics.embedding_size)
            .finish()
    }
}

impl SentenceEncoder {
    /// Loads a builtin model from the local cache.
    ///
    /// Fails if the model has not been downloaded yet; use
    /// [`ModelManager::ensure_model_downloaded`] first.
    pub fn from_pretrained(model: BuiltinModel) -> Result<Self, ClassifierError> {
        Self::from_pretrained_with_config(model, RuntimeConfig::default())
    }

    pub fn from_pretrained_with_config(
        model: BuiltinModel,
        config: RuntimeConfig,
    ) -> Result<Self, ClassifierError> {
        let manager = ModelManager::new_default().map_err(|e| {
            ClassifierError::ModelError(format!("Failed to create model manager: {}", e))
        })?;

        if !manager.is_model_downloaded(model) {
            return Err(ClassifierError::ModelError(format!(
                "Model '{:?}' is not downloaded. Download it first with ModelManager::ensure_model_downloaded()",
                model
            )));
        }

        Self::load(
            &manager.get_model_path(model),
            &manager.get_tokenizer_path(model),
            model.characteristics(),
            config,
        )
    }

    /// Loads an encoder from explicit model and tokenizer paths.
    ///
    /// The embedding size is read from the model's output signature, falling
    /// back to a probe inference when the signature leaves it dynamic.
    /// `max_sequence_length` defaults to 256 (the MiniLM limit) when not
    /// given.
    pub fn from_files(
        model_path: &str,
        tokenizer_path: &str,
        max_sequence_length: Option<usize>,
    ) -> Result<Self, ClassifierError> {
        if model_path.is_empty() || tokenizer_path.is_empty() {
            return Err(ClassifierError::ValidationError(
                "Model and tokenizer paths cannot be empty".into(),
            ));
        }
        if !Path::new(model_path).exists() {
            return Err(ClassifierError::ModelError(format!(
                "Model file not found: {}",
                model_path
            )));
        }
        if !Path::new(tokenizer_path).exists() {
            return Err(ClassifierError::ModelError(format!(
                "Tokenizer file not found: {}",
                tokenizer_path
            )));
        }

        let characteristics = ModelCharacteristics {
            embedding_size: 0, // resolved below
            max_sequence_length: max_sequence_length.unwrap_or(256),
            model_size_mb: 0,
        };
        let mut encoder = Self::load(
            Path::new(model_path),
            Path::new(tokenizer_path),
            characteristics,
            RuntimeConfig::default(),
        )?;

        if encoder.characteristics.embedding_size == 0 {
            let probe = encoder.embed("embedding size probe")?;
            log::info!("Inferred embedding size from probe inference: {}", probe.len());
            encoder.characteristics.embedding_size = probe.len();
        }

        Ok(encoder)
    }

    fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        mut characteristics: ModelCharacteristics,
        config: RuntimeConfig,
    ) -> Result<Self, ClassifierError> {
        let mut tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            log::error!("Failed to load tokenizer: {}", e);
            ClassifierError::TokenizerError(format!("Failed to load tokenizer: {}", e))
        })?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: characteristics.max_sequence_length,
                ..Default::default()
            }))
            .map_err(|e| ClassifierError::TokenizerError(format!("Failed to set truncation: {}", e)))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams::default()));

        let session = create_session_builder(&config)?.commit_from_file(model_path)?;
        Self::validate_model(&session)?;

        if characteristics.embedding_size == 0 {
            if let Some(dim) = output_embedding_size(&session) {
                log::info!("Embedding size from model signature: {}", dim);
                characteristics.embedding_size = dim;
            }
        }

        log::info!(
            "Loaded sentence encoder from {:?} (max {} tokens)",
            model_path,
            characteristics.max_sequence_length
        );

        Ok(Self {
            model_path: model_path.to_string_lossy().to_string(),
            tokenizer_path: tokenizer_path.to_string_lossy().to_string(),
            tokenizer,
            session: Mutex::new(session),
            characteristics,
        })
    }

    /// Checks that the graph has the transformer-encoder signature this crate
    /// drives: at least input_ids and attention_mask in, one tensor out.
    fn validate_model(session: &Session) -> Result<(), ClassifierError> {
        if session.inputs().len() < 2 {
            return Err(ClassifierError::ModelError(format!(
                "Model must have at least 2 inputs (input_ids and attention_mask), found {}",
                session.inputs().len()
            )));
        }
        if session.outputs().is_empty() {
            return Err(ClassifierError::ModelError(
                "Model must have at least 1 output for embeddings".to_string(),
            ));
        }
        Ok(())
    }

    pub fn model_path(&self) -> &str {
        &self.model_path
    }

    pub fn tokenizer_path(&self) -> &str {
        &self.tokenizer_path
    }

    pub fn characteristics(&self) -> &ModelCharacteristics {
        &self.characteristics
    }

    /// Number of tokens the tokenizer produces for `text`, after truncation.
    pub fn count_tokens(&self, text: &str) -> Result<usize, ClassifierError> {
        self.tokenizer
            .encode(text, true)
            .map(|encoding| encoding.get_ids().len())
            .map_err(|e| ClassifierError::TokenizerError(e.to_string()))
    }

    /// Embeds one text, returning a normalized vector.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, ClassifierError> {
        let mut vectors = self.encode_batch(&[text])?;
        vectors
            .pop()
            .ok_or_else(|| ClassifierError::ModelError("Empty embedding batch result".into()))
    }

    /// Embeds a batch of texts, returning one normalized vector per input in
    /// input order. Large batches are split so padding stays local.
    pub fn embed_all(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ClassifierError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(ENCODE_BATCH) {
            vectors.extend(self.encode_batch(chunk)?);
        }
        Ok(vectors)
    }

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ClassifierError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let batch_size = texts.len();
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| ClassifierError::TokenizerError(e.to_string()))?;

        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        // Flat [batch_size, seq_len] input tensors.
        let mut input_ids = vec![0i64; batch_size * seq_len];
        let mut attention_mask = vec![0i64; batch_size * seq_len];
        let mut token_type_ids = vec![0i64; batch_size * seq_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let offset = i * seq_len;
            for (j, &id) in encoding.get_ids().iter().enumerate() {
                input_ids[offset + j] = id as i64;
            }
            for (j, &mask) in encoding.get_attention_mask().iter().enumerate() {
                attention_mask[offset + j] = mask as i64;
            }
            for (j, &tid) in encoding.get_type_ids().iter().enumerate() {
                token_type_ids[offset + j] = tid as i64;
            }
        }

        let shape = [batch_size as i64, seq_len as i64];
        let ids_tensor = Tensor::from_array((shape, input_ids.into_boxed_slice()))?;
        let mask_tensor = Tensor::from_array((shape, attention_mask.clone().into_boxed_slice()))?;
        let type_tensor = Tensor::from_array((shape, token_type_ids.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ClassifierError::ModelError("ONNX session lock poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            ])
            .map_err(|e| ClassifierError::ModelError(format!("Failed to run model: {}", e)))?;

        // Token embeddings: [batch_size, seq_len, dim].
        let (output_shape, output_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::ModelError(format!("Failed to extract output: {}", e)))?;
        let dims: &[i64] = output_shape;
        if dims.len() != 3 || dims[0] as usize != batch_size {
            return Err(ClassifierError::ModelError(format!(
                "Unexpected output shape {:?}, expected [{}, {}, dim]",
                dims, batch_size, seq_len
            )));
        }
        let out_dim = dims[2] as usize;
        let expected = self.characteristics.embedding_size;
        if expected != 0 && out_dim != expected {
            return Err(ClassifierError::ModelError(format!(
                "Model produced {}-dimensional embeddings, expected {}",
                out_dim, expected
            )));
        }
        let actual_seq_len = dims[1] as usize;

        // Mean pooling over real tokens, then L2 normalization.
        let mut embeddings = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let mut pooled = vec![0.0f32; out_dim];
            let mut token_count = 0.0f32;

            for j in 0..actual_seq_len {
                let mask_val = attention_mask[i * seq_len + j] as f32;
                if mask_val > 0.0 {
                    let offset = (i * actual_seq_len + j) * out_dim;
                    for (d, p) in pooled.iter_mut().enumerate() {
                        *p += output_data[offset + d] * mask_val;
                    }
                    token_count += mask_val;
                }
            }

            if token_count > 0.0 {
                for p in &mut pooled {
                    *p /= token_count;
                }
            }
            normalize(&mut pooled);
            embeddings.push(pooled);
        }

        Ok(embeddings)
    }
}

impl TextEmbedder for SentenceEncoder {
    fn embedding_size(&self) -> usize {
        self.characteristics.embedding_size
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ClassifierError> {
        self.embed_all(texts)
    }
}

/// L2-normalize a vector in place.
fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Reads the embedding dimension from the model's output signature, when the
/// export declares it statically.
fn output_embedding_size(session: &Session) -> Option<usize> {
    match session.outputs()[0].dtype() {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_vectors() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn missing_files_are_rejected() {
        let result = SentenceEncoder::from_files("/nonexistent/model.onnx", "/nonexistent/tokenizer.json", None);
        assert!(matches!(result, Err(ClassifierError::ModelError(_))));

        let result = SentenceEncoder::from_files("", "", None);
        assert!(matches!(result, Err(ClassifierError::ValidationError(_))));
    }

    #[test]
    #[ignore = "requires the downloaded MiniLM model"]
    fn embeddings_are_normalized_and_fixed_size() -> Result<(), ClassifierError> {
        let encoder = SentenceEncoder::from_pretrained(BuiltinModel::MiniLM)?;
        let vector = encoder.embed("Stock markets rallied after the announcement")?;
        assert_eq!(vector.len(), 384);
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "expected unit norm, got {}", norm);
        Ok(())
    }

    #[test]
    #[ignore = "requires the downloaded MiniLM model"]
    fn similar_texts_are_closer() -> Result<(), ClassifierError> {
        let encoder = SentenceEncoder::from_pretrained(BuiltinModel::MiniLM)?;
        let rocket = encoder.embed("space rocket launch")?;
        let planet = encoder.embed("new planet discovered")?;
        let rates = encoder.embed("interest rates fall")?;

        let dot = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        assert!(dot(&rocket, &planet) > dot(&rocket, &rates));
        Ok(())
    }
}
