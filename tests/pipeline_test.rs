use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use newscat::{
    ClassifierError, Document, EmbeddingFeaturizer, NewsCategoryClassifier, TextEmbedder,
};

/// Deterministic stand-in for the sentence encoder: hashed bag-of-tokens,
/// L2-normalized. Distinct topics land on distinct buckets, which is all the
/// linear head needs.
struct HashedEmbedder {
    dim: usize,
}

impl HashedEmbedder {
    fn new(dim: usize) -> Arc<Self> {
        Arc::new(Self { dim })
    }
}

impl TextEmbedder for HashedEmbedder {
    fn embedding_size(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ClassifierError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; self.dim];
                for token in text.split_whitespace() {
                    let mut bucket = 0usize;
                    for byte in token.bytes() {
                        bucket = bucket.wrapping_mul(31).wrapping_add(byte as usize);
                    }
                    vector[bucket % self.dim] += 1.0;
                }
                let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for x in &mut vector {
                        *x /= norm;
                    }
                }
                vector
            })
            .collect())
    }
}

fn news_training_set() -> (Vec<String>, Vec<String>) {
    let x = vec![
        "space rocket launch".to_string(),
        "stock market rises".to_string(),
        "new planet discovered".to_string(),
        "interest rates fall".to_string(),
    ];
    let y = vec![
        "science".to_string(),
        "business".to_string(),
        "science".to_string(),
        "business".to_string(),
    ];
    (x, y)
}

fn fitted_classifier() -> NewsCategoryClassifier {
    let mut classifier =
        NewsCategoryClassifier::new(EmbeddingFeaturizer::new(HashedEmbedder::new(256)));
    let (x, y) = news_training_set();
    classifier.fit(&x, &y).expect("fit should succeed");
    classifier
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(name)
}

#[test]
fn fit_caches_sorted_distinct_labels() {
    let classifier = fitted_classifier();
    assert_eq!(
        classifier.classes(),
        Some(&["business".to_string(), "science".to_string()][..])
    );
    assert!(classifier.is_ready());
}

#[test]
fn scenario_space_rocket_is_science_with_confidence() {
    let classifier = fitted_classifier();
    let input = Document::new("space rocket launch", "");

    let label = classifier.predict_label(&input).unwrap();
    assert_eq!(label, "science");

    let scores = classifier.predict_proba(&input).unwrap();
    assert!(
        scores["science"] > 0.5,
        "expected confident science prediction, got {:?}",
        scores
    );
}

#[test]
fn probabilities_are_a_distribution_over_the_label_set() {
    let classifier = fitted_classifier();
    let scores = classifier
        .predict_proba(&Document::new("markets and rockets", "mixed news"))
        .unwrap();

    let mut keys: Vec<_> = scores.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, vec!["business".to_string(), "science".to_string()]);

    let total: f32 = scores.values().sum();
    assert!((total - 1.0).abs() < 1e-6, "probabilities sum to {}", total);
    assert!(scores.values().all(|&p| p >= 0.0));
}

#[test]
fn predict_label_matches_argmax_of_predict_proba() {
    let classifier = fitted_classifier();
    for text in ["space rocket launch", "interest rates fall", "unrelated words"] {
        let input = Document::new(text, "");
        let scores = classifier.predict_proba(&input).unwrap();
        let label = classifier.predict_label(&input).unwrap();

        let max = scores.values().cloned().fold(0.0f32, f32::max);
        assert_eq!(
            scores[&label], max,
            "label {} does not carry the maximum probability for {:?}",
            label, text
        );
    }
}

#[test]
fn predict_before_fit_is_a_state_error() {
    let classifier =
        NewsCategoryClassifier::new(EmbeddingFeaturizer::new(HashedEmbedder::new(256)));
    let result = classifier.predict_proba(&Document::new("anything", ""));
    assert!(matches!(result, Err(ClassifierError::StateError(_))));

    let result = classifier.predict_label(&Document::new("anything", ""));
    assert!(matches!(result, Err(ClassifierError::StateError(_))));
}

#[test]
fn dump_before_fit_is_a_state_error() {
    let classifier =
        NewsCategoryClassifier::new(EmbeddingFeaturizer::new(HashedEmbedder::new(256)));
    let result = classifier.dump(temp_path("newscat-test-unfitted.json"));
    assert!(matches!(result, Err(ClassifierError::StateError(_))));
}

#[test]
fn empty_training_set_is_a_shape_error() {
    let mut classifier =
        NewsCategoryClassifier::new(EmbeddingFeaturizer::new(HashedEmbedder::new(256)));
    let result = classifier.fit(&[], &[]);
    assert!(matches!(result, Err(ClassifierError::ShapeError(_))));
}

#[test]
fn mismatched_lengths_are_a_shape_error() {
    let mut classifier =
        NewsCategoryClassifier::new(EmbeddingFeaturizer::new(HashedEmbedder::new(256)));
    let result = classifier.fit(
        &["one doc".to_string()],
        &["a".to_string(), "b".to_string()],
    );
    assert!(matches!(result, Err(ClassifierError::ShapeError(_))));
}

#[test]
fn single_class_is_a_shape_error() {
    let mut classifier =
        NewsCategoryClassifier::new(EmbeddingFeaturizer::new(HashedEmbedder::new(256)));
    let result = classifier.fit(
        &["one".to_string(), "two".to_string()],
        &["same".to_string(), "same".to_string()],
    );
    assert!(matches!(result, Err(ClassifierError::ShapeError(_))));
}

#[test]
fn failed_fit_keeps_previous_state() {
    let mut classifier = fitted_classifier();
    let result = classifier.fit(&["doc".to_string()], &["only".to_string()]);
    assert!(result.is_err());
    assert!(classifier.is_ready());
    assert_eq!(classifier.classes().map(|c| c.len()), Some(2));
}

#[test]
fn refit_replaces_the_label_set_wholesale() {
    let mut classifier = fitted_classifier();
    classifier
        .fit(
            &[
                "team wins final".to_string(),
                "summit ends without deal".to_string(),
            ],
            &["sports".to_string(), "world".to_string()],
        )
        .unwrap();
    assert_eq!(
        classifier.classes(),
        Some(&["sports".to_string(), "world".to_string()][..])
    );
}

#[test]
fn dump_then_load_round_trips_predictions() {
    let path = temp_path("newscat-test-roundtrip.json");
    let classifier = fitted_classifier();
    classifier.dump(&path).unwrap();

    // Fresh instance, no prior fit: load alone must produce a ready pipeline.
    let mut restored =
        NewsCategoryClassifier::new(EmbeddingFeaturizer::new(HashedEmbedder::new(256)));
    assert!(!restored.is_ready());
    restored.load(&path).unwrap();
    assert!(restored.is_ready());
    assert_eq!(restored.classes(), classifier.classes());

    for text in ["space rocket launch", "stock market rises", "other"] {
        let input = Document::new(text, "round trip probe");
        let before = classifier.predict_proba(&input).unwrap();
        let after = restored.predict_proba(&input).unwrap();
        for (label, probability) in &before {
            assert!(
                (probability - after[label]).abs() < 1e-6,
                "probability for {} drifted across dump/load",
                label
            );
        }
    }

    let _ = fs::remove_file(&path);
}

#[test]
fn dump_overwrites_existing_file() {
    let path = temp_path("newscat-test-overwrite.json");
    fs::write(&path, "stale contents").unwrap();

    let classifier = fitted_classifier();
    classifier.dump(&path).unwrap();

    let mut restored =
        NewsCategoryClassifier::new(EmbeddingFeaturizer::new(HashedEmbedder::new(256)));
    restored.load(&path).unwrap();

    let _ = fs::remove_file(&path);
}

#[test]
fn load_missing_file_is_a_persist_error() {
    let mut classifier =
        NewsCategoryClassifier::new(EmbeddingFeaturizer::new(HashedEmbedder::new(256)));
    let result = classifier.load(temp_path("newscat-test-does-not-exist.json"));
    assert!(matches!(result, Err(ClassifierError::PersistError(_))));
    assert!(!classifier.is_ready());
}

#[test]
fn load_corrupt_file_is_a_persist_error() {
    let path = temp_path("newscat-test-corrupt.json");
    fs::write(&path, "this is not a pipeline").unwrap();

    let mut classifier =
        NewsCategoryClassifier::new(EmbeddingFeaturizer::new(HashedEmbedder::new(256)));
    let result = classifier.load(&path);
    assert!(matches!(result, Err(ClassifierError::PersistError(_))));

    let _ = fs::remove_file(&path);
}

#[test]
fn load_rejects_unknown_format_version() {
    let path = temp_path("newscat-test-version.json");
    let classifier = fitted_classifier();
    classifier.dump(&path).unwrap();

    // A blob from a future format version must be refused, not half-read.
    let blob = fs::read_to_string(&path).unwrap();
    assert!(blob.contains("\"format_version\":1"));
    fs::write(&path, blob.replace("\"format_version\":1", "\"format_version\":99")).unwrap();

    let mut restored =
        NewsCategoryClassifier::new(EmbeddingFeaturizer::new(HashedEmbedder::new(256)));
    let result = restored.load(&path);
    assert!(matches!(result, Err(ClassifierError::PersistError(_))));
    assert!(!restored.is_ready());

    let _ = fs::remove_file(&path);
}

#[test]
fn training_data_loads_from_json() {
    use newscat::load_training_data;

    let path = temp_path("newscat-test-training.json");
    fs::write(
        &path,
        r#"[
            {"text": "space rocket launch", "label": "science"},
            {"text": "stock market rises", "label": "business"}
        ]"#,
    )
    .unwrap();

    let samples = load_training_data(&path).unwrap();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].label, "science");

    fs::write(&path, "not json at all").unwrap();
    assert!(matches!(
        load_training_data(&path),
        Err(ClassifierError::PersistError(_))
    ));

    let _ = fs::remove_file(&path);
}

#[test]
fn load_rejects_mismatched_embedding_dimension() {
    let path = temp_path("newscat-test-dim-mismatch.json");
    let classifier = fitted_classifier(); // 256-dimensional embedder
    classifier.dump(&path).unwrap();

    let mut other =
        NewsCategoryClassifier::new(EmbeddingFeaturizer::new(HashedEmbedder::new(128)));
    let result = other.load(&path);
    assert!(matches!(result, Err(ClassifierError::PersistError(_))));
    assert!(!other.is_ready());

    let _ = fs::remove_file(&path);
}

#[test]
fn info_reflects_pipeline_state() {
    let mut classifier =
        NewsCategoryClassifier::new(EmbeddingFeaturizer::new(HashedEmbedder::new(256)));
    let info = classifier.info();
    assert!(!info.ready);
    assert_eq!(info.num_classes, 0);
    assert_eq!(info.embedding_size, 256);

    let (x, y) = news_training_set();
    classifier.fit(&x, &y).unwrap();
    let info = classifier.info();
    assert!(info.ready);
    assert_eq!(info.num_classes, 2);
    assert_eq!(
        info.class_labels,
        vec!["business".to_string(), "science".to_string()]
    );
}

#[test]
fn four_way_classification_stays_consistent() {
    let mut classifier =
        NewsCategoryClassifier::new(EmbeddingFeaturizer::new(HashedEmbedder::new(256)));
    let x: Vec<String> = vec![
        "space rocket launch".into(),
        "new planet discovered".into(),
        "stock market rises".into(),
        "interest rates fall".into(),
        "team wins championship".into(),
        "sprinter breaks record".into(),
        "summit ends without deal".into(),
        "election results contested".into(),
    ];
    let y: Vec<String> = vec![
        "science".into(),
        "science".into(),
        "business".into(),
        "business".into(),
        "sports".into(),
        "sports".into(),
        "world".into(),
        "world".into(),
    ];
    classifier.fit(&x, &y).unwrap();
    assert_eq!(classifier.classes().map(|c| c.len()), Some(4));

    let input = Document::new("team wins championship", "");
    assert_eq!(classifier.predict_label(&input).unwrap(), "sports");

    let scores = classifier.predict_proba(&input).unwrap();
    let total: f32 = scores.values().sum();
    assert!((total - 1.0).abs() < 1e-6);
    assert_eq!(scores.len(), 4);
}

#[tokio::test]
#[ignore = "requires the downloaded MiniLM model"]
async fn end_to_end_with_real_encoder() -> Result<(), Box<dyn std::error::Error>> {
    use newscat::{BuiltinModel, ModelManager, SentenceEncoder};

    let manager = ModelManager::new_default()?;
    manager.ensure_model_downloaded(BuiltinModel::MiniLM).await?;

    let encoder = Arc::new(SentenceEncoder::from_pretrained(BuiltinModel::MiniLM)?);
    let mut classifier = NewsCategoryClassifier::new(EmbeddingFeaturizer::new(encoder));

    let (x, y) = news_training_set();
    classifier.fit(&x, &y)?;

    let label = classifier.predict_label(&Document::new("space rocket launch", ""))?;
    assert_eq!(label, "science");
    Ok(())
}
