//! The classification pipeline: featurizer + multinomial linear head.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use linfa::traits::Fit;
use linfa::Dataset;
use linfa_logistic::{MultiFittedLogisticRegression, MultiLogisticRegression};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::error::ClassifierError;
use super::featurizer::EmbeddingFeaturizer;

/// Version tag written into dumped pipeline files. Bump on any change to the
/// persisted shape.
const FORMAT_VERSION: u32 = 1;

/// Gradient tolerance for the logistic-regression solver.
const GRADIENT_TOLERANCE: f64 = 1e-3;

/// L2 regularization strength for the logistic-regression solver.
const L2_PENALTY: f64 = 1.0;

const MAX_ITERATIONS: u64 = 200;

/// A news document to classify.
///
/// Title and description are joined with a literal `" | "` separator before
/// embedding, matching the format the classifier is trained on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub description: String,
}

impl Document {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    /// The single text string fed to the featurizer.
    pub fn text(&self) -> String {
        format!("{} | {}", self.title, self.description)
    }
}

/// Training sample for category classification: a pre-concatenated document
/// string and its label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledDocument {
    pub text: String,
    pub label: String,
}

/// Loads training samples from a JSON file containing an array of
/// [`LabeledDocument`] records.
pub fn load_training_data(path: impl AsRef<Path>) -> Result<Vec<LabeledDocument>, ClassifierError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        ClassifierError::PersistError(format!("Failed to open training data {:?}: {}", path, e))
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        ClassifierError::PersistError(format!("Invalid training data {:?}: {}", path, e))
    })
}

/// Information about the current state and configuration of a pipeline
#[derive(Debug, Clone)]
pub struct PipelineInfo {
    /// Number of classes the pipeline is trained on; 0 before fit/load
    pub num_classes: usize,
    /// Labels of the classes, in their deterministic (sorted) order
    pub class_labels: Vec<String>,
    /// Size of the embedding vectors
    pub embedding_size: usize,
    /// Whether the pipeline can serve predictions
    pub ready: bool,
}

/// The fitted second stage: cached label set + trained regression.
struct FittedState {
    classes: Vec<String>,
    model: MultiFittedLogisticRegression<f64, usize>,
}

#[derive(Serialize)]
struct SavedPipelineRef<'a> {
    format_version: u32,
    embedding_size: usize,
    classes: &'a [String],
    model: &'a MultiFittedLogisticRegression<f64, usize>,
}

#[derive(Deserialize)]
struct SavedPipeline {
    format_version: u32,
    embedding_size: usize,
    classes: Vec<String>,
    model: MultiFittedLogisticRegression<f64, usize>,
}

/// A two-stage news-category classification pipeline.
///
/// Owns an [`EmbeddingFeaturizer`] and, once fitted, a multinomial
/// logistic-regression head plus the cached label set. The lifecycle is
/// uninitialized → (fit | load) → ready; a second `fit` or `load` replaces
/// the fitted state wholesale.
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use std::sync::Arc;
/// use newscat::{
///     BuiltinModel, Document, EmbeddingFeaturizer, NewsCategoryClassifier, SentenceEncoder,
/// };
///
/// let encoder = Arc::new(SentenceEncoder::from_pretrained(BuiltinModel::MiniLM)?);
/// let mut classifier = NewsCategoryClassifier::new(EmbeddingFeaturizer::new(encoder));
///
/// classifier.fit(
///     &["space rocket launch".into(), "interest rates fall".into()],
///     &["science".into(), "business".into()],
/// )?;
///
/// let label = classifier.predict_label(&Document::new("new planet discovered", ""))?;
/// println!("Predicted category: {}", label);
/// # Ok(())
/// # }
/// ```
pub struct NewsCategoryClassifier {
    featurizer: EmbeddingFeaturizer,
    verbose: bool,
    state: Option<FittedState>,
}

impl std::fmt::Debug for NewsCategoryClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewsCategoryClassifier")
            .field("featurizer", &self.featurizer)
            .field("verbose", &self.verbose)
            .field("ready", &self.state.is_some())
            .finish()
    }
}

impl NewsCategoryClassifier {
    /// Creates an unfitted pipeline around the given featurizer.
    pub fn new(featurizer: EmbeddingFeaturizer) -> Self {
        Self {
            featurizer,
            verbose: false,
            state: None,
        }
    }

    /// When set, `fit` logs per-stage wall-clock timings.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Whether the pipeline has been fitted or loaded.
    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    /// The cached label set, in its deterministic (sorted) order.
    /// `None` before fit/load.
    pub fn classes(&self) -> Option<&[String]> {
        self.state.as_ref().map(|s| s.classes.as_slice())
    }

    pub fn info(&self) -> PipelineInfo {
        PipelineInfo {
            num_classes: self.state.as_ref().map_or(0, |s| s.classes.len()),
            class_labels: self
                .state
                .as_ref()
                .map_or_else(Vec::new, |s| s.classes.clone()),
            embedding_size: self.featurizer.embedding_size(),
            ready: self.state.is_some(),
        }
    }

    /// Fits the pipeline end-to-end on paired (document, label) data.
    ///
    /// Documents are expected pre-concatenated (see [`Document::text`] for
    /// the prediction-side format). Requires matching lengths and at least
    /// two distinct labels. On success any previous fitted state is
    /// replaced; on error it is left untouched.
    pub fn fit(&mut self, x_train: &[String], y_train: &[String]) -> Result<(), ClassifierError> {
        if x_train.is_empty() {
            return Err(ClassifierError::ShapeError(
                "Training set is empty".to_string(),
            ));
        }
        if x_train.len() != y_train.len() {
            return Err(ClassifierError::ShapeError(format!(
                "Got {} documents but {} labels",
                x_train.len(),
                y_train.len()
            )));
        }

        let mut classes: Vec<String> = y_train.to_vec();
        classes.sort();
        classes.dedup();
        if classes.len() < 2 {
            return Err(ClassifierError::ShapeError(format!(
                "Multinomial classification needs at least 2 distinct labels, found {}",
                classes.len()
            )));
        }

        log::info!(
            "Beginning model training on {} documents, {} classes",
            x_train.len(),
            classes.len()
        );

        let featurize_start = Instant::now();
        let records = self.featurizer.feature_matrix(x_train)?;
        if self.verbose {
            log::info!(
                "[pipeline] featurizer stage done in {:.2?}",
                featurize_start.elapsed()
            );
        }

        let targets = y_train
            .iter()
            .map(|label| {
                classes.binary_search(label).map_err(|_| {
                    ClassifierError::TrainingError(format!(
                        "Label {:?} missing from the class index",
                        label
                    ))
                })
            })
            .collect::<Result<Vec<usize>, _>>()?;

        let solve_start = Instant::now();
        let dataset = Dataset::new(records, Array1::from_vec(targets));
        let model = MultiLogisticRegression::default()
            .alpha(L2_PENALTY)
            .gradient_tolerance(GRADIENT_TOLERANCE)
            .max_iterations(MAX_ITERATIONS)
            .fit(&dataset)
            .map_err(|e| ClassifierError::TrainingError(e.to_string()))?;
        if self.verbose {
            log::info!(
                "[pipeline] classifier stage done in {:.2?}",
                solve_start.elapsed()
            );
        }

        self.state = Some(FittedState { classes, model });
        Ok(())
    }

    /// Serializes the fitted pipeline to a single file at `path`,
    /// overwriting any existing file.
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<(), ClassifierError> {
        let path = path.as_ref();
        let state = self.state.as_ref().ok_or_else(|| {
            ClassifierError::StateError("dump called before fit or load".to_string())
        })?;

        let saved = SavedPipelineRef {
            format_version: FORMAT_VERSION,
            embedding_size: self.featurizer.embedding_size(),
            classes: &state.classes,
            model: &state.model,
        };

        let file = File::create(path).map_err(|e| {
            ClassifierError::PersistError(format!("Failed to create {:?}: {}", path, e))
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &saved).map_err(|e| {
            ClassifierError::PersistError(format!("Failed to write {:?}: {}", path, e))
        })?;
        writer.flush().map_err(|e| {
            ClassifierError::PersistError(format!("Failed to write {:?}: {}", path, e))
        })?;

        log::info!("Saved trained model pipeline to {:?}", path);
        Ok(())
    }

    /// Loads a previously dumped pipeline from `path`, replacing current
    /// state wholesale and re-deriving the cached label set from the blob.
    ///
    /// The blob must match this pipeline's format version and the injected
    /// encoder's embedding dimension.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), ClassifierError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            ClassifierError::PersistError(format!("Failed to open {:?}: {}", path, e))
        })?;
        let saved: SavedPipeline = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            ClassifierError::PersistError(format!("Corrupt pipeline file {:?}: {}", path, e))
        })?;

        if saved.format_version != FORMAT_VERSION {
            return Err(ClassifierError::PersistError(format!(
                "Pipeline file {:?} has format version {}, expected {}",
                path, saved.format_version, FORMAT_VERSION
            )));
        }
        if saved.embedding_size != self.featurizer.embedding_size() {
            return Err(ClassifierError::PersistError(format!(
                "Pipeline was trained on {}-dimensional embeddings but the encoder produces {}",
                saved.embedding_size,
                self.featurizer.embedding_size()
            )));
        }
        if saved.classes.len() < 2 {
            return Err(ClassifierError::PersistError(format!(
                "Pipeline file {:?} carries {} classes, expected at least 2",
                path,
                saved.classes.len()
            )));
        }

        // The class list and the regression head travel separately in the
        // blob; reject a file where they disagree.
        let probe = Array2::<f64>::zeros((1, saved.embedding_size));
        let columns = saved.model.predict_probabilities(&probe).ncols();
        if columns != saved.classes.len() {
            return Err(ClassifierError::PersistError(format!(
                "Pipeline file {:?} maps {} classes onto a {}-way classifier",
                path,
                saved.classes.len(),
                columns
            )));
        }

        self.state = Some(FittedState {
            classes: saved.classes,
            model: saved.model,
        });
        log::info!("Loaded trained model pipeline from {:?}", path);
        Ok(())
    }

    /// Scores `input` against every known label, in label order.
    fn scores(&self, input: &Document) -> Result<Vec<(String, f32)>, ClassifierError> {
        let state = self.state.as_ref().ok_or_else(|| {
            ClassifierError::StateError("predict called before fit or load".to_string())
        })?;

        let vector = self.featurizer.transform_one(&input.text())?;
        let dim = self.featurizer.embedding_size();
        if vector.len() != dim {
            return Err(ClassifierError::ModelError(format!(
                "Embedder produced a {}-dimensional vector, expected {}",
                vector.len(),
                dim
            )));
        }

        let x = Array2::from_shape_vec((1, dim), vector.into_iter().map(f64::from).collect())
            .map_err(|e| ClassifierError::ModelError(format!("Failed to shape input: {}", e)))?;
        let probabilities = state.model.predict_probabilities(&x);

        Ok(state
            .classes
            .iter()
            .cloned()
            .zip(probabilities.row(0).iter().map(|&p| p as f32))
            .collect())
    }

    /// Predicted probability for every known label.
    ///
    /// Keys are exactly the cached label set; values are non-negative and
    /// sum to 1.0 within floating-point tolerance.
    pub fn predict_proba(
        &self,
        input: &Document,
    ) -> Result<HashMap<String, f32>, ClassifierError> {
        Ok(self.scores(input)?.into_iter().collect())
    }

    /// The label with the highest predicted probability.
    ///
    /// Labels are scanned in their deterministic order and the first label
    /// strictly above the running maximum wins, so exact ties go to the
    /// earliest label.
    pub fn predict_label(&self, input: &Document) -> Result<String, ClassifierError> {
        Ok(argmax_label(&self.scores(input)?))
    }
}

/// First label whose score strictly exceeds the running maximum, starting
/// from zero. An all-zero score list yields an empty string.
fn argmax_label(scores: &[(String, f32)]) -> String {
    let mut highest = 0.0f32;
    let mut best = String::new();
    for (label, score) in scores {
        if *score > highest {
            highest = *score;
            best = label.clone();
        }
    }
    best
}
