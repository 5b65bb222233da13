use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use newscat::{
    load_training_data, BuiltinModel, Document, EmbeddingFeaturizer, ModelManager,
    NewsCategoryClassifier, SentenceEncoder, TextEmbedder,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Force a fresh download of the model files
    #[arg(short, long)]
    fresh: bool,

    /// JSON training file: an array of {"text": ..., "label": ...} records.
    /// Falls back to a small builtin news sample set.
    #[arg(short, long)]
    train_data: Option<PathBuf>,

    /// Where to write the fitted pipeline
    #[arg(short, long, default_value = "newscat-pipeline.json")]
    out: PathBuf,

    /// Log per-stage timings during training
    #[arg(short, long)]
    verbose: bool,
}

async fn ensure_model_downloaded(fresh: bool) -> Result<()> {
    let manager = ModelManager::new_default().context("Failed to create model manager")?;
    let model = BuiltinModel::MiniLM;

    if fresh {
        info!("Fresh download requested - removing any existing model files...");
        manager.remove_download(model)?;
    }

    manager.ensure_model_downloaded(model).await?;
    Ok(())
}

fn builtin_training_set() -> (Vec<String>, Vec<String>) {
    let samples = [
        ("space rocket launch | agency confirms successful liftoff of crewed mission", "science"),
        ("new planet discovered | astronomers spot an earth-sized world in a nearby system", "science"),
        ("gene editing trial begins | researchers test a treatment for inherited blindness", "science"),
        ("fusion milestone reached | reactor sustains plasma for a record duration", "science"),
        ("stock market rises | major indexes close higher on upbeat earnings", "business"),
        ("interest rates fall | central bank trims rates amid cooling inflation", "business"),
        ("retailer posts record profit | holiday quarter beats analyst expectations", "business"),
        ("startup raises funding | logistics firm closes a large growth round", "business"),
        ("team wins championship | dramatic overtime goal decides the final", "sports"),
        ("sprinter breaks record | world mark falls at the season opener", "sports"),
        ("club signs striker | transfer fee sets a league record", "sports"),
        ("injury sidelines quarterback | starter expected to miss six weeks", "sports"),
        ("summit ends without deal | leaders fail to agree on border dispute", "world"),
        ("election results contested | observers call for a recount in key regions", "world"),
        ("earthquake strikes coast | thousands evacuated as aftershocks continue", "world"),
        ("peace talks resume | negotiators return to the table after a ceasefire", "world"),
    ];
    samples
        .iter()
        .map(|(text, label)| (text.to_string(), label.to_string()))
        .unzip()
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("=== News Category Classifier Demo ===");
    ensure_model_downloaded(args.fresh).await?;

    let start_time = Instant::now();
    info!("Loading sentence encoder...");
    let encoder: Arc<dyn TextEmbedder> =
        Arc::new(SentenceEncoder::from_pretrained(BuiltinModel::MiniLM)?);

    let (x_train, y_train) = match &args.train_data {
        Some(path) => {
            info!("Loading training data from {:?}", path);
            load_training_data(path)
                .with_context(|| format!("Failed to load training data from {:?}", path))?
                .into_iter()
                .map(|sample| (sample.text, sample.label))
                .unzip()
        }
        None => builtin_training_set(),
    };

    let mut classifier = NewsCategoryClassifier::new(EmbeddingFeaturizer::new(Arc::clone(&encoder)))
        .with_verbose(args.verbose);

    info!("Training on {} documents...", x_train.len());
    let fit_start = Instant::now();
    classifier.fit(&x_train, &y_train)?;
    info!(
        "=== Pipeline fitted in {:.2?}, classes: {:?} ===",
        fit_start.elapsed(),
        classifier.classes().unwrap_or(&[])
    );

    let test_inputs = vec![
        Document::new(
            "The new AI model shows remarkable accuracy",
            "natural language processing benchmark results surprise researchers",
        ),
        Document::new(
            "Company stock surges 20%",
            "quarterly earnings exceed expectations across all divisions",
        ),
        Document::new(
            "Scientists discover evidence of ancient microbial life on Mars",
            "rover samples suggest a wet past",
        ),
        Document::new(
            "Team clinches title in dramatic fashion",
            "last-second goal seals the championship",
        ),
        Document::new("Breaking: major announcement today", ""),
    ];

    info!("=== Running Classifications ({} inputs) ===", test_inputs.len());
    let classify_start = Instant::now();
    for (i, document) in test_inputs.iter().enumerate() {
        info!("Test {}/{}: {}", i + 1, test_inputs.len(), document.title);
        process_input(&classifier, document)?;
    }
    info!(
        "Average time per classification: {:.2?}",
        classify_start.elapsed() / test_inputs.len() as u32
    );

    // Round-trip the fitted pipeline through disk.
    classifier.dump(&args.out)?;
    let mut restored =
        NewsCategoryClassifier::new(EmbeddingFeaturizer::new(Arc::clone(&encoder)));
    restored.load(&args.out)?;

    let probe = &test_inputs[0];
    let before = classifier.predict_label(probe)?;
    let after = restored.predict_label(probe)?;
    info!(
        "Persistence round trip: {:?} -> {} (before dump: {})",
        args.out, after, before
    );

    info!("=== Demo complete in {:.2?} ===", start_time.elapsed());
    Ok(())
}

fn process_input(classifier: &NewsCategoryClassifier, document: &Document) -> Result<()> {
    match classifier.predict_proba(document) {
        Ok(scores) => {
            let mut scores: Vec<_> = scores.into_iter().collect();
            scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

            println!("\n{}", document.text());
            println!("  Predicted class: {}", classifier.predict_label(document)?);
            println!("  Confidence scores (sorted):");
            for (label, score) in scores {
                println!("    {}: {:.1}%", label, score * 100.0);
            }
        }
        Err(e) => {
            eprintln!("\nError processing document: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
