//! End-to-end steps over a data directory
//!
//! Each step loads from the [`DataStore`], computes, and saves. The CLI and
//! the server both drive the pipeline through these functions.

use serde::Serialize;
use tracing::{info, warn};

use crate::classify::{
    build_categorizer, build_classifier, generate_categories, ChainSelection, CategorizeReport,
    Classifier, ClassifierKind, EmbedderClient, KnnModel, NeuralModel, TrainOptions,
};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::evaluate::{evaluate, EvaluationResult};
use crate::ingest::{ingest, IngestOptions, IngestReport};
use crate::models::{CategoryKeywords, Transaction, FALLBACK_CATEGORY};
use crate::store::{DataStore, CATEGORIZED_FILE};
use crate::summary::{generate, Summary, SummaryInputs};

/// Outcome of an import-directory run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReport {
    pub ingest: IngestReport,
    pub chain: String,
    pub categorize: CategorizeReport,
    pub months: usize,
}

pub fn run_ingest(store: &DataStore, settings: &Settings) -> Result<IngestReport> {
    store.ensure_dir()?;
    let options = IngestOptions::from_settings(settings)?;
    ingest(store, &settings.import_dir, &options)
}

/// Categorize `transactions.json` into `transactions_categorized.json`
pub async fn run_categorize(
    store: &DataStore,
    settings: &Settings,
    selection: &ChainSelection,
) -> Result<CategorizeReport> {
    let txs = store.load_transactions()?;
    let categorizer = build_categorizer(selection, store, settings)?;
    info!(chain = %selection, total = txs.len(), "Categorizing transactions");

    let (categorized, report) = categorizer.categorize(txs).await?;
    store.save_categorized(&categorized)?;
    info!(total = report.total, fallback = report.fallback, "Categorization complete");
    Ok(report)
}

fn build_summary(store: &DataStore, settings: &Settings, txs: &[Transaction]) -> Summary {
    let inputs = SummaryInputs::from_store(store).with_range(
        settings.summary.start_month.clone(),
        settings.summary.end_month.clone(),
    );
    generate(txs, &inputs)
}

/// Summarize `transactions_categorized.json` into `summary.json`
pub fn run_summary(store: &DataStore, settings: &Settings) -> Result<Summary> {
    let txs = store.load_categorized()?.ok_or_else(|| {
        Error::NotFound(format!("{} (run categorize first)", CATEGORIZED_FILE))
    })?;
    let summary = build_summary(store, settings, &txs);
    store.save_summary(&summary)?;
    info!(
        transactions = txs.len(),
        months = summary.monthly_overview.len(),
        "Summary generated"
    );
    Ok(summary)
}

/// Rebuild `summary.json`; no categorized data gives an empty summary
pub fn regenerate_summary(store: &DataStore, settings: &Settings) -> Result<Summary> {
    let txs = store.load_categorized()?.unwrap_or_default();
    let summary = build_summary(store, settings, &txs);
    store.save_summary(&summary)?;
    Ok(summary)
}

/// Ingest the import dir, categorize and summarize
///
/// Without classifier flags or a configured chain, the classifier is the one
/// the ingested file formats agree on.
pub async fn process_imports(store: &DataStore, settings: &Settings) -> Result<ProcessReport> {
    let ingest = run_ingest(store, settings)?;
    let selection = ChainSelection::resolve(&settings.classifiers, ingest.default_classifier())?;
    let categorize = run_categorize(store, settings, &selection).await?;
    let summary = run_summary(store, settings)?;
    Ok(ProcessReport {
        ingest,
        chain: selection.to_string(),
        categorize,
        months: summary.monthly_overview.len(),
    })
}

/// Descriptions and assigned categories of the categorized file
fn training_data(store: &DataStore) -> Result<(Vec<String>, Vec<String>)> {
    let txs = store.load_categorized()?.ok_or_else(|| {
        Error::NotFound(format!("{} (run categorize first)", CATEGORIZED_FILE))
    })?;
    if txs.is_empty() {
        return Err(Error::InvalidData("No categorized transactions to train on".into()));
    }
    Ok(txs
        .into_iter()
        .map(|tx| {
            let label = tx.category.unwrap_or_else(|| FALLBACK_CATEGORY.to_string());
            (tx.description, label)
        })
        .unzip())
}

pub async fn train_knn(store: &DataStore, settings: &Settings, k: Option<usize>) -> Result<KnnModel> {
    let (texts, labels) = training_data(store)?;
    let embedder = EmbedderClient::from_settings(settings)?;
    let k = k.unwrap_or(settings.classifiers.knn_k);
    info!(rows = texts.len(), k, embedder = embedder.name(), "Training KNN model");

    let model = KnnModel::train(
        &texts,
        labels,
        &embedder,
        k,
        settings.classifiers.embed_batch_size,
    )
    .await?;
    model.save(&store.knn_dir())?;
    Ok(model)
}

pub async fn train_neural(
    store: &DataStore,
    settings: &Settings,
    options: &TrainOptions,
) -> Result<NeuralModel> {
    let (texts, labels) = training_data(store)?;
    let embedder = EmbedderClient::from_settings(settings)?;
    info!(
        rows = texts.len(),
        epochs = options.epochs,
        embedder = embedder.name(),
        "Training neural model"
    );

    let model = NeuralModel::train(
        &texts,
        &labels,
        &embedder,
        options,
        settings.classifiers.embed_batch_size,
    )
    .await?;
    model.save(&store.neural_dir())?;
    Ok(model)
}

/// Score every classifier that can be built against `transactions.json`
///
/// Classifiers without a trained model or AI backend are skipped.
pub async fn run_evaluate(
    store: &DataStore,
    settings: &Settings,
    sample: usize,
) -> Result<Vec<EvaluationResult>> {
    let txs = store.load_transactions()?;
    if txs.is_empty() {
        return Err(Error::NotFound("transactions.json (run ingest first)".into()));
    }

    let mut classifiers: Vec<Box<dyn Classifier>> = Vec::new();
    for kind in [
        ClassifierKind::Rules,
        ClassifierKind::Embeddings,
        ClassifierKind::Knn,
        ClassifierKind::Neural,
        ClassifierKind::Ai,
    ] {
        match build_classifier(kind, store, settings) {
            Ok(c) => classifiers.push(c),
            Err(e) => warn!(classifier = %kind, "Skipping: {}", e),
        }
    }

    Ok(evaluate(&txs, &classifiers, sample).await)
}

/// Write `categories.json` derived from the categorized file
pub fn run_generate_categories(store: &DataStore) -> Result<CategoryKeywords> {
    let txs = store.load_categorized()?.ok_or_else(|| {
        Error::NotFound(format!("{} (run categorize first)", CATEGORIZED_FILE))
    })?;
    let categories = generate_categories(&txs);
    store.save_categories(&categories)?;
    info!(categories = categories.len(), "Generated categories.json");
    Ok(categories)
}
