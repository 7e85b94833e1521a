//! Model training, evaluation and category generation commands

use anyhow::{Context, Result};
use spendlens_core::classify::TrainOptions;
use spendlens_core::pipeline::{run_evaluate, run_generate_categories, train_knn, train_neural};
use spendlens_core::Settings;

use super::open_store;

pub async fn cmd_train_knn(settings: &Settings, k: Option<usize>) -> Result<()> {
    println!(
        "🧠 Training KNN model ({} embedder)...",
        settings.classifiers.embedder
    );

    let store = open_store(settings);
    let model = train_knn(&store, settings, k)
        .await
        .context("KNN training failed")?;

    println!("   Examples: {}", model.len());
    println!("   k: {}, dimensions: {}", model.k, model.dim);
    println!("✅ Saved to {}", store.knn_dir().display());
    Ok(())
}

pub async fn cmd_train_neural(
    settings: &Settings,
    epochs: Option<usize>,
    seed: Option<u64>,
) -> Result<()> {
    let defaults = TrainOptions::default();
    let options = TrainOptions {
        epochs: epochs.unwrap_or(defaults.epochs),
        seed: seed.unwrap_or(defaults.seed),
        ..defaults
    };
    println!(
        "🧠 Training neural model ({} epochs, seed {})...",
        options.epochs, options.seed
    );

    let store = open_store(settings);
    let model = train_neural(&store, settings, &options)
        .await
        .context("Neural training failed")?;

    println!("   Classes: {}", model.classes.len());
    println!("✅ Saved to {}", store.neural_dir().display());
    Ok(())
}

pub async fn cmd_evaluate(settings: &Settings, sample: usize, json: bool) -> Result<()> {
    let store = open_store(settings);
    let results = run_evaluate(&store, settings, sample).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    println!("🎯 Classifier accuracy (first {} transactions)", sample);
    if results.is_empty() {
        println!("   No classifier could be evaluated");
        return Ok(());
    }
    println!("{:<10} {:>8} {:>8} {:>9}", "CLASSIFIER", "CORRECT", "TOTAL", "ACCURACY");
    for r in &results {
        println!(
            "{:<10} {:>8} {:>8} {:>8.2}%",
            r.classifier.as_str(),
            r.correct,
            r.total,
            r.accuracy
        );
    }
    Ok(())
}

pub fn cmd_generate_categories(settings: &Settings) -> Result<()> {
    let store = open_store(settings);
    let categories = run_generate_categories(&store)?;

    println!("✅ Wrote {} categories to categories.json", categories.len());
    for name in categories.names() {
        println!("   {}", name);
    }
    Ok(())
}
