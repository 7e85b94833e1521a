//! Classifier accuracy against the bank-provided categories

use serde::Serialize;
use tracing::{info, warn};

use crate::classify::{Classifier, ClassifierKind};
use crate::models::{Transaction, FALLBACK_CATEGORY};

pub const DEFAULT_SAMPLE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub classifier: ClassifierKind,
    pub correct: usize,
    pub total: usize,
    /// Percentage, 0-100
    pub accuracy: f64,
}

/// Score each classifier on the first `sample` transactions
///
/// The expected answer is the original category, or `other` when the bank
/// gave none. Classifiers that fail are logged and left out of the result.
pub async fn evaluate(
    txs: &[Transaction],
    classifiers: &[Box<dyn Classifier>],
    sample: usize,
) -> Vec<EvaluationResult> {
    let sample = &txs[..sample.min(txs.len())];
    let ground: Vec<&str> = sample
        .iter()
        .map(|tx| match tx.original_category.as_str() {
            "" => FALLBACK_CATEGORY,
            c => c,
        })
        .collect();

    info!(total = sample.len(), "Evaluating classifiers");

    let mut results = Vec::new();
    for classifier in classifiers {
        let kind = classifier.kind();
        let answers = match classifier.classify(sample).await {
            Ok(answers) if answers.len() == sample.len() => answers,
            Ok(answers) => {
                warn!(classifier = %kind, got = answers.len(), "Misaligned results, skipping");
                continue;
            }
            Err(e) => {
                warn!(classifier = %kind, "Classification failed: {}", e);
                continue;
            }
        };

        let correct = answers
            .iter()
            .zip(&ground)
            .filter(|(answer, truth)| answer.as_deref().unwrap_or(FALLBACK_CATEGORY) == **truth)
            .count();
        let accuracy = if sample.is_empty() {
            0.0
        } else {
            correct as f64 / sample.len() as f64 * 100.0
        };
        info!(classifier = %kind, correct, total = sample.len(), "{:.2}% accurate", accuracy);

        results.push(EvaluationResult {
            classifier: kind,
            correct,
            total: sample.len(),
            accuracy,
        });
    }
    results
}
