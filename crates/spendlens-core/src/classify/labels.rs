//! Zero-shot classification against category names
//!
//! Category names from `categories.json` and transaction descriptions go
//! through the same embedder; each transaction takes the category whose
//! vector has the highest dot product. Nothing is trained.

use async_trait::async_trait;
use tracing::debug;

use super::embed::{embed_batched, EmbedderClient};
use super::{Classifier, ClassifierKind};
use crate::error::Result;
use crate::models::{Transaction, FALLBACK_CATEGORY};

pub struct LabelEmbeddingClassifier {
    labels: Vec<String>,
    embedder: EmbedderClient,
    batch_size: usize,
}

impl LabelEmbeddingClassifier {
    pub fn new(labels: Vec<String>, embedder: EmbedderClient, batch_size: usize) -> Self {
        Self {
            labels,
            embedder,
            batch_size,
        }
    }
}

/// Index of the highest dot product; the first label wins ties
fn best_label(query: &[f32], labels: &[Vec<f32>]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, label) in labels.iter().enumerate() {
        let score: f32 = query.iter().zip(label).map(|(a, b)| a * b).sum();
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}

#[async_trait]
impl Classifier for LabelEmbeddingClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Embeddings
    }

    async fn classify(&self, txs: &[Transaction]) -> Result<Vec<Option<String>>> {
        if self.labels.is_empty() {
            return Ok(vec![Some(FALLBACK_CATEGORY.to_string()); txs.len()]);
        }

        debug!(labels = self.labels.len(), "Embedding category labels");
        let label_vectors = embed_batched(&self.embedder, &self.labels, self.batch_size).await?;

        let texts: Vec<String> = txs.iter().map(|t| t.description.clone()).collect();
        let vectors = embed_batched(&self.embedder, &texts, self.batch_size).await?;

        Ok(vectors
            .iter()
            .map(|v| {
                let label = best_label(v, &label_vectors)
                    .map_or(FALLBACK_CATEGORY, |i| self.labels[i].as_str());
                Some(label.to_string())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::embed::HashingEmbedder;
    use chrono::NaiveDate;

    fn tx(description: &str) -> Transaction {
        let mut t = Transaction::from_raw(
            Default::default(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        t.description = description.into();
        t
    }

    fn classifier(labels: &[&str]) -> LabelEmbeddingClassifier {
        LabelEmbeddingClassifier::new(
            labels.iter().map(|s| s.to_string()).collect(),
            EmbedderClient::Hashing(HashingEmbedder::new(256)),
            8,
        )
    }

    #[tokio::test]
    async fn test_assigns_closest_label_without_training() {
        let c = classifier(&["Groceries", "Transport", "Eating Out"]);
        let out = c
            .classify(&[
                tx("TRANSPORT FOR LONDON"),
                tx("Local groceries market"),
                tx("eating out at nandos"),
            ])
            .await
            .unwrap();
        assert_eq!(out[0].as_deref(), Some("Transport"));
        assert_eq!(out[1].as_deref(), Some("Groceries"));
        assert_eq!(out[2].as_deref(), Some("Eating Out"));
    }

    #[tokio::test]
    async fn test_no_labels_gives_other() {
        let out = classifier(&[]).classify(&[tx("anything")]).await.unwrap();
        assert_eq!(out[0].as_deref(), Some("other"));
    }

    #[test]
    fn test_best_label_tie_keeps_first() {
        let labels = vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]];
        assert_eq!(best_label(&[1.0, 0.0], &labels), Some(0));
        assert_eq!(best_label(&[0.0, 0.0], &labels), Some(0));
        assert_eq!(best_label(&[0.1, 0.9], &labels), Some(2));
        assert_eq!(best_label(&[1.0], &[]), None);
    }
}
