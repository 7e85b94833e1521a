//! Brute-force k-nearest-neighbour classifier
//!
//! On disk (`tx-classifier-knn/`):
//! - `meta.json`: `{k, labels, dim}`
//! - `embeddings.bin`: `labels.len() * dim` little-endian f32, row-major
//!
//! The older single-file `knn.json` layout is still readable.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::Transaction;
use crate::store::write_atomic;

use super::embed::{embed_batched, l2_normalize, Embedder, EmbedderClient};
use super::{Classifier, ClassifierKind};

pub const META_FILE: &str = "meta.json";
pub const EMBEDDINGS_FILE: &str = "embeddings.bin";
pub const LEGACY_FILE: &str = "knn.json";

/// Neighbours consulted when training without an explicit k
pub const DEFAULT_K: usize = 5;

#[derive(Debug, Serialize, Deserialize)]
struct KnnMeta {
    k: usize,
    labels: Vec<String>,
    dim: usize,
}

#[derive(Debug, Deserialize)]
struct LegacyKnn {
    k: usize,
    embeddings: Vec<Vec<f32>>,
    labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnnModel {
    pub k: usize,
    pub labels: Vec<String>,
    pub dim: usize,
    /// Row-major, L2-normalized
    pub embeddings: Vec<f32>,
}

impl KnnModel {
    /// Build from labelled vectors, normalizing each row
    pub fn from_vectors(k: usize, labels: Vec<String>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if labels.len() != vectors.len() {
            return Err(Error::Model(format!(
                "{} labels but {} embeddings",
                labels.len(),
                vectors.len()
            )));
        }

        let dim = vectors.first().map(Vec::len).unwrap_or(0);
        let mut embeddings = Vec::with_capacity(labels.len() * dim);
        for (i, mut row) in vectors.into_iter().enumerate() {
            if row.len() != dim {
                return Err(Error::Model(format!(
                    "Embedding {} has dimension {}, expected {}",
                    i,
                    row.len(),
                    dim
                )));
            }
            l2_normalize(&mut row);
            embeddings.extend(row);
        }

        Ok(Self {
            k,
            labels,
            dim,
            embeddings,
        })
    }

    /// Embed `texts` and keep them as the neighbour set
    pub async fn train<E: Embedder + ?Sized>(
        texts: &[String],
        labels: Vec<String>,
        embedder: &E,
        k: usize,
        batch_size: usize,
    ) -> Result<Self> {
        if texts.len() != labels.len() {
            return Err(Error::InvalidData(format!(
                "{} texts but {} labels",
                texts.len(),
                labels.len()
            )));
        }
        let vectors = embed_batched(embedder, texts, batch_size).await?;
        let model = Self::from_vectors(k, labels, vectors)?;
        info!(rows = model.len(), dim = model.dim, k = model.k, "Trained KNN model");
        Ok(model)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn row(&self, i: usize) -> &[f32] {
        &self.embeddings[i * self.dim..(i + 1) * self.dim]
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;

        let meta = KnnMeta {
            k: self.k,
            labels: self.labels.clone(),
            dim: self.dim,
        };
        write_atomic(&dir.join(META_FILE), &serde_json::to_vec(&meta)?)?;

        let mut bytes = Vec::with_capacity(self.embeddings.len() * 4);
        for x in &self.embeddings {
            bytes.extend_from_slice(&x.to_le_bytes());
        }
        write_atomic(&dir.join(EMBEDDINGS_FILE), &bytes)?;

        debug!(dir = %dir.display(), "Saved KNN model");
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let meta_path = dir.join(META_FILE);
        if meta_path.exists() {
            let meta: KnnMeta = serde_json::from_slice(&fs::read(&meta_path)?)?;
            let bytes = fs::read(dir.join(EMBEDDINGS_FILE))?;

            let expected = meta.labels.len() * meta.dim * 4;
            if bytes.len() != expected {
                return Err(Error::Model(format!(
                    "{} is {} bytes, expected {}; retrain with train-knn",
                    EMBEDDINGS_FILE,
                    bytes.len(),
                    expected
                )));
            }

            let vectors = bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect::<Vec<_>>()
                .chunks(meta.dim.max(1))
                .map(<[f32]>::to_vec)
                .collect::<Vec<_>>();
            let mut model = Self::from_vectors(meta.k, meta.labels, vectors)?;
            model.dim = meta.dim;
            return Ok(model);
        }

        let legacy_path = dir.join(LEGACY_FILE);
        if legacy_path.exists() {
            debug!(path = %legacy_path.display(), "Loading legacy KNN model");
            let legacy: LegacyKnn = serde_json::from_slice(&fs::read(&legacy_path)?)?;
            return Self::from_vectors(legacy.k, legacy.labels, legacy.embeddings);
        }

        Err(Error::Model(format!(
            "No KNN model in {}; run train-knn first",
            dir.display()
        )))
    }

    /// Majority label among the k most similar rows
    ///
    /// Count ties go to the label seen first in similarity order.
    pub fn predict(&self, query: &[f32]) -> Result<Option<String>> {
        if self.is_empty() {
            return Ok(None);
        }
        if query.len() != self.dim {
            return Err(Error::Model(format!(
                "Query has dimension {}, model expects {}",
                query.len(),
                self.dim
            )));
        }

        let mut q = query.to_vec();
        l2_normalize(&mut q);

        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|i| (i, self.row(i).iter().zip(&q).map(|(a, b)| a * b).sum()))
            .collect();

        let by_similarity =
            |a: &(usize, f32), b: &(usize, f32)| -> Ordering { b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)) };

        let k = self.k.max(1).min(scored.len());
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_similarity);
            scored.truncate(k);
        }
        scored.sort_by(by_similarity);

        let mut votes: Vec<(&str, usize)> = Vec::new();
        for (i, _) in &scored {
            let label = self.labels[*i].as_str();
            match votes.iter_mut().find(|(l, _)| *l == label) {
                Some(entry) => entry.1 += 1,
                None => votes.push((label, 1)),
            }
        }

        let mut best: Option<(&str, usize)> = None;
        for (label, count) in votes {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((label, count));
            }
        }
        Ok(best.map(|(l, _)| l.to_string()))
    }
}

pub struct KnnClassifier {
    model: KnnModel,
    embedder: EmbedderClient,
    batch_size: usize,
}

impl KnnClassifier {
    pub fn new(model: KnnModel, embedder: EmbedderClient, batch_size: usize) -> Self {
        Self {
            model,
            embedder,
            batch_size,
        }
    }
}

#[async_trait]
impl Classifier for KnnClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Knn
    }

    async fn classify(&self, txs: &[Transaction]) -> Result<Vec<Option<String>>> {
        if self.model.is_empty() {
            return Ok(vec![None; txs.len()]);
        }
        let texts: Vec<String> = txs.iter().map(|t| t.description.clone()).collect();
        let vectors = embed_batched(&self.embedder, &texts, self.batch_size).await?;
        vectors.iter().map(|v| self.model.predict(v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::embed::HashingEmbedder;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn model() -> KnnModel {
        KnnModel::from_vectors(
            3,
            vec!["a".into(), "b".into(), "b".into(), "c".into()],
            vec![
                vec![1.0, 0.0],
                vec![0.9, 0.1],
                vec![0.8, 0.2],
                vec![0.0, 1.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_majority_vote() {
        // top 3 by cosine to (1,0): a, b, b
        assert_eq!(model().predict(&[1.0, 0.0]).unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_tie_goes_to_nearest() {
        let mut m = model();
        m.k = 2;
        assert_eq!(m.predict(&[1.0, 0.0]).unwrap().as_deref(), Some("a"));
        m.k = 1;
        assert_eq!(m.predict(&[0.0, 2.0]).unwrap().as_deref(), Some("c"));
    }

    #[test]
    fn test_k_larger_than_rows() {
        let mut m = model();
        m.k = 50;
        assert_eq!(m.predict(&[0.0, 1.0]).unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_empty_and_mismatched() {
        let empty = KnnModel::from_vectors(5, vec![], vec![]).unwrap();
        assert_eq!(empty.predict(&[1.0]).unwrap(), None);
        assert!(model().predict(&[1.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn test_save_load() {
        let dir = TempDir::new().unwrap();
        let m = model();
        m.save(dir.path()).unwrap();
        let loaded = KnnModel::load(dir.path()).unwrap();
        assert_eq!(loaded.k, 3);
        assert_eq!(loaded.labels, m.labels);
        assert_eq!(loaded.dim, 2);
        for (x, y) in loaded.embeddings.iter().zip(&m.embeddings) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_truncated_embeddings_rejected() {
        let dir = TempDir::new().unwrap();
        model().save(dir.path()).unwrap();
        fs::write(dir.path().join(EMBEDDINGS_FILE), [0u8; 12]).unwrap();
        let err = KnnModel::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("retrain"));
    }

    #[test]
    fn test_legacy_load_and_missing() {
        let dir = TempDir::new().unwrap();
        assert!(KnnModel::load(dir.path()).is_err());

        fs::write(
            dir.path().join(LEGACY_FILE),
            r#"{"k":1,"embeddings":[[3.0,4.0],[0.0,1.0]],"labels":["x","y"]}"#,
        )
        .unwrap();
        let m = KnnModel::load(dir.path()).unwrap();
        assert_eq!(m.len(), 2);
        assert!((m.embeddings[0] - 0.6).abs() < 1e-5);
        assert_eq!(m.predict(&[0.1, 5.0]).unwrap().as_deref(), Some("y"));
    }

    #[tokio::test]
    async fn test_classifier_with_hashing_embedder() {
        let embedder = HashingEmbedder::new(128);
        let texts: Vec<String> = vec![
            "TESCO STORES 1234".into(),
            "TESCO EXTRA".into(),
            "UBER TRIP".into(),
            "UBER BV".into(),
        ];
        let labels = vec![
            "Groceries".into(),
            "Groceries".into(),
            "Transport".into(),
            "Transport".into(),
        ];
        let model = KnnModel::train(&texts, labels, &embedder, 1, 2).await.unwrap();
        let classifier = KnnClassifier::new(model, EmbedderClient::Hashing(embedder), 16);

        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut t1 = Transaction::from_raw(Default::default(), date);
        t1.description = "Tesco Stores 9999".into();
        let mut t2 = t1.clone();
        t2.description = "Uber trip help".into();

        let out = classifier.classify(&[t1, t2]).await.unwrap();
        assert_eq!(out[0].as_deref(), Some("Groceries"));
        assert_eq!(out[1].as_deref(), Some("Transport"));
    }
}
