//! Text embedders for the embedding, KNN and neural classifiers
//!
//! The hashing embedder needs no network and is deterministic, so a model
//! trained with it can always be queried again. The remote embedder goes
//! through the configured AI backend.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::ai::{AIBackend, AIClient};
use crate::config::Settings;
use crate::error::{Error, Result};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Output width when known without a request
    fn dim_hint(&self) -> Option<usize>;
}

/// Divide by the L2 norm (plus 1e-8 so zero vectors stay zero)
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt() + 1e-8;
    v.iter_mut().for_each(|x| *x /= norm);
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |h, b| {
        (h ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

fn add_feature(out: &mut [f32], feature: &str) {
    let h = fnv1a(feature.as_bytes());
    let idx = (h % out.len() as u64) as usize;
    let sign = if h >> 63 == 1 { -1.0 } else { 1.0 };
    out[idx] += sign;
}

/// Feature-hash a text into `dim` signed buckets
///
/// Features are lowercase word tokens plus character trigrams of each
/// `#word#`, so "TESCO STORES 2231" and "Tesco Stores 8812" land close.
pub fn hash_embed(text: &str, dim: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; dim.max(1)];
    let lower = text.to_lowercase();

    for word in lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        add_feature(&mut out, &format!("w:{}", word));

        let padded: Vec<char> = format!("#{}#", word).chars().collect();
        for tri in padded.windows(3) {
            let tri: String = tri.iter().collect();
            add_feature(&mut out, &format!("t:{}", tri));
        }
    }

    l2_normalize(&mut out);
    out
}

/// Local feature-hashing embedder
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    pub dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embed(t, self.dim)).collect())
    }

    fn dim_hint(&self) -> Option<usize> {
        Some(self.dim)
    }
}

/// Embeddings from the configured AI backend
#[derive(Clone)]
pub struct RemoteEmbedder {
    client: AIClient,
}

impl RemoteEmbedder {
    pub fn new(client: AIClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.client.embed(texts).await
    }

    fn dim_hint(&self) -> Option<usize> {
        None
    }
}

/// Concrete embedder selected by `classifiers.embedder`
#[derive(Clone)]
pub enum EmbedderClient {
    Hashing(HashingEmbedder),
    Remote(RemoteEmbedder),
}

impl EmbedderClient {
    /// `hashing` (default) or `remote`/`ai`
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let c = &settings.classifiers;
        match c.embedder.trim().to_lowercase().as_str() {
            "" | "hashing" | "local" => Ok(Self::Hashing(HashingEmbedder::new(c.hashing_dim))),
            "remote" | "ai" => AIClient::from_settings(&settings.ai)
                .map(|client| Self::Remote(RemoteEmbedder::new(client)))
                .ok_or_else(|| {
                    Error::Config(
                        "Remote embedder requested but no AI backend is configured \
                         (set OPENAI_API_KEY or OLLAMA_HOST)"
                            .into(),
                    )
                }),
            other => Err(Error::Config(format!("Unknown embedder: {}", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hashing(_) => "hashing",
            Self::Remote(_) => "remote",
        }
    }
}

#[async_trait]
impl Embedder for EmbedderClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            Self::Hashing(e) => e.embed(texts).await,
            Self::Remote(e) => e.embed(texts).await,
        }
    }

    fn dim_hint(&self) -> Option<usize> {
        match self {
            Self::Hashing(e) => e.dim_hint(),
            Self::Remote(e) => e.dim_hint(),
        }
    }
}

/// Embed in fixed-size batches, logging each batch range
pub async fn embed_batched<E: Embedder + ?Sized>(
    embedder: &E,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let mut out = Vec::with_capacity(texts.len());

    for (n, chunk) in texts.chunks(batch_size).enumerate() {
        let start = n * batch_size;
        let end = start + chunk.len();
        info!("Embedding batch {}-{} of {}", start, end, texts.len());

        let vectors = embedder.embed(chunk).await?;
        if vectors.len() != chunk.len() {
            return Err(Error::InvalidData(format!(
                "Embedder returned {} vectors for {} texts",
                vectors.len(),
                chunk.len()
            )));
        }
        out.extend(vectors);
    }

    debug!(count = out.len(), "Embedding complete");
    Ok(out)
}
