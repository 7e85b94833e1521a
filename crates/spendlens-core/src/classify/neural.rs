//! Small feed-forward network over description embeddings
//!
//! `input(dim) -> dense(hidden, relu) -> dropout -> dense(classes, softmax)`,
//! trained with Adam on categorical cross-entropy. Saved in
//! `tx-classifier/` as `model.json` (weights) and `classes.json`.

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::Transaction;
use crate::store::write_atomic;

use super::embed::{embed_batched, Embedder, EmbedderClient};
use super::{Classifier, ClassifierKind};

pub const MODEL_FILE: &str = "model.json";
pub const CLASSES_FILE: &str = "classes.json";

const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPSILON: f32 = 1e-7;

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub hidden: usize,
    pub dropout: f32,
    pub learning_rate: f32,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 20,
            batch_size: 32,
            hidden: 128,
            dropout: 0.2,
            learning_rate: 0.001,
            seed: 42,
        }
    }
}

/// xorshift64* generator; enough for shuffling and weight init
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(if seed == 0 { 0x9e37_79b9_7f4a_7c15 } else { seed })
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    /// Uniform in [0, 1)
    fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = (self.next_u64() % (i as u64 + 1)) as usize;
            items.swap(i, j);
        }
    }
}

/// He-uniform: U(-sqrt(6/fan_in), sqrt(6/fan_in))
fn he_uniform(rng: &mut XorShift, fan_in: usize, n: usize) -> Vec<f32> {
    let limit = (6.0 / fan_in.max(1) as f32).sqrt();
    (0..n).map(|_| (rng.next_f32() * 2.0 - 1.0) * limit).collect()
}

struct Adam {
    m: Vec<f32>,
    v: Vec<f32>,
}

impl Adam {
    fn new(n: usize) -> Self {
        Self {
            m: vec![0.0; n],
            v: vec![0.0; n],
        }
    }

    fn step(&mut self, params: &mut [f32], grads: &[f32], lr: f32, t: i32) {
        let c1 = 1.0 - ADAM_BETA1.powi(t);
        let c2 = 1.0 - ADAM_BETA2.powi(t);
        for i in 0..params.len() {
            let g = grads[i];
            self.m[i] = ADAM_BETA1 * self.m[i] + (1.0 - ADAM_BETA1) * g;
            self.v[i] = ADAM_BETA2 * self.v[i] + (1.0 - ADAM_BETA2) * g * g;
            let m_hat = self.m[i] / c1;
            let v_hat = self.v[i] / c2;
            params[i] -= lr * m_hat / (v_hat.sqrt() + ADAM_EPSILON);
        }
    }
}

/// Weights as stored in `model.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Weights {
    dim: usize,
    hidden: usize,
    /// `dim x hidden`, row-major
    w1: Vec<f32>,
    b1: Vec<f32>,
    /// `hidden x classes`, row-major
    w2: Vec<f32>,
    b2: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NeuralModel {
    pub classes: Vec<String>,
    pub dim: usize,
    pub hidden: usize,
    w1: Vec<f32>,
    b1: Vec<f32>,
    w2: Vec<f32>,
    b2: Vec<f32>,
}

impl NeuralModel {
    /// Embed `texts` and fit the network
    pub async fn train<E: Embedder + ?Sized>(
        texts: &[String],
        labels: &[String],
        embedder: &E,
        options: &TrainOptions,
        embed_batch_size: usize,
    ) -> Result<Self> {
        if texts.is_empty() {
            return Err(Error::InvalidData("No training data".into()));
        }
        let vectors = embed_batched(embedder, texts, embed_batch_size).await?;
        Self::train_on_vectors(&vectors, labels, options)
    }

    pub fn train_on_vectors(
        inputs: &[Vec<f32>],
        labels: &[String],
        options: &TrainOptions,
    ) -> Result<Self> {
        if inputs.is_empty() {
            return Err(Error::InvalidData("No training data".into()));
        }
        if inputs.len() != labels.len() {
            return Err(Error::InvalidData(format!(
                "{} inputs but {} labels",
                inputs.len(),
                labels.len()
            )));
        }

        let dim = inputs[0].len();
        if let Some(bad) = inputs.iter().position(|x| x.len() != dim) {
            return Err(Error::InvalidData(format!(
                "Input {} has dimension {}, expected {}",
                bad,
                inputs[bad].len(),
                dim
            )));
        }

        let mut classes: Vec<String> = Vec::new();
        let targets: Vec<usize> = labels
            .iter()
            .map(|label| match classes.iter().position(|c| c == label) {
                Some(i) => i,
                None => {
                    classes.push(label.clone());
                    classes.len() - 1
                }
            })
            .collect();

        let hidden = options.hidden.max(1);
        let n_classes = classes.len();
        let mut rng = XorShift::new(options.seed);

        let mut model = Self {
            dim,
            hidden,
            w1: he_uniform(&mut rng, dim, dim * hidden),
            b1: vec![0.0; hidden],
            w2: he_uniform(&mut rng, hidden, hidden * n_classes),
            b2: vec![0.0; n_classes],
            classes,
        };

        let mut opt_w1 = Adam::new(model.w1.len());
        let mut opt_b1 = Adam::new(hidden);
        let mut opt_w2 = Adam::new(model.w2.len());
        let mut opt_b2 = Adam::new(n_classes);

        let dropout = options.dropout.clamp(0.0, 0.95);
        let keep_scale = 1.0 / (1.0 - dropout);
        let batch_size = options.batch_size.max(1);
        let mut order: Vec<usize> = (0..inputs.len()).collect();
        let mut step = 0i32;

        info!(
            samples = inputs.len(),
            dim,
            hidden,
            classes = n_classes,
            epochs = options.epochs,
            "Training neural classifier"
        );

        for epoch in 0..options.epochs {
            rng.shuffle(&mut order);
            let mut epoch_loss = 0.0f32;

            for batch in order.chunks(batch_size) {
                let mut g_w1 = vec![0.0f32; model.w1.len()];
                let mut g_b1 = vec![0.0f32; hidden];
                let mut g_w2 = vec![0.0f32; model.w2.len()];
                let mut g_b2 = vec![0.0f32; n_classes];
                let scale = 1.0 / batch.len() as f32;

                for &idx in batch {
                    let x = &inputs[idx];
                    let pre = model.hidden_pre(x);

                    // relu then inverted dropout; mask holds the per-unit multiplier
                    let mask: Vec<f32> = (0..hidden)
                        .map(|_| {
                            if dropout > 0.0 && rng.next_f32() < dropout {
                                0.0
                            } else {
                                keep_scale
                            }
                        })
                        .collect();
                    let h: Vec<f32> = pre
                        .iter()
                        .zip(&mask)
                        .map(|(p, m)| p.max(0.0) * m)
                        .collect();

                    let probs = softmax(&model.output(&h));
                    let target = targets[idx];
                    epoch_loss -= probs[target].max(1e-12).ln();

                    let d_logits: Vec<f32> = probs
                        .iter()
                        .enumerate()
                        .map(|(c, p)| (p - if c == target { 1.0 } else { 0.0 }) * scale)
                        .collect();

                    let mut d_h = vec![0.0f32; hidden];
                    for j in 0..hidden {
                        let row = &model.w2[j * n_classes..(j + 1) * n_classes];
                        for c in 0..n_classes {
                            g_w2[j * n_classes + c] += h[j] * d_logits[c];
                            d_h[j] += row[c] * d_logits[c];
                        }
                        if pre[j] <= 0.0 {
                            d_h[j] = 0.0;
                        } else {
                            d_h[j] *= mask[j];
                        }
                    }
                    for c in 0..n_classes {
                        g_b2[c] += d_logits[c];
                    }

                    for (i, xi) in x.iter().enumerate() {
                        if *xi == 0.0 {
                            continue;
                        }
                        let g_row = &mut g_w1[i * hidden..(i + 1) * hidden];
                        for j in 0..hidden {
                            g_row[j] += xi * d_h[j];
                        }
                    }
                    for j in 0..hidden {
                        g_b1[j] += d_h[j];
                    }
                }

                step += 1;
                let lr = options.learning_rate;
                opt_w1.step(&mut model.w1, &g_w1, lr, step);
                opt_b1.step(&mut model.b1, &g_b1, lr, step);
                opt_w2.step(&mut model.w2, &g_w2, lr, step);
                opt_b2.step(&mut model.b2, &g_b2, lr, step);
            }

            debug!(
                epoch = epoch + 1,
                loss = epoch_loss / inputs.len() as f32,
                "Epoch complete"
            );
        }

        Ok(model)
    }

    fn hidden_pre(&self, x: &[f32]) -> Vec<f32> {
        let mut out = self.b1.clone();
        for (i, xi) in x.iter().enumerate() {
            if *xi == 0.0 {
                continue;
            }
            let row = &self.w1[i * self.hidden..(i + 1) * self.hidden];
            for (o, w) in out.iter_mut().zip(row) {
                *o += xi * w;
            }
        }
        out
    }

    fn output(&self, h: &[f32]) -> Vec<f32> {
        let n = self.classes.len();
        let mut out = self.b2.clone();
        for (j, hj) in h.iter().enumerate() {
            if *hj == 0.0 {
                continue;
            }
            let row = &self.w2[j * n..(j + 1) * n];
            for (o, w) in out.iter_mut().zip(row) {
                *o += hj * w;
            }
        }
        out
    }

    /// Class scores (softmax) for one input
    pub fn scores(&self, x: &[f32]) -> Result<Vec<f32>> {
        if x.len() != self.dim {
            return Err(Error::Model(format!(
                "Input has dimension {}, model expects {}",
                x.len(),
                self.dim
            )));
        }
        let h: Vec<f32> = self.hidden_pre(x).into_iter().map(|v| v.max(0.0)).collect();
        Ok(softmax(&self.output(&h)))
    }

    /// Argmax class; `None` when the scores are unusable
    pub fn predict(&self, x: &[f32]) -> Result<Option<String>> {
        if self.classes.is_empty() {
            return Ok(None);
        }
        let scores = self.scores(x)?;
        if scores.iter().any(|s| !s.is_finite()) {
            return Ok(None);
        }
        let best = scores
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |acc, (i, s)| if *s > acc.1 { (i, *s) } else { acc });
        Ok(self.classes.get(best.0).cloned())
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let weights = Weights {
            dim: self.dim,
            hidden: self.hidden,
            w1: self.w1.clone(),
            b1: self.b1.clone(),
            w2: self.w2.clone(),
            b2: self.b2.clone(),
        };
        write_atomic(&dir.join(MODEL_FILE), &serde_json::to_vec(&weights)?)?;
        write_atomic(&dir.join(CLASSES_FILE), &serde_json::to_vec_pretty(&self.classes)?)?;
        debug!(dir = %dir.display(), "Saved neural model");
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let model_path = dir.join(MODEL_FILE);
        let classes_path = dir.join(CLASSES_FILE);
        if !model_path.exists() || !classes_path.exists() {
            return Err(Error::Model(format!(
                "No neural model in {}; run train-neural first",
                dir.display()
            )));
        }

        let weights: Weights = serde_json::from_slice(&fs::read(&model_path)?)?;
        let classes: Vec<String> = serde_json::from_slice(&fs::read(&classes_path)?)?;
        let n = classes.len();

        if weights.w1.len() != weights.dim * weights.hidden
            || weights.b1.len() != weights.hidden
            || weights.w2.len() != weights.hidden * n
            || weights.b2.len() != n
        {
            return Err(Error::Model(format!(
                "{} does not match {} classes; retrain with train-neural",
                MODEL_FILE, n
            )));
        }

        Ok(Self {
            classes,
            dim: weights.dim,
            hidden: weights.hidden,
            w1: weights.w1,
            b1: weights.b1,
            w2: weights.w2,
            b2: weights.b2,
        })
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

pub struct NeuralClassifier {
    model: NeuralModel,
    embedder: EmbedderClient,
    batch_size: usize,
}

impl NeuralClassifier {
    pub fn new(model: NeuralModel, embedder: EmbedderClient, batch_size: usize) -> Self {
        Self {
            model,
            embedder,
            batch_size,
        }
    }
}

#[async_trait]
impl Classifier for NeuralClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Neural
    }

    async fn classify(&self, txs: &[Transaction]) -> Result<Vec<Option<String>>> {
        let texts: Vec<String> = txs.iter().map(|t| t.description.clone()).collect();
        let vectors = embed_batched(&self.embedder, &texts, self.batch_size).await?;
        vectors.iter().map(|v| self.model.predict(v)).collect()
    }
}
