//! Transaction categorization
//!
//! A [`Categorizer`] runs an ordered chain of [`Classifier`] stages. Each
//! stage sees only the transactions earlier stages left unresolved. What is
//! still unresolved at the end gets [`FALLBACK_CATEGORY`].
//!
//! Stages:
//! - `rules`: first keyword match from `categories.json`
//! - `pass`: the bank's own category
//! - `emb`: closest category name by embedding, untrained
//! - `knn`: nearest neighbours over description embeddings
//! - `neural`: small MLP over description embeddings
//! - `ai`: one LLM chat request per transaction

pub mod ai;
pub mod embed;
pub mod knn;
pub mod labels;
pub mod neural;
pub mod pass;
pub mod rules;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ai::AIClient;
use crate::config::{ClassifierSettings, Settings};
use crate::error::{Error, Result};
use crate::models::{Transaction, FALLBACK_CATEGORY};
use crate::store::DataStore;

pub use ai::AiClassifier;
pub use embed::{Embedder, EmbedderClient, HashingEmbedder, RemoteEmbedder};
pub use knn::{KnnClassifier, KnnModel};
pub use labels::LabelEmbeddingClassifier;
pub use neural::{NeuralClassifier, NeuralModel, TrainOptions};
pub use pass::PassClassifier;
pub use rules::{generate_categories, RulesClassifier};

/// Available classifier stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    Rules,
    Pass,
    Embeddings,
    Knn,
    Neural,
    Ai,
}

impl ClassifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::Pass => "pass",
            Self::Embeddings => "emb",
            Self::Knn => "knn",
            Self::Neural => "neural",
            Self::Ai => "ai",
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassifierKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "rules" => Ok(Self::Rules),
            "pass" => Ok(Self::Pass),
            "emb" | "embeddings" => Ok(Self::Embeddings),
            "knn" | "ml" => Ok(Self::Knn),
            "neural" | "tf" => Ok(Self::Neural),
            "ai" => Ok(Self::Ai),
            other => Err(Error::Classifier(format!("Unknown classifier: {}", other))),
        }
    }
}

/// A categorization strategy
///
/// Returns one entry per input transaction, in input order. `None` means
/// no opinion; the chain moves on to its next stage.
#[async_trait]
pub trait Classifier: Send + Sync {
    fn kind(&self) -> ClassifierKind;

    async fn classify(&self, txs: &[Transaction]) -> Result<Vec<Option<String>>>;
}

/// Which stages to run, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSelection {
    pub stages: Vec<ClassifierKind>,
}

impl ChainSelection {
    pub fn single(kind: ClassifierKind) -> Self {
        Self { stages: vec![kind] }
    }

    /// Pick exactly one classifier from on/off flags
    ///
    /// Precedence: rules, then pass, then embeddings, then neural, then AI.
    /// Nothing set means pass-through.
    pub fn from_flags(rules: bool, pass: bool, emb: bool, neural: bool, ai: bool) -> Self {
        let kind = if rules {
            ClassifierKind::Rules
        } else if pass || !(emb || neural || ai) {
            ClassifierKind::Pass
        } else if emb {
            ClassifierKind::Embeddings
        } else if neural {
            ClassifierKind::Neural
        } else {
            ClassifierKind::Ai
        };
        Self::single(kind)
    }

    /// Parse `rules,knn,ai`
    pub fn parse(list: &str) -> Result<Self> {
        let items: Vec<String> = list.split(',').map(str::to_string).collect();
        Self::from_list(&items)
    }

    pub fn from_list(items: &[String]) -> Result<Self> {
        let mut stages = Vec::new();
        for item in items.iter().filter(|s| !s.trim().is_empty()) {
            let kind: ClassifierKind = item.parse()?;
            if !stages.contains(&kind) {
                stages.push(kind);
            }
        }
        if stages.is_empty() {
            return Err(Error::Classifier("Empty classifier chain".into()));
        }
        Ok(Self { stages })
    }

    /// Resolve from settings: explicit chain, then flags, then the
    /// importer's default, then pass-through
    pub fn resolve(settings: &ClassifierSettings, fallback: Option<ClassifierKind>) -> Result<Self> {
        if !settings.chain.is_empty() {
            return Self::from_list(&settings.chain);
        }
        if settings.any_flag() {
            return Ok(Self::from_flags(
                settings.use_rules,
                settings.use_pass,
                settings.use_embeddings,
                settings.use_neural,
                settings.use_ai,
            ));
        }
        Ok(Self::single(fallback.unwrap_or(ClassifierKind::Pass)))
    }

    pub fn is_chain(&self) -> bool {
        self.stages.len() > 1
    }
}

impl fmt::Display for ChainSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.stages.iter().map(|k| k.as_str()).collect();
        f.write_str(&names.join(" -> "))
    }
}

/// Per-stage outcome of a categorize run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub classifier: ClassifierKind,
    pub assigned: usize,
    pub failed: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorizeReport {
    pub total: usize,
    pub stages: Vec<StageReport>,
    /// Transactions that fell through to `other`
    pub fallback: usize,
}

/// Ordered classifier chain
pub struct Categorizer {
    stages: Vec<Box<dyn Classifier>>,
}

impl Categorizer {
    pub fn new(stages: Vec<Box<dyn Classifier>>) -> Self {
        Self { stages }
    }

    pub fn single(stage: Box<dyn Classifier>) -> Self {
        Self::new(vec![stage])
    }

    pub fn kinds(&self) -> Vec<ClassifierKind> {
        self.stages.iter().map(|s| s.kind()).collect()
    }

    /// Assign a category to every transaction
    ///
    /// In a multi-stage chain a stage answering `other` counts as no
    /// opinion, so later stages get a chance at it.
    pub async fn categorize(
        &self,
        mut txs: Vec<Transaction>,
    ) -> Result<(Vec<Transaction>, CategorizeReport)> {
        let mut report = CategorizeReport {
            total: txs.len(),
            ..Default::default()
        };
        let chained = self.stages.len() > 1;
        let mut resolved: Vec<Option<String>> = vec![None; txs.len()];

        for stage in &self.stages {
            let pending: Vec<usize> = (0..txs.len()).filter(|&i| resolved[i].is_none()).collect();
            if pending.is_empty() {
                break;
            }

            let subset: Vec<Transaction> = pending.iter().map(|&i| txs[i].clone()).collect();
            let mut stage_report = StageReport {
                classifier: stage.kind(),
                assigned: 0,
                failed: false,
            };

            match stage.classify(&subset).await {
                Ok(answers) if answers.len() == subset.len() => {
                    for (&i, answer) in pending.iter().zip(answers) {
                        let answer = answer
                            .map(|c| c.trim().to_string())
                            .filter(|c| !c.is_empty())
                            .filter(|c| !(chained && c == FALLBACK_CATEGORY));
                        if answer.is_some() {
                            stage_report.assigned += 1;
                            resolved[i] = answer;
                        }
                    }
                }
                Ok(answers) => {
                    warn!(
                        classifier = %stage.kind(),
                        expected = subset.len(),
                        got = answers.len(),
                        "Classifier returned misaligned results, skipping stage"
                    );
                    stage_report.failed = true;
                }
                Err(e) => {
                    warn!(classifier = %stage.kind(), "Classifier failed, skipping stage: {}", e);
                    stage_report.failed = true;
                }
            }

            info!(
                classifier = %stage.kind(),
                assigned = stage_report.assigned,
                pending = pending.len(),
                "Stage complete"
            );
            report.stages.push(stage_report);
        }

        for (tx, category) in txs.iter_mut().zip(resolved) {
            tx.category = Some(category.unwrap_or_else(|| {
                report.fallback += 1;
                FALLBACK_CATEGORY.to_string()
            }));
        }

        Ok((txs, report))
    }
}

/// A trained model only answers queries embedded at the width it was trained on
fn check_dim(kind: ClassifierKind, model_dim: usize, embedder: &EmbedderClient) -> Result<()> {
    match embedder.dim_hint() {
        Some(dim) if dim != model_dim => Err(Error::Model(format!(
            "{} model expects {}-dim embeddings but the {} embedder produces {}; retrain with train-{}",
            kind,
            model_dim,
            embedder.name(),
            dim,
            kind
        ))),
        _ => Ok(()),
    }
}

/// Construct one classifier stage from the data directory and settings
pub fn build_classifier(
    kind: ClassifierKind,
    store: &DataStore,
    settings: &Settings,
) -> Result<Box<dyn Classifier>> {
    let c = &settings.classifiers;
    Ok(match kind {
        ClassifierKind::Rules => Box::new(RulesClassifier::new(store.load_categories())),
        ClassifierKind::Pass => Box::new(PassClassifier),
        ClassifierKind::Embeddings => Box::new(LabelEmbeddingClassifier::new(
            store.load_categories().names(),
            EmbedderClient::from_settings(settings)?,
            c.embed_batch_size,
        )),
        ClassifierKind::Knn => {
            let model = KnnModel::load(&store.knn_dir())?;
            let embedder = EmbedderClient::from_settings(settings)?;
            if !model.is_empty() {
                check_dim(kind, model.dim, &embedder)?;
            }
            Box::new(KnnClassifier::new(model, embedder, c.embed_batch_size))
        }
        ClassifierKind::Neural => {
            let model = NeuralModel::load(&store.neural_dir())?;
            let embedder = EmbedderClient::from_settings(settings)?;
            check_dim(kind, model.dim, &embedder)?;
            Box::new(NeuralClassifier::new(model, embedder, c.embed_batch_size))
        }
        ClassifierKind::Ai => Box::new(AiClassifier::new(
            AIClient::from_settings(&settings.ai),
            store.load_categories().names(),
            c.ai_concurrency,
        )?),
    })
}

/// Construct the whole chain
pub fn build_categorizer(
    selection: &ChainSelection,
    store: &DataStore,
    settings: &Settings,
) -> Result<Categorizer> {
    let stages = selection
        .stages
        .iter()
        .map(|&kind| build_classifier(kind, store, settings))
        .collect::<Result<Vec<_>>>()?;
    Ok(Categorizer::new(stages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(description: &str, original: &str) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            amount: -1.0,
            description: description.to_string(),
            notes: String::new(),
            original_category: original.to_string(),
            original_category_group: String::new(),
            category: None,
            orig_id: None,
        }
    }

    /// Answers a fixed category for descriptions containing a needle
    struct Fixed {
        kind: ClassifierKind,
        needle: &'static str,
        answer: &'static str,
    }

    #[async_trait]
    impl Classifier for Fixed {
        fn kind(&self) -> ClassifierKind {
            self.kind
        }

        async fn classify(&self, txs: &[Transaction]) -> Result<Vec<Option<String>>> {
            Ok(txs
                .iter()
                .map(|t| {
                    t.description
                        .contains(self.needle)
                        .then(|| self.answer.to_string())
                })
                .collect())
        }
    }

    struct Failing;

    #[async_trait]
    impl Classifier for Failing {
        fn kind(&self) -> ClassifierKind {
            ClassifierKind::Ai
        }

        async fn classify(&self, _txs: &[Transaction]) -> Result<Vec<Option<String>>> {
            Err(Error::Classifier("boom".into()))
        }
    }

    #[test]
    fn test_kind_aliases() {
        assert_eq!("emb".parse::<ClassifierKind>().unwrap(), ClassifierKind::Embeddings);
        assert_eq!("knn".parse::<ClassifierKind>().unwrap(), ClassifierKind::Knn);
        assert_eq!("ML".parse::<ClassifierKind>().unwrap(), ClassifierKind::Knn);
        assert_eq!("tf".parse::<ClassifierKind>().unwrap(), ClassifierKind::Neural);
        assert_eq!(ClassifierKind::Ai.to_string(), "ai");
        assert!("magic".parse::<ClassifierKind>().is_err());
    }

    #[test]
    fn test_flag_precedence() {
        use ClassifierKind::*;
        let pick = |r, p, e, n, a| ChainSelection::from_flags(r, p, e, n, a).stages[0];
        assert_eq!(pick(false, false, false, false, false), Pass);
        assert_eq!(pick(true, true, true, true, true), Rules);
        assert_eq!(pick(false, true, true, false, true), Pass);
        assert_eq!(pick(false, false, true, true, true), Embeddings);
        assert_eq!(pick(false, false, false, true, true), Neural);
        assert_eq!(pick(false, false, false, false, true), Ai);
    }

    #[test]
    fn test_chain_parse() {
        let sel = ChainSelection::parse("rules, knn,ai,rules").unwrap();
        assert_eq!(
            sel.stages,
            vec![ClassifierKind::Rules, ClassifierKind::Knn, ClassifierKind::Ai]
        );
        assert!(sel.is_chain());
        assert_eq!(sel.to_string(), "rules -> knn -> ai");
        assert_eq!(
            ChainSelection::parse("embeddings,pass").unwrap().stages,
            vec![ClassifierKind::Embeddings, ClassifierKind::Pass]
        );
        assert!(ChainSelection::parse(" , ").is_err());
    }

    #[test]
    fn test_resolve_order() {
        let mut s = ClassifierSettings::default();
        assert_eq!(
            ChainSelection::resolve(&s, Some(ClassifierKind::Rules)).unwrap(),
            ChainSelection::single(ClassifierKind::Rules)
        );
        s.use_ai = true;
        assert_eq!(
            ChainSelection::resolve(&s, Some(ClassifierKind::Rules)).unwrap(),
            ChainSelection::single(ClassifierKind::Ai)
        );
        s.chain = vec!["pass".into(), "rules".into()];
        assert_eq!(
            ChainSelection::resolve(&s, None).unwrap().stages,
            vec![ClassifierKind::Pass, ClassifierKind::Rules]
        );
    }

    #[tokio::test]
    async fn test_chain_resolves_in_order_and_falls_back() {
        let categorizer = Categorizer::new(vec![
            Box::new(Fixed {
                kind: ClassifierKind::Rules,
                needle: "TESCO",
                answer: "Groceries",
            }),
            Box::new(Fixed {
                kind: ClassifierKind::Pass,
                needle: "",
                answer: "other",
            }),
            Box::new(Fixed {
                kind: ClassifierKind::Ai,
                needle: "UBER",
                answer: "Transport",
            }),
        ]);

        let txs = vec![tx("TESCO UBER", ""), tx("UBER TRIP", ""), tx("MYSTERY", "")];
        let (out, report) = categorizer.categorize(txs).await.unwrap();

        assert_eq!(out[0].category.as_deref(), Some("Groceries"));
        // "other" from the middle stage is not final in a chain
        assert_eq!(out[1].category.as_deref(), Some("Transport"));
        assert_eq!(out[2].category.as_deref(), Some("other"));
        assert_eq!(report.total, 3);
        assert_eq!(report.fallback, 1);
        assert_eq!(report.stages[0].assigned, 1);
        assert_eq!(report.stages[1].assigned, 0);
        assert_eq!(report.stages[2].assigned, 1);
    }

    #[tokio::test]
    async fn test_failing_stage_is_skipped() {
        let categorizer = Categorizer::new(vec![
            Box::new(Failing),
            Box::new(Fixed {
                kind: ClassifierKind::Pass,
                needle: "",
                answer: "Misc",
            }),
        ]);
        let (out, report) = categorizer.categorize(vec![tx("X", "")]).await.unwrap();
        assert_eq!(out[0].category.as_deref(), Some("Misc"));
        assert!(report.stages[0].failed);
    }

    #[tokio::test]
    async fn test_single_stage_keeps_other() {
        let categorizer = Categorizer::single(Box::new(PassClassifier));
        let (out, report) = categorizer
            .categorize(vec![tx("A", "other"), tx("B", "")])
            .await
            .unwrap();
        assert_eq!(out[0].category.as_deref(), Some("other"));
        assert_eq!(out[1].category.as_deref(), Some("other"));
        assert_eq!(report.stages[0].assigned, 1);
        assert_eq!(report.fallback, 1);
    }

    #[tokio::test]
    async fn test_emb_flag_works_on_fresh_data_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = DataStore::new(dir.path());
        let mut categories = crate::models::CategoryKeywords::new();
        categories.insert("Groceries", vec![]);
        categories.insert("Transport", vec![]);
        store.save_categories(&categories).unwrap();

        let mut settings = Settings::defaults().unwrap();
        settings.classifiers.use_embeddings = true;
        let selection = ChainSelection::resolve(&settings.classifiers, None).unwrap();
        assert_eq!(selection, ChainSelection::single(ClassifierKind::Embeddings));

        // no knn model on disk
        assert!(build_classifier(ClassifierKind::Knn, &store, &settings).is_err());

        let categorizer = build_categorizer(&selection, &store, &settings).unwrap();
        let (out, report) = categorizer
            .categorize(vec![tx("TRANSPORT FOR LONDON", ""), tx("big groceries shop", "")])
            .await
            .unwrap();
        assert_eq!(out[0].category.as_deref(), Some("Transport"));
        assert_eq!(out[1].category.as_deref(), Some("Groceries"));
        assert!(!report.stages[0].failed);
        assert_eq!(report.fallback, 0);
    }
}
