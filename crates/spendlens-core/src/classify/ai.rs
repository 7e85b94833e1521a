//! LLM classifier: one chat request per transaction

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::ai::{AIBackend, AIClient};
use crate::error::{Error, Result};
use crate::models::Transaction;

use super::{Classifier, ClassifierKind};

pub const SYSTEM_PROMPT: &str =
    "You are a financial assistant that classifies transactions into categories.";

/// Log a progress line every this many completions
const PROGRESS_EVERY: usize = 25;

pub struct AiClassifier {
    client: AIClient,
    categories: Arc<Vec<String>>,
    concurrency: usize,
}

impl AiClassifier {
    /// Fails when no backend is configured
    pub fn new(client: Option<AIClient>, categories: Vec<String>, concurrency: usize) -> Result<Self> {
        let client = client.ok_or_else(|| {
            Error::Config(
                "AI mode requested but no AI backend is configured \
                 (set OPENAI_API_KEY, OLLAMA_HOST or AI_BACKEND)"
                    .into(),
            )
        })?;
        Ok(Self {
            client,
            categories: Arc::new(categories),
            concurrency: concurrency.max(1),
        })
    }
}

pub fn build_prompt(tx: &Transaction, categories: &[String]) -> String {
    format!(
        "Categories: {}\nAssign the best category to this transaction. Reply with exactly one category from the list.\nDate: {}\nAmount: {}\nDescription: {}\nOriginal Category: {}",
        categories.join(", "),
        tx.date_key(),
        tx.amount,
        tx.description,
        tx.original_category
    )
}

/// Map a model reply onto the category list
///
/// Exact match first, then case-insensitive. Anything else is no answer.
pub fn match_reply(reply: &str, categories: &[String]) -> Option<String> {
    let reply = reply.trim();
    if let Some(c) = categories.iter().find(|c| c.as_str() == reply) {
        return Some(c.clone());
    }
    let lower = reply.to_lowercase();
    categories.iter().find(|c| c.to_lowercase() == lower).cloned()
}

#[async_trait]
impl Classifier for AiClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Ai
    }

    async fn classify(&self, txs: &[Transaction]) -> Result<Vec<Option<String>>> {
        let total = txs.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        info!(
            backend = self.client.kind(),
            model = self.client.model(),
            total,
            concurrency = self.concurrency,
            "Classifying with AI"
        );

        for (i, tx) in txs.iter().enumerate() {
            let prompt = build_prompt(tx, &self.categories);
            let client = self.client.clone();
            let categories = Arc::clone(&self.categories);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let answer = match client.chat(SYSTEM_PROMPT, &prompt).await {
                    Ok(reply) => match_reply(&reply, &categories),
                    Err(e) => {
                        warn!(index = i, "AI request failed: {}", e);
                        None
                    }
                };
                (i, answer)
            });
        }

        let mut results = vec![None; total];
        let mut done = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, answer)) => results[i] = answer,
                Err(e) => warn!("AI task panicked: {}", e),
            }
            done += 1;
            if done % PROGRESS_EVERY == 0 || done == total {
                info!("AI classified {}/{}", done, total);
            }
        }

        Ok(results)
    }
}
