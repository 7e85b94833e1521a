//! Mock backend for testing
//!
//! Deterministic replies for the classifier prompt and hashing-based
//! embeddings, so the LLM and KNN paths can run without a server.

use async_trait::async_trait;

use crate::classify::embed::hash_embed;
use crate::error::Result;

use super::AIBackend;

/// Embedding width returned by the mock
pub const MOCK_EMBEDDING_DIM: usize = 64;

/// Mock AI backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self { healthy: true }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self { healthy: false }
    }
}

/// Reply to a classification prompt the way a cooperative model would
///
/// Picks the first listed category whose name appears in the description,
/// else the first category. Prompts without a category list get `other`.
pub(crate) fn mock_reply(user: &str) -> String {
    let field = |prefix: &str| {
        user.lines()
            .find_map(|l| l.strip_prefix(prefix))
            .map(str::trim)
            .unwrap_or("")
    };

    let categories: Vec<&str> = field("Categories:")
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    let description = field("Description:").to_lowercase();

    categories
        .iter()
        .find(|c| description.contains(&c.to_lowercase()))
        .or_else(|| categories.first())
        .map(|c| c.to_string())
        .unwrap_or_else(|| "other".to_string())
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn chat(&self, _system: &str, user: &str) -> Result<String> {
        Ok(mock_reply(user))
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| hash_embed(t, MOCK_EMBEDDING_DIM))
            .collect())
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
