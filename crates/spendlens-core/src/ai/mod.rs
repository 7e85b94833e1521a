//! Pluggable AI backend abstraction
//!
//! Chat completions drive the LLM classifier, embeddings drive the KNN and
//! neural classifiers when the remote embedder is selected.
//!
//! # Architecture
//!
//! - `AIBackend` trait: the interface every backend implements
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `OllamaBackend`, `MockBackend`
//!
//! # Usage
//!
//! ```rust,ignore
//! if let Some(client) = AIClient::from_env() {
//!     let reply = client.chat("You are helpful.", "Say hi").await?;
//! }
//! ```
//!
//! # Configuration
//!
//! Environment variables (see `config::AiSettings`):
//! - `AI_BACKEND`: `openai`, `ollama` or `mock`. Inferred when unset.
//! - `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `OPENAI_MODEL`, `OPENAI_EMBEDDING_MODEL`
//! - `OLLAMA_HOST`, `OLLAMA_MODEL`, `OLLAMA_EMBEDDING_MODEL`

pub(crate) mod mock;
mod ollama;
mod openai_compatible;

pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;

use async_trait::async_trait;
use tracing::warn;

use crate::config::AiSettings;
use crate::error::Result;

/// Default Ollama address when `AI_BACKEND=ollama` is set without a host
const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// Trait defining the interface for all AI backends
///
/// Backends are Send + Sync so one client can be shared by many
/// concurrent classification tasks.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Single-turn chat: system prompt plus one user message
    async fn chat(&self, system: &str, user: &str) -> Result<String>;

    /// Embed a batch of texts, one vector per input in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Chat model name (for logging)
    fn model(&self) -> &str;

    /// Host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// OpenAI or any server implementing its chat/embeddings API
    OpenAICompatible(OpenAICompatibleBackend),
    /// Ollama HTTP API
    Ollama(OllamaBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Returns None when no backend is configured.
    pub fn from_env() -> Option<Self> {
        Self::from_settings(&AiSettings::from_env())
    }

    /// Create an AI client from resolved settings
    ///
    /// `backend` wins when set. Otherwise an OpenAI key selects OpenAI and
    /// an Ollama host selects Ollama.
    pub fn from_settings(settings: &AiSettings) -> Option<Self> {
        let backend = match settings.backend.as_deref() {
            Some(b) => b.to_lowercase(),
            None if settings.openai_api_key.is_some() => "openai".to_string(),
            None if settings.ollama_host.is_some() => "ollama".to_string(),
            None => return None,
        };

        match backend.as_str() {
            "openai" | "openai_compatible" => {
                let mut b = OpenAICompatibleBackend::new(
                    &settings.openai_base_url,
                    &settings.openai_model,
                )
                .with_embedding_model(&settings.openai_embedding_model);
                if let Some(key) = &settings.openai_api_key {
                    b = b.with_key(key);
                }
                Some(AIClient::OpenAICompatible(b))
            }
            "ollama" => {
                let host = settings
                    .ollama_host
                    .as_deref()
                    .unwrap_or(DEFAULT_OLLAMA_HOST);
                Some(AIClient::Ollama(
                    OllamaBackend::new(host, &settings.ollama_model)
                        .with_embedding_model(&settings.ollama_embedding_model),
                ))
            }
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            other => {
                warn!(backend = %other, "Unknown AI_BACKEND, AI features disabled");
                None
            }
        }
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Backend name for logs and the health endpoint
    pub fn kind(&self) -> &'static str {
        match self {
            AIClient::OpenAICompatible(_) => "openai",
            AIClient::Ollama(_) => "ollama",
            AIClient::Mock(_) => "mock",
        }
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.chat(system, user).await,
            AIClient::Ollama(b) => b.chat(system, user).await,
            AIClient::Mock(b) => b.chat(system, user).await,
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            AIClient::OpenAICompatible(b) => b.embed(texts).await,
            AIClient::Ollama(b) => b.embed(texts).await,
            AIClient::Mock(b) => b.embed(texts).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Ollama(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Ollama(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Ollama(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> AiSettings {
        AiSettings {
            openai_base_url: "https://api.openai.com".into(),
            openai_model: "gpt-3.5-turbo".into(),
            openai_embedding_model: "text-embedding-ada-002".into(),
            ollama_model: "llama3.2".into(),
            ollama_embedding_model: "nomic-embed-text".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_ai_client_mock() {
        let client = AIClient::mock();
        assert_eq!(client.model(), "mock");
        assert_eq!(client.host(), "mock://localhost");
        assert_eq!(client.kind(), "mock");
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        let client = AIClient::mock();
        assert!(client.health_check().await);
    }

    #[test]
    fn test_from_settings_unconfigured() {
        assert!(AIClient::from_settings(&settings()).is_none());
    }

    #[test]
    fn test_from_settings_infers_openai() {
        let mut s = settings();
        s.openai_api_key = Some("sk-test".into());
        let client = AIClient::from_settings(&s).unwrap();
        assert_eq!(client.kind(), "openai");
        assert_eq!(client.model(), "gpt-3.5-turbo");
        assert_eq!(client.host(), "https://api.openai.com");
    }

    #[test]
    fn test_from_settings_infers_ollama() {
        let mut s = settings();
        s.ollama_host = Some("http://gpu-box:11434/".into());
        let client = AIClient::from_settings(&s).unwrap();
        assert_eq!(client.kind(), "ollama");
        assert_eq!(client.host(), "http://gpu-box:11434");
    }

    #[test]
    fn test_from_settings_explicit_backend_wins() {
        let mut s = settings();
        s.openai_api_key = Some("sk-test".into());
        s.backend = Some("MOCK".into());
        assert_eq!(AIClient::from_settings(&s).unwrap().kind(), "mock");

        s.backend = Some("ollama".into());
        let client = AIClient::from_settings(&s).unwrap();
        assert_eq!(client.host(), DEFAULT_OLLAMA_HOST);

        s.backend = Some("bogus".into());
        assert!(AIClient::from_settings(&s).is_none());
    }
}
