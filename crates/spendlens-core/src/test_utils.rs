//! Test utilities for spendlens-core
//!
//! A mock AI server speaking both the OpenAI-compatible and the Ollama HTTP
//! APIs, so the real HTTP backends can be exercised in tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::ai::mock::{mock_reply, MOCK_EMBEDDING_DIM};
use crate::classify::embed::hash_embed;

#[derive(Clone, Default)]
struct MockState {
    chat_requests: Arc<AtomicUsize>,
    embed_requests: Arc<AtomicUsize>,
}

/// Mock OpenAI/Ollama server for tests
pub struct MockAiServer {
    addr: SocketAddr,
    state: MockState,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockAiServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/v1/chat/completions", post(handle_openai_chat))
            .route("/v1/embeddings", post(handle_openai_embeddings))
            .route("/v1/models", get(handle_models))
            .route("/api/chat", post(handle_ollama_chat))
            .route("/api/embed", post(handle_ollama_embed))
            .route("/api/tags", get(handle_tags))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Chat requests served so far (both APIs)
    pub fn chat_requests(&self) -> usize {
        self.state.chat_requests.load(Ordering::SeqCst)
    }

    /// Embedding requests served so far (both APIs)
    pub fn embed_requests(&self) -> usize {
        self.state.embed_requests.load(Ordering::SeqCst)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockAiServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Deserialize)]
struct Message {
    role: String,
    content: String,
}

/// Last user message of a chat request
fn user_prompt(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

fn embed_all(input: &[String]) -> Vec<Vec<f32>> {
    input
        .iter()
        .map(|t| hash_embed(t, MOCK_EMBEDDING_DIM))
        .collect()
}

// ----- OpenAI-compatible -----

#[derive(Debug, Deserialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct OpenAIChatResponse {
    model: String,
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Serialize)]
struct OpenAIChoice {
    index: usize,
    message: OutMessage,
}

#[derive(Debug, Serialize)]
struct OutMessage {
    role: &'static str,
    content: String,
}

async fn handle_openai_chat(
    State(state): State<MockState>,
    Json(request): Json<OpenAIChatRequest>,
) -> Json<OpenAIChatResponse> {
    state.chat_requests.fetch_add(1, Ordering::SeqCst);
    Json(OpenAIChatResponse {
        model: request.model,
        choices: vec![OpenAIChoice {
            index: 0,
            message: OutMessage {
                role: "assistant",
                content: mock_reply(user_prompt(&request.messages)),
            },
        }],
    })
}

#[derive(Debug, Deserialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Serialize)]
struct OpenAIEmbeddingResponse {
    model: String,
    data: Vec<OpenAIEmbedding>,
}

#[derive(Debug, Serialize)]
struct OpenAIEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

/// Returns the embeddings in reverse order; clients must sort by `index`
async fn handle_openai_embeddings(
    State(state): State<MockState>,
    Json(request): Json<EmbedRequest>,
) -> Json<OpenAIEmbeddingResponse> {
    state.embed_requests.fetch_add(1, Ordering::SeqCst);
    let mut data: Vec<OpenAIEmbedding> = embed_all(&request.input)
        .into_iter()
        .enumerate()
        .map(|(index, embedding)| OpenAIEmbedding { index, embedding })
        .collect();
    data.reverse();
    Json(OpenAIEmbeddingResponse {
        model: request.model,
        data,
    })
}

async fn handle_models() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "object": "list",
        "data": [{"id": "gpt-3.5-turbo", "object": "model"}]
    }))
}

// ----- Ollama -----

#[derive(Debug, Deserialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct OllamaChatResponse {
    model: String,
    message: OutMessage,
    done: bool,
}

async fn handle_ollama_chat(
    State(state): State<MockState>,
    Json(request): Json<OllamaChatRequest>,
) -> Json<OllamaChatResponse> {
    state.chat_requests.fetch_add(1, Ordering::SeqCst);
    Json(OllamaChatResponse {
        model: request.model,
        message: OutMessage {
            role: "assistant",
            content: mock_reply(user_prompt(&request.messages)),
        },
        done: true,
    })
}

#[derive(Debug, Serialize)]
struct OllamaEmbedResponse {
    model: String,
    embeddings: Vec<Vec<f32>>,
}

async fn handle_ollama_embed(
    State(state): State<MockState>,
    Json(request): Json<EmbedRequest>,
) -> Json<OllamaEmbedResponse> {
    state.embed_requests.fetch_add(1, Ordering::SeqCst);
    Json(OllamaEmbedResponse {
        model: request.model,
        embeddings: embed_all(&request.input),
    })
}

/// Ollama tags endpoint response (health check)
async fn handle_tags() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "models": [{
            "name": "llama3.2:latest",
            "modified_at": "2024-01-01T00:00:00Z",
            "size": 4_000_000_000u64
        }]
    }))
}
