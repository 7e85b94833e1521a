//! Health handler

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use spendlens_core::AIBackend;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub ai: Option<AiInfo>,
}

#[derive(Serialize)]
pub struct AiInfo {
    pub backend: &'static str,
    pub model: String,
}

/// GET /api/health - Liveness and configured AI backend
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        ai: state.ai.as_ref().map(|client| AiInfo {
            backend: client.kind(),
            model: client.model().to_string(),
        }),
    })
}
