//! Export handler

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, Response, StatusCode},
};
use serde::Deserialize;

use spendlens_core::ExportFormat;

use crate::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "qif".to_string()
}

/// GET /api/export - Download categorized transactions as QIF or CSV
pub async fn export_transactions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExportQuery>,
) -> Result<Response<Body>, AppError> {
    let format: ExportFormat = params.format.parse().map_err(AppError::core)?;
    let txs = state
        .store
        .load_categorized()?
        .ok_or_else(|| AppError::not_found("Transaction data not found"))?;

    let content = format.render(&txs)?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format.content_type())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", format.file_name()),
        )
        .body(Body::from(content))
        .map_err(|e| AppError::from(anyhow::anyhow!("Failed to build response: {}", e)))
}
