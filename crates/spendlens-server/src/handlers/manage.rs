//! Data management handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use tracing::{info, warn};

use spendlens_core::pipeline::{self, regenerate_summary};
use spendlens_core::ProcessReport;

use crate::{AppError, AppState, SuccessResponse};

/// POST /api/manage/reset - Clear the data directory and reseed defaults
pub async fn reset_data(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse>, AppError> {
    let _guard = state.write_lock.lock().await;
    state.store.reset()?;
    state.store.seed_defaults()?;
    regenerate_summary(&state.store, &state.settings)?;
    warn!(dir = %state.store.root().display(), "Data directory reset via API");
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/manage/load-default-categories - Overwrite categories.json
pub async fn load_default_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse>, AppError> {
    let _guard = state.write_lock.lock().await;
    state.store.load_default_categories()?;
    info!("Loaded default categories");
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/manage/process - Ingest, categorize and summarize the import dir
pub async fn process_imports(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ProcessReport>, AppError> {
    let _guard = state.write_lock.lock().await;
    let report = pipeline::process_imports(&state.store, &state.settings)
        .await
        .map_err(AppError::core)?;
    info!(
        total = report.ingest.total,
        chain = %report.chain,
        months = report.months,
        "Processed imports via API"
    );
    Ok(Json(report))
}
