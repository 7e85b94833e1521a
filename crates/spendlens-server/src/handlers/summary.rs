//! Summary and insight view handlers
//!
//! Everything here reads the stored `summary.json`; nothing recomputes from
//! transactions.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Datelike;
use serde::Deserialize;

use spendlens_core::summary::{
    all_years, dashboard, month_insights, month_view, year_insights, year_view, Dashboard,
    MonthInsights, MonthView, YearInsights, YearView, YearWithSpending,
};
use spendlens_core::Summary;

use crate::{AppError, AppState};

/// Four-digit year path segment
pub(crate) fn parse_year(year: &str) -> Result<&str, AppError> {
    if year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit()) {
        Ok(year)
    } else {
        Err(AppError::bad_request("Year must be four digits"))
    }
}

/// Month path segment of one or two digits, returned zero-padded
pub(crate) fn parse_month(month: &str) -> Result<String, AppError> {
    let valid = !month.is_empty() && month.len() <= 2 && month.bytes().all(|b| b.is_ascii_digit());
    match month.parse::<u32>() {
        Ok(m @ 1..=12) if valid => Ok(format!("{:02}", m)),
        _ => Err(AppError::bad_request("Month must be between 1 and 12")),
    }
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    /// `YYYY-MM`
    pub month: Option<String>,
}

/// GET /api/summary - Stored summary, optionally restricted to one month
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SummaryQuery>,
) -> Json<Summary> {
    let summary = state.store.load_summary();
    match params.month.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        Some(month) => Json(summary.for_month(month)),
        None => Json(summary),
    }
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub year: Option<String>,
}

/// GET /api/dashboard - Headline figures for one year (default: current year)
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DashboardQuery>,
) -> Result<Json<Dashboard>, AppError> {
    let year = match params.year.filter(|y| !y.is_empty()) {
        Some(year) => parse_year(&year)?.to_string(),
        None => chrono::Local::now().year().to_string(),
    };
    Ok(Json(dashboard(&state.store.load_summary(), &year)))
}

/// GET /api/years - Every year with its annual spending
pub async fn list_years(State(state): State<Arc<AppState>>) -> Json<Vec<YearWithSpending>> {
    Json(all_years(&state.store.load_summary()))
}

pub async fn get_year(
    State(state): State<Arc<AppState>>,
    Path(year): Path<String>,
) -> Result<Json<YearView>, AppError> {
    let year = parse_year(&year)?;
    Ok(Json(year_view(&state.store.load_summary(), year)))
}

pub async fn get_year_insights(
    State(state): State<Arc<AppState>>,
    Path(year): Path<String>,
) -> Result<Json<YearInsights>, AppError> {
    let year = parse_year(&year)?;
    Ok(Json(year_insights(&state.store.load_summary(), year)))
}

/// GET /api/years/:year/:month - Month overview with category changes
pub async fn get_month(
    State(state): State<Arc<AppState>>,
    Path((year, month)): Path<(String, String)>,
) -> Result<Json<MonthView>, AppError> {
    let year = parse_year(&year)?;
    let month = parse_month(&month)?;
    Ok(Json(month_view(&state.store.load_summary(), year, &month)))
}

pub async fn get_month_insights(
    State(state): State<Arc<AppState>>,
    Path((year, month)): Path<(String, String)>,
) -> Result<Json<MonthInsights>, AppError> {
    let year = parse_year(&year)?;
    let month = parse_month(&month)?;
    Ok(Json(month_insights(&state.store.load_summary(), year, &month)))
}
