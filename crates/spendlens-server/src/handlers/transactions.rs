//! Transaction listing and bulk edit handlers
//!
//! Items carry `idx`, their position in `transactions_categorized.json`,
//! which is what bulk actions address.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use spendlens_core::pipeline::regenerate_summary;
use spendlens_core::summary::month_key;
use spendlens_core::Transaction;

use super::summary::{parse_month, parse_year};
use crate::{AppError, AppState};

/// Transactions per page
pub const PAGE_SIZE: usize = 50;

#[derive(Debug, Serialize)]
pub struct IndexedTransaction {
    pub idx: usize,
    #[serde(flatten)]
    pub transaction: Transaction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub transactions: Vec<IndexedTransaction>,
    pub page: usize,
    pub total_pages: usize,
    pub total: usize,
}

fn load_categorized(state: &AppState) -> Result<Vec<Transaction>, AppError> {
    state
        .store
        .load_categorized()?
        .ok_or_else(|| AppError::not_found("Transaction data not found"))
}

/// Lenient page number: anything unparsable or below 1 is page 1
fn page_number(raw: Option<&str>) -> usize {
    raw.and_then(|p| p.trim().parse::<i64>().ok())
        .map_or(1, |p| p.max(1) as usize)
}

fn paginate(items: Vec<IndexedTransaction>, page: usize) -> TransactionPage {
    let total = items.len();
    let total_pages = total.div_ceil(PAGE_SIZE).max(1);
    let page = page.clamp(1, total_pages);
    let transactions = items
        .into_iter()
        .skip((page - 1) * PAGE_SIZE)
        .take(PAGE_SIZE)
        .collect();
    TransactionPage {
        transactions,
        page,
        total_pages,
        total,
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Query parameters for the global transaction list
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    pub year: Option<String>,
    pub category: Option<String>,
    /// Inclusive, `YYYY-MM-DD`
    pub date_from: Option<String>,
    /// Inclusive, `YYYY-MM-DD`
    pub date_to: Option<String>,
    /// Inclusive, signed amount
    pub amount_min: Option<String>,
    pub amount_max: Option<String>,
    pub page: Option<String>,
}

struct Criteria<'a> {
    year: Option<&'a str>,
    category: Option<&'a str>,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    amount_min: Option<f64>,
    amount_max: Option<f64>,
}

impl TransactionQuery {
    fn criteria(&self) -> Result<Criteria<'_>, AppError> {
        let date = |name: &str, value: &Option<String>| {
            non_empty(value)
                .map(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d"))
                .transpose()
                .map_err(|_| AppError::bad_request(&format!("{} must be YYYY-MM-DD", name)))
        };
        let amount = |name: &str, value: &Option<String>| {
            non_empty(value)
                .map(str::parse::<f64>)
                .transpose()
                .map_err(|_| AppError::bad_request(&format!("{} must be a number", name)))
        };

        Ok(Criteria {
            year: non_empty(&self.year),
            category: non_empty(&self.category),
            date_from: date("dateFrom", &self.date_from)?,
            date_to: date("dateTo", &self.date_to)?,
            amount_min: amount("amountMin", &self.amount_min)?,
            amount_max: amount("amountMax", &self.amount_max)?,
        })
    }
}

impl Criteria<'_> {
    fn matches(&self, tx: &Transaction) -> bool {
        self.year.map_or(true, |y| tx.year_key() == y)
            && self.category.map_or(true, |c| tx.category.as_deref() == Some(c))
            && self.date_from.map_or(true, |d| tx.date >= d)
            && self.date_to.map_or(true, |d| tx.date <= d)
            && self.amount_min.map_or(true, |a| tx.amount >= a)
            && self.amount_max.map_or(true, |a| tx.amount <= a)
    }
}

/// GET /api/transactions - Filtered list, most recent first
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TransactionQuery>,
) -> Result<Json<TransactionPage>, AppError> {
    let criteria = params.criteria()?;
    let all = load_categorized(&state)?;

    let mut items: Vec<IndexedTransaction> = all
        .into_iter()
        .enumerate()
        .filter(|(_, tx)| criteria.matches(tx))
        .map(|(idx, transaction)| IndexedTransaction { idx, transaction })
        .collect();
    // Stable sort keeps file order within a day
    items.sort_by(|a, b| b.transaction.date.cmp(&a.transaction.date));

    Ok(Json(paginate(items, page_number(params.page.as_deref()))))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthTransactions {
    pub year: String,
    pub month: String,
    #[serde(flatten)]
    pub page: TransactionPage,
    /// Category names for the edit dropdown
    pub all_categories: Vec<String>,
}

/// Transactions of `YYYY-MM`, in file order
fn month_items(all: Vec<Transaction>, prefix: &str) -> Vec<IndexedTransaction> {
    all.into_iter()
        .enumerate()
        .filter(|(_, tx)| tx.month_key() == prefix)
        .map(|(idx, transaction)| IndexedTransaction { idx, transaction })
        .collect()
}

/// GET /api/years/:year/:month/transactions - One month, paginated
pub async fn list_month_transactions(
    State(state): State<Arc<AppState>>,
    Path((year, month)): Path<(String, String)>,
    Query(params): Query<PageQuery>,
) -> Result<Json<MonthTransactions>, AppError> {
    let year = parse_year(&year)?.to_string();
    let month = parse_month(&month)?;
    let all = load_categorized(&state)?;

    let items = month_items(all, &month_key(&year, &month));
    let page = paginate(items, page_number(params.page.as_deref()));

    Ok(Json(MonthTransactions {
        year,
        month,
        page,
        all_categories: state.store.load_summary().categories_list,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTransactions {
    pub year: String,
    pub month: String,
    pub category: String,
    pub transactions: Vec<IndexedTransaction>,
}

/// GET /api/years/:year/:month/category/:category - One category in one month
pub async fn list_category_transactions(
    State(state): State<Arc<AppState>>,
    Path((year, month, category)): Path<(String, String, String)>,
) -> Result<Json<CategoryTransactions>, AppError> {
    let year = parse_year(&year)?.to_string();
    let month = parse_month(&month)?;
    let all = load_categorized(&state)?;

    let transactions = month_items(all, &month_key(&year, &month))
        .into_iter()
        .filter(|item| item.transaction.category.as_deref() == Some(category.as_str()))
        .collect();

    Ok(Json(CategoryTransactions {
        year,
        month,
        category,
        transactions,
    }))
}

/// Bulk action request body
#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    #[serde(default)]
    pub selected: Vec<usize>,
    pub action: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum BulkAction {
    Delete,
    SetCategory(String),
}

impl BulkRequest {
    fn action(&self) -> Result<BulkAction, AppError> {
        match self.action.as_str() {
            "delete" => Ok(BulkAction::Delete),
            "setCategory" => match non_empty(&self.category) {
                Some(category) => Ok(BulkAction::SetCategory(category.to_string())),
                None => Err(AppError::bad_request("setCategory requires a category")),
            },
            _ => Err(AppError::bad_request("Unknown action")),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub success: bool,
    /// Transactions deleted or recategorized
    pub affected: usize,
}

/// Apply `action` to the selected indexes; out-of-range indexes are ignored
fn apply_bulk(txs: &mut Vec<Transaction>, selected: &BTreeSet<usize>, action: &BulkAction) -> usize {
    match action {
        BulkAction::Delete => {
            let before = txs.len();
            let mut idx = 0;
            txs.retain(|_| {
                let keep = !selected.contains(&idx);
                idx += 1;
                keep
            });
            before - txs.len()
        }
        BulkAction::SetCategory(category) => {
            let mut affected = 0;
            for &i in selected {
                if let Some(tx) = txs.get_mut(i) {
                    tx.category = Some(category.clone());
                    affected += 1;
                }
            }
            affected
        }
    }
}

async fn run_bulk(state: &AppState, request: BulkRequest) -> Result<BulkResponse, AppError> {
    let action = request.action()?;
    let selected: BTreeSet<usize> = request.selected.into_iter().collect();
    if selected.is_empty() {
        return Ok(BulkResponse {
            success: true,
            affected: 0,
        });
    }

    let _guard = state.write_lock.lock().await;
    let mut txs = load_categorized(state)?;
    let affected = apply_bulk(&mut txs, &selected, &action);
    if affected > 0 {
        state.store.save_categorized(&txs)?;
        regenerate_summary(&state.store, &state.settings)?;
    }
    info!(action = ?action, affected, "Bulk update applied");

    Ok(BulkResponse {
        success: true,
        affected,
    })
}

/// POST /api/transactions/bulk - Delete or recategorize selected transactions
pub async fn bulk_update(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BulkRequest>,
) -> Result<Json<BulkResponse>, AppError> {
    Ok(Json(run_bulk(&state, request).await?))
}

/// POST /api/years/:year/:month/transactions/bulk - Same as the global bulk
/// action, issued from a month page
pub async fn bulk_update_month(
    State(state): State<Arc<AppState>>,
    Path((year, month)): Path<(String, String)>,
    Json(request): Json<BulkRequest>,
) -> Result<Json<BulkResponse>, AppError> {
    parse_year(&year)?;
    parse_month(&month)?;
    Ok(Json(run_bulk(&state, request).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(day: u32) -> Transaction {
        let date = NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        let mut t = Transaction::from_raw(Default::default(), date);
        t.description = format!("tx {}", day);
        t
    }

    #[test]
    fn test_paginate_clamps_page() {
        let items: Vec<IndexedTransaction> = (0..60)
            .map(|idx| IndexedTransaction {
                idx,
                transaction: tx(1),
            })
            .collect();

        let page = paginate(items, 9);
        assert_eq!(page.page, 2);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.transactions.len(), 10);
        assert_eq!(page.transactions[0].idx, 50);

        let empty = paginate(Vec::new(), 3);
        assert_eq!(empty.page, 1);
        assert_eq!(empty.total_pages, 1);
    }

    #[test]
    fn test_page_number() {
        assert_eq!(page_number(None), 1);
        assert_eq!(page_number(Some("abc")), 1);
        assert_eq!(page_number(Some("-4")), 1);
        assert_eq!(page_number(Some("3")), 3);
    }

    #[test]
    fn test_apply_bulk_ignores_out_of_range() {
        let mut txs = vec![tx(1), tx(2), tx(3)];
        let selected: BTreeSet<usize> = [0, 2, 7].into_iter().collect();

        let affected = apply_bulk(&mut txs, &selected, &BulkAction::SetCategory("Food".into()));
        assert_eq!(affected, 2);
        assert_eq!(txs[0].category.as_deref(), Some("Food"));
        assert_eq!(txs[1].category, None);

        let affected = apply_bulk(&mut txs, &selected, &BulkAction::Delete);
        assert_eq!(affected, 2);
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].description, "tx 2");
    }

    #[test]
    fn test_bulk_action_validation() {
        let request = |action: &str, category: Option<&str>| BulkRequest {
            selected: vec![0],
            action: action.to_string(),
            category: category.map(String::from),
        };
        assert_eq!(request("delete", None).action().ok(), Some(BulkAction::Delete));
        assert!(request("setCategory", None).action().is_err());
        assert!(request("setCategory", Some("  ")).action().is_err());
        assert!(request("archive", None).action().is_err());
    }
}
