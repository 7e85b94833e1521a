//! Moneyhub and Monzo CSV exports

use std::collections::HashMap;
use std::io::Read;

use csv::{ReaderBuilder, StringRecord};
use tracing::debug;

use super::{normalize_date, parse_amount};
use crate::error::Result;
use crate::models::RawTransaction;

/// Day-first forms seen in UK exports, tried after ISO
const MONEYHUB_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d/%m/%y"];
const MONZO_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d/%m/%y"];

/// Normalize a header cell: strip BOM, lowercase, spaces to underscores
fn normalize_header(h: &str) -> String {
    h.trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase()
        .replace(' ', "_")
}

/// Normalized header names of a single CSV line
pub(super) fn header_names(line: &str) -> Vec<String> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());

    match rdr.records().next() {
        Some(Ok(record)) => record.iter().map(normalize_header).collect(),
        _ => Vec::new(),
    }
}

/// Case-insensitive column lookup by header name
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (normalize_header(h), i))
            .collect();
        Self { index }
    }

    /// Value of the first listed column present in the header
    fn get<'r>(&self, record: &'r StringRecord, names: &[&str]) -> &'r str {
        names
            .iter()
            .find_map(|name| self.index.get(*name))
            .and_then(|&i| record.get(i))
            .map(str::trim)
            .unwrap_or("")
    }

    /// First non-empty value among the listed columns
    fn first_non_empty<'r>(&self, record: &'r StringRecord, names: &[&str]) -> &'r str {
        names
            .iter()
            .filter_map(|name| self.index.get(*name))
            .filter_map(|&i| record.get(i))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .unwrap_or("")
    }
}

fn reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader)
}

/// Parse a Moneyhub export
///
/// Columns: DATE, DESCRIPTION, AMOUNT, NOTES, CATEGORY, CATEGORY GROUP (any
/// order, any case). An unreadable amount becomes 0.
pub fn parse_moneyhub<R: Read>(input: R) -> Result<Vec<RawTransaction>> {
    let mut rdr = reader(input);
    let cols = Columns::new(rdr.headers()?);
    let mut transactions = Vec::new();

    for result in rdr.records() {
        let record = result?;

        let amount_str = cols.get(&record, &["amount"]);
        transactions.push(RawTransaction {
            date: normalize_date(cols.get(&record, &["date"]), MONEYHUB_DATE_FORMATS),
            amount: parse_amount(amount_str).unwrap_or(0.0),
            description: cols.get(&record, &["description"]).to_string(),
            notes: cols.get(&record, &["notes"]).to_string(),
            original_category: cols.get(&record, &["category"]).to_string(),
            original_category_group: cols.get(&record, &["category_group"]).to_string(),
            orig_id: None,
        });
    }

    debug!("Parsed {} Moneyhub transactions", transactions.len());
    Ok(transactions)
}

/// Parse a Monzo export
///
/// Accepts both the snake_case API export and the app's "Transaction ID,
/// Date, Time, ..." layout. The time column is dropped.
pub fn parse_monzo<R: Read>(input: R) -> Result<Vec<RawTransaction>> {
    let mut rdr = reader(input);
    let cols = Columns::new(rdr.headers()?);
    let mut transactions = Vec::new();

    for result in rdr.records() {
        let record = result?;

        let id = cols.get(&record, &["transaction_id", "id"]);
        let amount_str = cols.get(&record, &["amount", "local_amount"]);
        transactions.push(RawTransaction {
            date: normalize_date(cols.get(&record, &["date", "created"]), MONZO_DATE_FORMATS),
            amount: parse_amount(amount_str).unwrap_or(0.0),
            description: cols
                .first_non_empty(&record, &["description", "merchant", "name"])
                .to_string(),
            notes: cols
                .get(&record, &["notes", "notes_and_#tags"])
                .to_string(),
            original_category: cols.get(&record, &["category"]).to_string(),
            original_category_group: String::new(),
            orig_id: (!id.is_empty()).then(|| id.to_string()),
        });
    }

    debug!("Parsed {} Monzo transactions", transactions.len());
    Ok(transactions)
}
