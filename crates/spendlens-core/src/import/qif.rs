//! Quicken Interchange Format
//!
//! Line-oriented: the first character is the field code, `^` ends a record.

use chrono::NaiveDate;
use tracing::debug;

use super::{normalize_date, parse_amount};
use crate::models::RawTransaction;

/// Formats tried after ISO for four-digit years. Month-first comes first,
/// matching Quicken's US default.
const QIF_DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%d/%m/%Y", "%m-%d-%Y"];

pub fn parse_qif(text: &str) -> Vec<RawTransaction> {
    let mut transactions = Vec::new();
    let mut current = RawTransaction::default();
    let mut has_amount_t = false;
    let mut dirty = false;

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        let line = line.trim_start_matches('\u{feff}');
        if line.starts_with('!') || line.trim().is_empty() {
            continue;
        }

        let (code, value) = line.split_at(line.chars().next().map_or(0, char::len_utf8));
        let value = value.trim();

        match code {
            "^" => {
                if dirty {
                    transactions.push(std::mem::take(&mut current));
                }
                has_amount_t = false;
                dirty = false;
                continue;
            }
            "D" => current.date = qif_date(value),
            "T" => {
                current.amount = parse_amount(value).unwrap_or(0.0);
                has_amount_t = true;
            }
            "U" if !has_amount_t => current.amount = parse_amount(value).unwrap_or(0.0),
            "P" => current.description = value.to_string(),
            "M" => current.notes = value.to_string(),
            "L" => current.original_category = value.to_string(),
            _ => continue,
        }
        dirty = true;
    }

    // Final record without a trailing ^
    if dirty {
        transactions.push(current);
    }

    debug!("Parsed {} QIF transactions", transactions.len());
    transactions
}

/// Read the QIF date forms into `YYYY-MM-DD`
///
/// Handles `MM/DD/YYYY`, `MM/DD/YY`, Quicken's `M/D'YY`, ISO and
/// `DD/MM/YYYY`. Unreadable dates are returned unchanged.
fn qif_date(value: &str) -> String {
    let value = value.trim();
    let unified = value.replace('\'', "/");

    // Two-digit year: %Y would read "24" as the year 24
    if let Some(year) = unified.rsplit('/').next() {
        if year.len() == 2 && unified.matches('/').count() == 2 {
            if let Ok(date) = NaiveDate::parse_from_str(&unified, "%m/%d/%y") {
                return date.format("%Y-%m-%d").to_string();
            }
            return value.to_string();
        }
    }

    let normalized = normalize_date(&unified, QIF_DATE_FORMATS);
    if normalized == unified {
        value.to_string()
    } else {
        normalized
    }
}
