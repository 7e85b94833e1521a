//! Export of categorized transactions
//!
//! Supports:
//! - QIF (`!Type:Bank`) for import into desktop finance tools
//! - CSV with the stored field names as headers

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::Transaction;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Qif,
    Csv,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qif => "qif",
            Self::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Qif => "application/qif",
            Self::Csv => "text/csv",
        }
    }

    /// Download name, e.g. `transactions.qif`
    pub fn file_name(&self) -> String {
        format!("transactions.{}", self.as_str())
    }

    pub fn render(&self, txs: &[Transaction]) -> Result<String> {
        match self {
            Self::Qif => Ok(export_qif(txs)),
            Self::Csv => export_csv(txs),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "qif" => Ok(Self::Qif),
            "csv" => Ok(Self::Csv),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Render transactions as a QIF bank register, oldest first
pub fn export_qif(txs: &[Transaction]) -> String {
    let mut sorted: Vec<&Transaction> = txs.iter().collect();
    sorted.sort_by_key(|t| t.date);

    let mut lines = vec!["!Type:Bank".to_string()];
    for tx in sorted {
        lines.push(format!("D{}", tx.date.format("%m/%d/%Y")));
        lines.push(format!("T{:.2}", tx.amount));
        lines.push(format!("P{}", tx.description));
        if !tx.notes.is_empty() {
            lines.push(format!("M{}", tx.notes));
        }
        lines.push(format!("L{}", tx.category.as_deref().unwrap_or("")));
        lines.push("^".to_string());
    }
    lines.join("\n")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CsvRow<'a> {
    date: String,
    amount: f64,
    description: &'a str,
    notes: &'a str,
    original_category: &'a str,
    category: &'a str,
}

/// Render transactions as CSV in stored order
pub fn export_csv(txs: &[Transaction]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if txs.is_empty() {
        writer.write_record([
            "date",
            "amount",
            "description",
            "notes",
            "originalCategory",
            "category",
        ])?;
    }
    for tx in txs {
        writer.serialize(CsvRow {
            date: tx.date_key(),
            amount: tx.amount,
            description: &tx.description,
            notes: &tx.notes,
            original_category: &tx.original_category,
            category: tx.category.as_deref().unwrap_or(""),
        })?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::InvalidData(format!("CSV export failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::InvalidData(format!("CSV export failed: {}", e)))
}
