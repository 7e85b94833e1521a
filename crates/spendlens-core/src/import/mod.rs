//! Bank export importers
//!
//! Each importer turns one export format into [`RawTransaction`] rows with
//! dates normalized to `YYYY-MM-DD` where the importer can read them. Rows
//! whose date could not be read keep the original text and are dropped by
//! ingest.
//!
//! Supported formats:
//! - Moneyhub CSV (`DATE,DESCRIPTION,AMOUNT,...`)
//! - Monzo CSV (`transaction_id,...,local_amount,...`)
//! - QFX / OFX (SGML or XML)
//! - QIF (`!Type:Bank`)

mod bank_csv;
mod qfx;
mod qif;

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::ClassifierKind;
use crate::error::{Error, Result};
use crate::models::RawTransaction;

pub use self::bank_csv::{parse_moneyhub, parse_monzo};
pub use self::qfx::parse_qfx;
pub use self::qif::parse_qif;

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    Moneyhub,
    Monzo,
    Qfx,
    Qif,
}

impl ImportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Moneyhub => "moneyhub",
            Self::Monzo => "monzo",
            Self::Qfx => "qfx",
            Self::Qif => "qif",
        }
    }

    pub fn all() -> &'static [ImportFormat] {
        &[Self::Moneyhub, Self::Monzo, Self::Qfx, Self::Qif]
    }

    /// Classifier used when a run is not told which one to use
    ///
    /// The CSV exports carry the bank's own category, so pass-through is a
    /// sensible default. QFX and QIF rarely do.
    pub fn default_classifier(&self) -> ClassifierKind {
        match self {
            Self::Moneyhub | Self::Monzo => ClassifierKind::Pass,
            Self::Qfx | Self::Qif => ClassifierKind::Rules,
        }
    }
}

impl fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "moneyhub" => Ok(Self::Moneyhub),
            "monzo" => Ok(Self::Monzo),
            "qfx" | "ofx" => Ok(Self::Qfx),
            "qif" => Ok(Self::Qif),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Detect the export format from the first line of a file
///
/// Monzo is tested before Moneyhub: a Monzo header also has date,
/// description and amount columns.
pub fn detect_format(first_line: &str) -> Option<ImportFormat> {
    let line = first_line.trim_start_matches('\u{feff}').trim();

    if line.starts_with("!Type:") {
        return Some(ImportFormat::Qif);
    }

    let upper = line.to_uppercase();
    if upper.starts_with("<?XML") || upper.starts_with("<OFX") || upper.starts_with("OFXHEADER:") {
        return Some(ImportFormat::Qfx);
    }

    let headers = bank_csv::header_names(line);
    let has = |name: &str| headers.iter().any(|h| h == name);

    if has("local_amount") && (has("account_id") || has("transaction_id")) {
        return Some(ImportFormat::Monzo);
    }
    if has("date") && has("description") && has("amount") {
        return Some(ImportFormat::Moneyhub);
    }

    None
}

/// Detect the format of a file by reading its first non-empty line
pub fn detect_file(path: &Path) -> Result<Option<ImportFormat>> {
    let reader = BufReader::new(File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            return Ok(detect_format(&line));
        }
    }
    Ok(None)
}

/// Parse a file with a known format
pub fn parse_file(path: &Path, format: ImportFormat) -> Result<Vec<RawTransaction>> {
    let file = File::open(path)?;
    let rows = parse_reader(BufReader::new(file), format)?;
    debug!(
        "Parsed {} {} rows from {}",
        rows.len(),
        format,
        path.display()
    );
    Ok(rows)
}

/// Parse export data from any reader
pub fn parse_reader<R: Read>(mut reader: R, format: ImportFormat) -> Result<Vec<RawTransaction>> {
    match format {
        ImportFormat::Moneyhub => parse_moneyhub(reader),
        ImportFormat::Monzo => parse_monzo(reader),
        ImportFormat::Qfx | ImportFormat::Qif => {
            let mut text = String::new();
            reader.read_to_string(&mut text)?;
            if format == ImportFormat::Qfx {
                parse_qfx(&text)
            } else {
                Ok(parse_qif(&text))
            }
        }
    }
}

/// Parse an amount string, handling currency symbols, separators and
/// accounting-style parentheses
pub fn parse_amount(s: &str) -> Result<f64> {
    let cleaned: String = s
        .trim()
        .replace(['$', '£', '€', '¥', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    cleaned
        .parse::<f64>()
        .map_err(|_| Error::Import(format!("Unable to parse amount: {}", s)))
}

/// Parse a stored or imported date: ISO, ISO datetime prefix or `YYYY/MM/DD`
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Some(prefix) = s.get(..10) {
        if s[10..].starts_with(['T', ' ']) {
            if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
                return Some(date);
            }
        }
    }
    NaiveDate::parse_from_str(s, "%Y/%m/%d").ok()
}

/// Render a date in the first matching format as `YYYY-MM-DD`, or keep the
/// trimmed original when nothing matches
pub(crate) fn normalize_date(s: &str, formats: &[&str]) -> String {
    let s = s.trim();
    if let Some(date) = parse_date(s) {
        return date.format("%Y-%m-%d").to_string();
    }
    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    s.to_string()
}
