//! Ingest bank exports from the import directory into `transactions.json`
//!
//! Each run merges new files with the existing data, drops rows with
//! unreadable dates, deduplicates, and removes months that are too sparsely
//! covered to give meaningful totals.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::ClassifierKind;
use crate::config::Settings;
use crate::error::Result;
use crate::import::{self, ImportFormat};
use crate::models::{RawTransaction, Transaction};
use crate::store::DataStore;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Use this importer for every file instead of detecting
    pub format: Option<ImportFormat>,
    /// Minimum fraction of days present for a month to be kept
    pub coverage_threshold: f64,
    /// Leave parsed files in the import dir
    pub keep_files: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            format: None,
            coverage_threshold: 0.8,
            keep_files: false,
        }
    }
}

impl IngestOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let format = settings
            .ingest
            .format
            .as_deref()
            .map(str::parse)
            .transpose()?;
        Ok(Self {
            format,
            coverage_threshold: settings.ingest.coverage_threshold,
            keep_files: settings.ingest.keep_files,
        })
    }
}

/// One parsed import file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub name: String,
    pub format: ImportFormat,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub files: Vec<FileReport>,
    pub skipped_files: Vec<String>,
    pub new_rows: usize,
    pub existing_rows: usize,
    pub invalid_dates: usize,
    pub duplicates: usize,
    pub excluded_months: Vec<String>,
    pub total: usize,
}

impl IngestReport {
    /// Classifier the importers agree on, if they all agree
    pub fn default_classifier(&self) -> Option<ClassifierKind> {
        let kinds: BTreeSet<_> = self
            .files
            .iter()
            .map(|f| f.format.default_classifier().as_str())
            .collect();
        if kinds.len() == 1 {
            self.files.first().map(|f| f.format.default_classifier())
        } else {
            None
        }
    }
}

/// Run one ingest over `import_dir`
pub fn ingest(store: &DataStore, import_dir: &Path, options: &IngestOptions) -> Result<IngestReport> {
    let existing = store.load_transactions()?;
    let mut report = IngestReport {
        existing_rows: existing.len(),
        ..Default::default()
    };

    let mut raw_rows: Vec<RawTransaction> = Vec::new();
    for path in list_import_files(import_dir)? {
        let name = file_name(&path);

        let format = match options.format {
            Some(f) => Some(f),
            None => import::detect_file(&path).unwrap_or_else(|e| {
                warn!("Could not read {}: {}", name, e);
                None
            }),
        };
        let Some(format) = format else {
            warn!("No importer recognises {}, skipping", name);
            report.skipped_files.push(name);
            continue;
        };

        match import::parse_file(&path, format) {
            Ok(rows) => {
                info!(file = %name, format = %format, rows = rows.len(), "Imported file");
                report.files.push(FileReport {
                    name: name.clone(),
                    format,
                    rows: rows.len(),
                });
                raw_rows.extend(rows);

                if !options.keep_files {
                    if let Err(e) = fs::remove_file(&path) {
                        warn!("Failed to remove {}: {}", name, e);
                    }
                }
            }
            Err(e) => {
                warn!("Failed to parse {} as {}: {}", name, format, e);
                report.skipped_files.push(name);
            }
        }
    }
    report.new_rows = raw_rows.len();

    let mut combined = existing;
    for raw in raw_rows {
        match import::parse_date(&raw.date) {
            Some(date) => combined.push(Transaction::from_raw(raw, date)),
            None => {
                debug!("Dropping row with invalid date {:?}", raw.date);
                report.invalid_dates += 1;
            }
        }
    }

    let (unique, duplicates) = dedupe(combined);
    report.duplicates = duplicates;

    let (kept, excluded) = drop_low_coverage(unique, options.coverage_threshold);
    report.excluded_months = excluded;
    report.total = kept.len();

    store.save_transactions(&kept)?;
    info!(
        total = report.total,
        new = report.new_rows,
        invalid_dates = report.invalid_dates,
        duplicates = report.duplicates,
        excluded_months = report.excluded_months.len(),
        "Ingest complete"
    );
    Ok(report)
}

/// Regular, non-hidden files sorted by name; a missing dir is empty
fn list_import_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        warn!("Import directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && !file_name(&path).starts_with('.') {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Keep the first occurrence of each dedupe key
pub fn dedupe(txs: Vec<Transaction>) -> (Vec<Transaction>, usize) {
    let mut seen = HashSet::new();
    let before = txs.len();
    let unique: Vec<Transaction> = txs
        .into_iter()
        .filter(|tx| seen.insert(tx.dedupe_key()))
        .collect();
    let removed = before - unique.len();
    (unique, removed)
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(31)
}

/// Fraction of days in each `YYYY-MM` that have at least one transaction
pub fn month_coverage(txs: &[Transaction]) -> BTreeMap<String, f64> {
    let mut days: BTreeMap<String, (i32, u32, BTreeSet<u32>)> = BTreeMap::new();
    for tx in txs {
        days.entry(tx.month_key())
            .or_insert_with(|| (tx.date.year(), tx.date.month(), BTreeSet::new()))
            .2
            .insert(tx.date.day());
    }

    days.into_iter()
        .map(|(month, (y, m, present))| {
            (month, present.len() as f64 / days_in_month(y, m) as f64)
        })
        .collect()
}

/// Remove months below the coverage threshold, returning them sorted
pub fn drop_low_coverage(txs: Vec<Transaction>, threshold: f64) -> (Vec<Transaction>, Vec<String>) {
    let excluded: BTreeSet<String> = month_coverage(&txs)
        .into_iter()
        .filter(|(_, coverage)| *coverage < threshold)
        .map(|(month, _)| month)
        .collect();

    if !excluded.is_empty() {
        info!("Excluding months with low coverage: {:?}", excluded);
    }

    let kept = txs
        .into_iter()
        .filter(|tx| !excluded.contains(&tx.month_key()))
        .collect();
    (kept, excluded.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tx(date: &str, amount: f64, description: &str) -> Transaction {
        Transaction {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            amount,
            description: description.to_string(),
            notes: String::new(),
            original_category: String::new(),
            original_category_group: String::new(),
            category: None,
            orig_id: None,
        }
    }

    /// One Moneyhub row per day of the month
    fn full_month_csv(year: i32, month: u32) -> String {
        let mut csv = String::from("DATE,DESCRIPTION,AMOUNT,CATEGORY\n");
        for day in 1..=days_in_month(year, month) {
            csv.push_str(&format!(
                "{:04}-{:02}-{:02},SHOP {},-{}.00,Groceries\n",
                year, month, day, day, day
            ));
        }
        csv
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2024, 12), 31);
        assert_eq!(days_in_month(2024, 4), 30);
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let mut a = tx("2024-01-01", -1.0, "A");
        a.notes = "first".into();
        let mut b = tx("2024-01-01", -1.0, "A");
        b.notes = "second".into();
        let c = tx("2024-01-02", -1.0, "A");

        let (unique, removed) = dedupe(vec![a, b, c]);
        assert_eq!(removed, 1);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].notes, "first");
    }

    #[test]
    fn test_dedupe_orig_id_distinguishes_identical_rows() {
        let mut a = tx("2024-01-01", -1.0, "A");
        a.orig_id = Some("1".into());
        let mut b = tx("2024-01-01", -1.0, "A");
        b.orig_id = Some("2".into());
        let (unique, removed) = dedupe(vec![a, b]);
        assert_eq!(removed, 0);
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn test_month_coverage() {
        let txs = vec![
            tx("2024-02-01", -1.0, "a"),
            tx("2024-02-01", -2.0, "b"),
            tx("2024-02-02", -1.0, "c"),
        ];
        let cov = month_coverage(&txs);
        assert!((cov["2024-02"] - 2.0 / 29.0).abs() < 1e-9);

        let (kept, excluded) = drop_low_coverage(txs, 0.8);
        assert!(kept.is_empty());
        assert_eq!(excluded, vec!["2024-02"]);
    }

    #[test]
    fn test_ingest_end_to_end() {
        let dir = TempDir::new().unwrap();
        let import_dir = dir.path().join("import");
        fs::create_dir_all(&import_dir).unwrap();
        let store = DataStore::new(dir.path().join("data"));

        let mut csv = full_month_csv(2024, 1);
        // Duplicate of the first row, a bad date and a sparse month
        csv.push_str("2024-01-01,SHOP 1,-1.00,Groceries\n");
        csv.push_str("not a date,BROKEN,-1.00,Groceries\n");
        csv.push_str("2024-02-10,LONELY,-1.00,Groceries\n");
        fs::write(import_dir.join("a.csv"), csv).unwrap();
        fs::write(import_dir.join("notes.txt"), "hello\n").unwrap();
        fs::write(import_dir.join(".hidden"), "DATE,DESCRIPTION,AMOUNT\n").unwrap();

        let report = ingest(&store, &import_dir, &IngestOptions::default()).unwrap();
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].format, ImportFormat::Moneyhub);
        assert_eq!(report.skipped_files, vec!["notes.txt"]);
        assert_eq!(report.new_rows, 34);
        assert_eq!(report.invalid_dates, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.excluded_months, vec!["2024-02"]);
        assert_eq!(report.total, 31);
        assert_eq!(report.default_classifier(), Some(ClassifierKind::Pass));

        // Parsed file removed, unknown and hidden files left alone
        assert!(!import_dir.join("a.csv").exists());
        assert!(import_dir.join("notes.txt").exists());
        assert!(import_dir.join(".hidden").exists());
        assert_eq!(store.load_transactions().unwrap().len(), 31);

        // Re-ingesting the same data only produces duplicates
        fs::write(import_dir.join("b.csv"), full_month_csv(2024, 1)).unwrap();
        let again = ingest(&store, &import_dir, &IngestOptions::default()).unwrap();
        assert_eq!(again.existing_rows, 31);
        assert_eq!(again.duplicates, 31);
        assert_eq!(again.total, 31);
    }

    #[test]
    fn test_ingest_keep_files_and_format_override() {
        let dir = TempDir::new().unwrap();
        let import_dir = dir.path().join("import");
        fs::create_dir_all(&import_dir).unwrap();
        let store = DataStore::new(dir.path().join("data"));

        fs::write(import_dir.join("m.csv"), full_month_csv(2023, 6)).unwrap();
        let options = IngestOptions {
            format: Some(ImportFormat::Moneyhub),
            keep_files: true,
            ..Default::default()
        };
        let report = ingest(&store, &import_dir, &options).unwrap();
        assert_eq!(report.total, 30);
        assert!(import_dir.join("m.csv").exists());
    }

    #[test]
    fn test_missing_import_dir_is_empty_run() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::new(dir.path().join("data"));
        let report = ingest(&store, &dir.path().join("nope"), &IngestOptions::default()).unwrap();
        assert_eq!(report.total, 0);
        assert!(report.default_classifier().is_none());
    }
}
