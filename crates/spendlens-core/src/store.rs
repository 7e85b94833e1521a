//! Flat-file data directory
//!
//! Everything lives as pretty-printed JSON under one directory, plus the
//! two model directories. Writes go through a temp file in the same
//! directory and a rename, so readers never see a half-written file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{
    Budgets, CategoryGroups, CategoryKeywords, DeductibleCategories, Goals, Transaction,
};
use crate::summary::Summary;

pub const TRANSACTIONS_FILE: &str = "transactions.json";
pub const CATEGORIZED_FILE: &str = "transactions_categorized.json";
pub const SUMMARY_FILE: &str = "summary.json";
pub const CATEGORIES_FILE: &str = "categories.json";
pub const BUDGETS_FILE: &str = "budgets.json";
pub const GOALS_FILE: &str = "goals.json";
pub const CATEGORY_GROUPS_FILE: &str = "category-groups.json";
pub const DEDUCTIBLE_FILE: &str = "deductible-categories.json";
pub const KNN_MODEL_DIR: &str = "tx-classifier-knn";
pub const NEURAL_MODEL_DIR: &str = "tx-classifier";

/// Embedded defaults (compiled into binary)
const DEFAULT_CATEGORIES: &str = include_str!("../defaults/categories.json");
const DEFAULT_CATEGORY_GROUPS: &str = include_str!("../defaults/category-groups.json");

/// Handle on a data directory
#[derive(Debug, Clone)]
pub struct DataStore {
    root: PathBuf,
}

impl DataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn knn_dir(&self) -> PathBuf {
        self.path(KNN_MODEL_DIR)
    }

    pub fn neural_dir(&self) -> PathBuf {
        self.path(NEURAL_MODEL_DIR)
    }

    /// Create the data directory if needed
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    // ----- transactions -----

    /// Ingested transactions; a missing file is empty, a corrupt one is an error
    pub fn load_transactions(&self) -> Result<Vec<Transaction>> {
        Ok(self.read_json(TRANSACTIONS_FILE)?.unwrap_or_default())
    }

    pub fn save_transactions(&self, txs: &[Transaction]) -> Result<()> {
        self.write_json(TRANSACTIONS_FILE, &txs)
    }

    /// Categorized transactions, `None` when categorize has not run yet
    pub fn load_categorized(&self) -> Result<Option<Vec<Transaction>>> {
        self.read_json(CATEGORIZED_FILE)
    }

    pub fn save_categorized(&self, txs: &[Transaction]) -> Result<()> {
        self.write_json(CATEGORIZED_FILE, &txs)
    }

    // ----- summary -----

    /// Stored summary; missing or corrupt files give an empty summary
    pub fn load_summary(&self) -> Summary {
        self.read_optional(SUMMARY_FILE)
    }

    pub fn save_summary(&self, summary: &Summary) -> Result<()> {
        self.write_json(SUMMARY_FILE, summary)
    }

    // ----- settings-like data files -----

    pub fn load_categories(&self) -> CategoryKeywords {
        self.read_optional(CATEGORIES_FILE)
    }

    pub fn save_categories(&self, categories: &CategoryKeywords) -> Result<()> {
        self.write_json(CATEGORIES_FILE, categories)
    }

    pub fn load_budgets(&self) -> Budgets {
        self.read_optional(BUDGETS_FILE)
    }

    pub fn load_goals(&self) -> Goals {
        self.read_optional(GOALS_FILE)
    }

    /// Stored groups, falling back to the embedded defaults
    pub fn load_category_groups(&self) -> CategoryGroups {
        match self.read_json(CATEGORY_GROUPS_FILE) {
            Ok(Some(groups)) => groups,
            Ok(None) => default_category_groups(),
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", CATEGORY_GROUPS_FILE, e);
                default_category_groups()
            }
        }
    }

    pub fn load_deductible(&self) -> DeductibleCategories {
        self.read_optional(DEDUCTIBLE_FILE)
    }

    // ----- maintenance -----

    /// Copy the embedded defaults into the data dir where missing
    pub fn seed_defaults(&self) -> Result<()> {
        self.ensure_dir()?;
        for (name, content) in [
            (CATEGORIES_FILE, DEFAULT_CATEGORIES),
            (CATEGORY_GROUPS_FILE, DEFAULT_CATEGORY_GROUPS),
        ] {
            let path = self.path(name);
            if !path.exists() {
                write_atomic(&path, content.as_bytes())?;
                info!("Seeded {}", path.display());
            }
        }
        Ok(())
    }

    /// Remove everything in the data dir and recreate it empty
    pub fn reset(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.root)?;
        info!("Reset data directory {}", self.root.display());
        Ok(())
    }

    /// Overwrite `categories.json` with the embedded defaults
    pub fn load_default_categories(&self) -> Result<()> {
        self.ensure_dir()?;
        write_atomic(&self.path(CATEGORIES_FILE), DEFAULT_CATEGORIES.as_bytes())
    }

    // ----- helpers -----

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.path(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let value = serde_json::from_str(&content).map_err(|e| {
            Error::InvalidData(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        Ok(Some(value))
    }

    /// Optional files degrade to their default instead of failing
    fn read_optional<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        match self.read_json(name) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", name, e);
                T::default()
            }
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        self.ensure_dir()?;
        let json = serde_json::to_vec_pretty(value)?;
        write_atomic(&self.path(name), &json)
    }
}

/// Embedded default category keywords
pub fn default_categories() -> Result<CategoryKeywords> {
    Ok(serde_json::from_str(DEFAULT_CATEGORIES)?)
}

/// Embedded default category groups
pub fn default_category_groups() -> CategoryGroups {
    serde_json::from_str(DEFAULT_CATEGORY_GROUPS).unwrap_or_default()
}

/// Write bytes via a sibling temp file and rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
