//! Data models for spendlens
//!
//! Field names serialize in camelCase so the flat JSON files keep the layout
//! used by earlier exports (`originalCategory`, `origId`, ...).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Category assigned when no classifier produces an answer
pub const FALLBACK_CATEGORY: &str = "other";

/// Category used by the summary for expenses without a category
pub const UNCATEGORIZED_EXPENSE: &str = "Other expenses";

/// A row as produced by an importer, before date validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTransaction {
    /// Date as found in the file (normalized to YYYY-MM-DD where the importer could)
    pub date: String,
    pub amount: f64,
    pub description: String,
    pub notes: String,
    pub original_category: String,
    pub original_category_group: String,
    /// Bank-provided transaction id (Monzo transaction_id, OFX FITID)
    pub orig_id: Option<String>,
}

/// A validated transaction as stored in `transactions.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub date: NaiveDate,
    /// Signed amount: >= 0 is income, < 0 is an expense
    pub amount: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub original_category: String,
    #[serde(default)]
    pub original_category_group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_id: Option<String>,
}

impl Transaction {
    /// Build a transaction from an importer row with an already parsed date
    pub fn from_raw(raw: RawTransaction, date: NaiveDate) -> Self {
        Self {
            date,
            amount: raw.amount,
            description: raw.description,
            notes: raw.notes,
            original_category: raw.original_category,
            original_category_group: raw.original_category_group,
            category: None,
            orig_id: raw.orig_id.filter(|id| !id.is_empty()),
        }
    }

    pub fn is_expense(&self) -> bool {
        self.amount < 0.0
    }

    /// `YYYY-MM`
    pub fn month_key(&self) -> String {
        format!("{:04}-{:02}", self.date.year(), self.date.month())
    }

    /// `YYYY`
    pub fn year_key(&self) -> String {
        format!("{:04}", self.date.year())
    }

    /// `YYYY-MM-DD`
    pub fn date_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    /// Category for expense aggregation
    pub fn expense_category(&self) -> &str {
        self.category
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(UNCATEGORIZED_EXPENSE)
    }

    /// SHA-256 fingerprint of (date, amount, description)
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.date_key().as_bytes());
        hasher.update(self.amount.to_be_bytes());
        hasher.update(self.description.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Identity used for deduplication: bank id when present, else fingerprint
    pub fn dedupe_key(&self) -> String {
        match &self.orig_id {
            Some(id) => format!("origId:{}", id),
            None => self.fingerprint(),
        }
    }
}

/// Ordered mapping of category name to matching keywords (`categories.json`)
///
/// Rule evaluation is first-match-wins, so file order is significant and
/// survives a load/save round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryKeywords {
    entries: Vec<(String, Vec<String>)>,
}

impl CategoryKeywords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a category, or replace its keywords if it already exists
    pub fn insert(&mut self, category: impl Into<String>, keywords: Vec<String>) {
        let category = category.into();
        if let Some(entry) = self.entries.iter_mut().find(|(c, _)| *c == category) {
            entry.1 = keywords;
        } else {
            self.entries.push((category, keywords));
        }
    }

    pub fn get(&self, category: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, k)| k.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(c, k)| (c.as_str(), k.as_slice()))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Vec<String>)> for CategoryKeywords {
    fn from_iter<I: IntoIterator<Item = (S, Vec<String>)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (category, keywords) in iter {
            out.insert(category, keywords);
        }
        out
    }
}

impl Serialize for CategoryKeywords {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (category, keywords) in &self.entries {
            map.serialize_entry(category, keywords)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CategoryKeywords {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct KeywordsVisitor;

        impl<'de> Visitor<'de> for KeywordsVisitor {
            type Value = CategoryKeywords;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of category names to keyword lists")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut out = CategoryKeywords::new();
                while let Some((category, keywords)) =
                    access.next_entry::<String, Vec<String>>()?
                {
                    out.insert(category, keywords);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(KeywordsVisitor)
    }
}

/// Monthly budget per category (`budgets.json`)
pub type Budgets = BTreeMap<String, f64>;

/// Savings goal definition (`goals.json` values)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub category: String,
    pub target: f64,
}

/// Savings goals keyed by goal name
pub type Goals = BTreeMap<String, Goal>;

/// Named groups of categories (`category-groups.json`)
///
/// `Essentials`, `Lifestyle` and `Internal` drive the lifestyle report and
/// the monthly spending exclusions.
pub type CategoryGroups = BTreeMap<String, Vec<String>>;

/// Categories whose spend counts toward the tax-deductible total
pub type DeductibleCategories = Vec<String>;

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_transaction_json_layout() {
        let mut t = tx("2025-03-04", -12.5, "Coffee");
        t.original_category = "Eating out".into();
        t.category = Some("Dining".into());

        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["date"], "2025-03-04");
        assert_eq!(json["originalCategory"], "Eating out");
        assert_eq!(json["category"], "Dining");
        assert!(json.get("origId").is_none());
    }

    #[test]
    fn test_transaction_deserialize_minimal() {
        let t: Transaction =
            serde_json::from_str(r#"{"date":"2023-01-02","amount":100,"description":"Test"}"#)
                .unwrap();
        assert_eq!(t.amount, 100.0);
        assert!(t.notes.is_empty());
        assert!(t.category.is_none());
    }

    #[test]
    fn test_keys() {
        let t = tx("2024-02-09", -1.0, "x");
        assert_eq!(t.month_key(), "2024-02");
        assert_eq!(t.year_key(), "2024");
        assert_eq!(t.date_key(), "2024-02-09");
        assert_eq!(t.expense_category(), UNCATEGORIZED_EXPENSE);
    }

    #[test]
    fn test_dedupe_key_prefers_orig_id() {
        let mut a = tx("2024-02-09", -1.0, "x");
        let b = tx("2024-02-09", -1.0, "x");
        assert_eq!(a.dedupe_key(), b.dedupe_key());

        a.orig_id = Some("tx_123".into());
        assert_eq!(a.dedupe_key(), "origId:tx_123");
        assert_ne!(a.dedupe_key(), b.dedupe_key());
    }

    #[test]
    fn test_fingerprint_distinguishes_amount() {
        let a = tx("2024-02-09", -1.0, "x");
        let b = tx("2024-02-09", -1.5, "x");
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_category_keywords_preserve_order() {
        let json = r#"{"Zebra":["z"],"Apple":["a","b"],"Mango":[]}"#;
        let cats: CategoryKeywords = serde_json::from_str(json).unwrap();
        assert_eq!(cats.names(), vec!["Zebra", "Apple", "Mango"]);
        assert_eq!(cats.get("Apple").unwrap(), ["a", "b"]);

        let back = serde_json::to_string(&cats).unwrap();
        assert_eq!(back, json);
    }

    #[test]
    fn test_category_keywords_insert_replaces() {
        let mut cats = CategoryKeywords::new();
        cats.insert("A", vec!["x".into()]);
        cats.insert("B", vec![]);
        cats.insert("A", vec!["y".into()]);
        assert_eq!(cats.len(), 2);
        assert_eq!(cats.names(), vec!["A", "B"]);
        assert_eq!(cats.get("A").unwrap(), ["y"]);
    }
}
