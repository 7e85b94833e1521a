//! Keyword rules classifier
//!
//! Categories are tried in file order, keywords in list order. A keyword
//! matches when it is a case-insensitive substring of the description or of
//! the bank's original category.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CategoryKeywords, Transaction, FALLBACK_CATEGORY};

use super::{Classifier, ClassifierKind};

#[derive(Debug, Clone)]
pub struct RulesClassifier {
    /// (category, lowercased keywords)
    rules: Vec<(String, Vec<String>)>,
}

impl RulesClassifier {
    pub fn new(categories: CategoryKeywords) -> Self {
        let rules = categories
            .iter()
            .map(|(name, keywords)| {
                let keywords = keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                (name.to_string(), keywords)
            })
            .collect();
        Self { rules }
    }

    /// First matching category for one transaction
    pub fn match_one(&self, tx: &Transaction) -> Option<&str> {
        let description = tx.description.to_lowercase();
        let original = tx.original_category.to_lowercase();
        self.rules
            .iter()
            .find(|(_, keywords)| {
                keywords
                    .iter()
                    .any(|k| description.contains(k.as_str()) || original.contains(k.as_str()))
            })
            .map(|(name, _)| name.as_str())
    }
}

#[async_trait]
impl Classifier for RulesClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Rules
    }

    async fn classify(&self, txs: &[Transaction]) -> Result<Vec<Option<String>>> {
        Ok(txs
            .iter()
            .map(|tx| self.match_one(tx).map(str::to_string))
            .collect())
    }
}

/// Derive a keyword file from categorized transactions
///
/// Each assigned category maps to the original bank categories seen under
/// it, so a later rules run reproduces the mapping.
pub fn generate_categories(txs: &[Transaction]) -> CategoryKeywords {
    let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for tx in txs {
        let category = tx
            .category
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(FALLBACK_CATEGORY);
        let original = if tx.original_category.is_empty() {
            FALLBACK_CATEGORY
        } else {
            tx.original_category.as_str()
        };
        map.entry(category.to_string())
            .or_default()
            .insert(original.to_string());
    }

    map.into_iter()
        .map(|(category, originals)| (category, originals.into_iter().collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(description: &str, original: &str, category: Option<&str>) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            amount: -10.0,
            description: description.into(),
            notes: String::new(),
            original_category: original.into(),
            original_category_group: String::new(),
            category: category.map(str::to_string),
            orig_id: None,
        }
    }

    fn keywords() -> CategoryKeywords {
        let mut c = CategoryKeywords::new();
        c.insert("Transport", vec!["uber".into(), "tfl".into()]);
        c.insert("Groceries", vec!["tesco".into(), "".into()]);
        c.insert("Eating out", vec!["uber eats".into()]);
        c
    }

    #[tokio::test]
    async fn test_first_category_in_file_order_wins() {
        let rules = RulesClassifier::new(keywords());
        let out = rules
            .classify(&[
                tx("UBER EATS LONDON", "", None),
                tx("Card payment", "TESCO STORES", None),
                tx("Something else", "", None),
            ])
            .await
            .unwrap();
        assert_eq!(
            out,
            vec![Some("Transport".into()), Some("Groceries".into()), None]
        );
    }

    #[test]
    fn test_empty_keyword_never_matches() {
        let rules = RulesClassifier::new(keywords());
        assert_eq!(rules.match_one(&tx("ACME", "misc", None)), None);
    }

    #[test]
    fn test_generate_categories() {
        let generated = generate_categories(&[
            tx("a", "Supermarket", Some("Groceries")),
            tx("b", "Food shop", Some("Groceries")),
            tx("c", "Supermarket", Some("Groceries")),
            tx("d", "", None),
        ]);
        assert_eq!(generated.names(), vec!["Groceries", "other"]);
        assert_eq!(
            generated.get("Groceries").unwrap(),
            &["Food shop".to_string(), "Supermarket".to_string()]
        );
        assert_eq!(generated.get("other").unwrap(), &["other".to_string()]);
    }
}
