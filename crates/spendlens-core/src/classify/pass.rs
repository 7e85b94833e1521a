//! Pass-through classifier: trust the bank's own category

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Transaction;

use super::{Classifier, ClassifierKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct PassClassifier;

#[async_trait]
impl Classifier for PassClassifier {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Pass
    }

    async fn classify(&self, txs: &[Transaction]) -> Result<Vec<Option<String>>> {
        Ok(txs
            .iter()
            .map(|tx| {
                let original = tx.original_category.trim();
                (!original.is_empty()).then(|| original.to_string())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_pass_uses_original_category() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut a = Transaction::from_raw(Default::default(), date);
        a.original_category = " Groceries ".into();
        let b = Transaction::from_raw(Default::default(), date);

        let out = PassClassifier.classify(&[a, b]).await.unwrap();
        assert_eq!(out, vec![Some("Groceries".to_string()), None]);
    }
}
