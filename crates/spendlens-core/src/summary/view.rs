//! Read-side helpers over a stored [`Summary`]

use std::collections::BTreeMap;

use serde::Serialize;

use super::{
    DaySpending, Duplicate, LifestyleMonth, MonthOverview, MonthSpending, MonthTrend, Outlier,
    Spike, Summary,
};

/// Items that belong to a month (`YYYY-MM`) or a day (`YYYY-MM-DD`)
pub trait Dated {
    fn month(&self) -> Option<&str> {
        None
    }

    fn date(&self) -> Option<&str> {
        None
    }
}

macro_rules! dated_by_month {
    ($($t:ty),*) => {
        $(impl Dated for $t {
            fn month(&self) -> Option<&str> {
                Some(self.month.as_str())
            }
        })*
    };
}

macro_rules! dated_by_date {
    ($($t:ty),*) => {
        $(impl Dated for $t {
            fn date(&self) -> Option<&str> {
                Some(self.date.as_str())
            }
        })*
    };
}

dated_by_month!(MonthOverview, MonthSpending, MonthTrend, LifestyleMonth, Spike);
dated_by_date!(DaySpending, Outlier, Duplicate);

/// Items in `month`: exact month match, or date prefix
pub fn filter_by_month<T: Dated + Clone>(items: &[T], month: &str) -> Vec<T> {
    if month.is_empty() {
        return Vec::new();
    }
    items
        .iter()
        .filter(|item| match (item.month(), item.date()) {
            (Some(m), _) => m == month,
            (None, Some(d)) => d.starts_with(month),
            _ => false,
        })
        .cloned()
        .collect()
}

/// Items in `year` by month or date prefix
pub fn filter_by_year<T: Dated + Clone>(items: &[T], year: &str) -> Vec<T> {
    if year.is_empty() {
        return Vec::new();
    }
    let prefix = format!("{}-", year);
    items
        .iter()
        .filter(|item| {
            item.month()
                .or_else(|| item.date())
                .map_or(false, |p| p.starts_with(&prefix))
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearNav {
    pub prev_year: Option<String>,
    pub next_year: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthNav {
    pub prev_year: Option<String>,
    pub prev_month: Option<String>,
    pub next_year: Option<String>,
    pub next_month: Option<String>,
}

fn neighbours(sorted: &[String], key: &str) -> (Option<String>, Option<String>) {
    match sorted.iter().position(|s| s == key) {
        Some(i) => (
            i.checked_sub(1).map(|p| sorted[p].clone()),
            sorted.get(i + 1).cloned(),
        ),
        None => (None, None),
    }
}

pub fn year_nav(years: &[String], current: &str) -> YearNav {
    let mut sorted = years.to_vec();
    sorted.sort();
    let (prev_year, next_year) = neighbours(&sorted, current);
    YearNav {
        prev_year,
        next_year,
    }
}

/// Previous/next month around `year-month`; `month` may be unpadded
pub fn month_nav(months: &[String], year: &str, month: &str) -> MonthNav {
    let key = month_key(year, month);
    let mut sorted = months.to_vec();
    sorted.sort();
    let (prev, next) = neighbours(&sorted, &key);

    let split = |m: Option<String>| match m.as_deref().and_then(|m| m.split_once('-')) {
        Some((y, mm)) => (Some(y.to_string()), Some(mm.to_string())),
        None => (None, None),
    };
    let (prev_year, prev_month) = split(prev);
    let (next_year, next_month) = split(next);
    MonthNav {
        prev_year,
        prev_month,
        next_year,
        next_month,
    }
}

/// `2024` + `5` -> `2024-05`
pub fn month_key(year: &str, month: &str) -> String {
    format!("{}-{:0>2}", year, month)
}

impl Summary {
    /// Years with a yearly summary, ascending
    pub fn years(&self) -> Vec<String> {
        let mut years: Vec<String> = self.yearly_summary.iter().map(|y| y.year.clone()).collect();
        years.sort();
        years
    }

    /// Months with spending data, ascending
    pub fn months(&self) -> Vec<String> {
        let mut months: Vec<String> = self.monthly_spending.iter().map(|m| m.month.clone()).collect();
        months.sort();
        months
    }

    /// Copy restricted to a single month for the month views
    ///
    /// Year-level data (`yearlySummary`, `monthlySpending`) is kept whole so
    /// navigation and charts still see every month.
    pub fn for_month(&self, month: &str) -> Summary {
        let mut s = self.clone();

        s.monthly_overview = filter_by_month(&self.monthly_overview, month);
        s.daily_spending = filter_by_month(&self.daily_spending, month);
        s.trends.monthly_trends = filter_by_month(&self.trends.monthly_trends, month);
        s.trends.recurring_bills = self
            .trends
            .monthly_recurring_bills
            .get(month)
            .cloned()
            .unwrap_or_default();
        s.lifestyle = self.lifestyle.as_ref().map(|l| filter_by_month(l, month));

        s.category_breakdown.per_month = self
            .category_breakdown
            .per_month
            .get(month)
            .map(|c| BTreeMap::from([(month.to_string(), c.clone())]))
            .unwrap_or_default();

        s.anomalies.outliers = filter_by_month(&self.anomalies.outliers, month);
        s.anomalies.spikes = filter_by_month(&self.anomalies.spikes, month);
        s.anomalies.duplicates = filter_by_month(&self.anomalies.duplicates, month);

        let mi = &mut s.merchant_insights;
        mi.usage_over_time = self
            .merchant_insights
            .usage_over_time
            .iter()
            .map(|(merchant, months)| {
                let only = months
                    .get(month)
                    .map(|v| BTreeMap::from([(month.to_string(), *v)]))
                    .unwrap_or_default();
                (merchant.clone(), only)
            })
            .collect();
        let usage = &mi.usage_over_time;
        mi.transaction_counts = self
            .merchant_insights
            .transaction_counts
            .iter()
            .filter(|(m, _)| usage.get(*m).and_then(|u| u.get(month)).map_or(false, |v| *v > 0.0))
            .map(|(m, c)| (m.clone(), *c))
            .collect();

        s.budget_adherence = Some(
            self.budget_adherence
                .as_ref()
                .and_then(|b| b.get(month))
                .map(|b| BTreeMap::from([(month.to_string(), b.clone())]))
                .unwrap_or_default(),
        );

        if let Some(goals) = s.savings_goals.as_mut() {
            for goal in goals.values_mut() {
                let value = goal.monthly_contributions.get(month).copied().unwrap_or(0.0);
                goal.monthly_contributions = BTreeMap::from([(month.to_string(), value)]);
            }
        }

        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Goal, Transaction};
    use crate::summary::{generate, SummaryInputs};
    use chrono::NaiveDate;

    fn tx(date: &str, amount: f64, description: &str, category: &str) -> Transaction {
        let mut t = Transaction::from_raw(
            Default::default(),
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        );
        t.amount = amount;
        t.description = description.into();
        t.category = Some(category.into());
        t
    }

    fn summary() -> Summary {
        let txs = vec![
            tx("2024-01-02", -10.0, "Spotify", "Entertainment"),
            tx("2024-02-02", -10.0, "Spotify", "Entertainment"),
            tx("2024-03-02", -10.0, "Spotify", "Entertainment"),
            tx("2024-03-05", -40.0, "Tesco", "Groceries"),
            tx("2024-03-05", -40.0, "Tesco", "Groceries"),
            tx("2024-03-28", 1500.0, "Salary", "Income"),
        ];
        let mut inputs = SummaryInputs::default();
        inputs.budgets.insert("Groceries".into(), 100.0);
        inputs.goals.insert(
            "Fun".into(),
            Goal {
                category: "Entertainment".into(),
                target: 100.0,
            },
        );
        generate(&txs, &inputs)
    }

    #[test]
    fn test_for_month() {
        let s = summary().for_month("2024-03");
        assert_eq!(s.monthly_overview.len(), 1);
        assert_eq!(s.monthly_overview[0].month, "2024-03");
        assert_eq!(s.monthly_spending.len(), 3);
        assert!(s.daily_spending.iter().all(|d| d.date.starts_with("2024-03")));
        assert_eq!(s.category_breakdown.per_month.len(), 1);
        assert_eq!(s.trends.recurring_bills.len(), 1);
        assert_eq!(s.trends.recurring_bills[0].occurrences, 1);
        assert_eq!(s.anomalies.duplicates.len(), 1);

        let usage = &s.merchant_insights.usage_over_time;
        assert_eq!(usage["Tesco"].len(), 1);
        assert_eq!(usage["Spotify"]["2024-03"], 10.0);
        assert_eq!(s.merchant_insights.transaction_counts.len(), 2);

        assert_eq!(s.budget_adherence.as_ref().unwrap().len(), 1);
        let goal = &s.savings_goals.as_ref().unwrap()["Fun"];
        assert_eq!(goal.monthly_contributions["2024-03"], 10.0);
    }

    #[test]
    fn test_for_month_without_data() {
        let s = summary().for_month("2023-07");
        assert!(s.monthly_overview.is_empty());
        assert!(s.category_breakdown.per_month.is_empty());
        assert!(s.trends.recurring_bills.is_empty());
        assert!(s.merchant_insights.transaction_counts.is_empty());
        assert!(s.merchant_insights.usage_over_time["Tesco"].is_empty());
        assert!(s.budget_adherence.unwrap().is_empty());
        let goal = &s.savings_goals.as_ref().unwrap()["Fun"];
        assert_eq!(goal.monthly_contributions["2023-07"], 0.0);
    }

    #[test]
    fn test_year_nav() {
        let years = vec!["2025".to_string(), "2023".to_string(), "2024".to_string()];
        let nav = year_nav(&years, "2024");
        assert_eq!(nav.prev_year.as_deref(), Some("2023"));
        assert_eq!(nav.next_year.as_deref(), Some("2025"));
        assert_eq!(year_nav(&years, "2023").prev_year, None);
        assert_eq!(year_nav(&years, "1999"), YearNav::default());
    }

    #[test]
    fn test_month_nav() {
        let months = vec![
            "2024-01".to_string(),
            "2023-12".to_string(),
            "2024-02".to_string(),
        ];
        let nav = month_nav(&months, "2024", "1");
        assert_eq!(nav.prev_year.as_deref(), Some("2023"));
        assert_eq!(nav.prev_month.as_deref(), Some("12"));
        assert_eq!(nav.next_year.as_deref(), Some("2024"));
        assert_eq!(nav.next_month.as_deref(), Some("02"));

        let last = month_nav(&months, "2024", "02");
        assert_eq!(last.next_month, None);
    }

    #[test]
    fn test_filters() {
        let s = summary();
        assert_eq!(filter_by_year(&s.monthly_spending, "2024").len(), 3);
        assert!(filter_by_year(&s.monthly_spending, "2023").is_empty());
        assert_eq!(filter_by_month(&s.daily_spending, "2024-03").len(), 2);
        assert!(filter_by_month(&s.daily_spending, "").is_empty());
    }
}
