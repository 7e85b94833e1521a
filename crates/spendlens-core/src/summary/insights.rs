//! View models for the dashboard, year and month pages

use std::collections::BTreeMap;

use serde::Serialize;

use super::view::{filter_by_month, filter_by_year, month_key, month_nav, year_nav, MonthNav, YearNav};
use super::{
    round2, BudgetVsActual, DaySpending, MerchantTotal, MonthOverview, MonthSpending, Outlier,
    RecurringBill, Spike, Summary, UsageOverTime, YearSummary,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub year: String,
    pub yearly: Option<YearSummary>,
    pub spending: Vec<MonthSpending>,
    pub num_flagged: usize,
    pub recurring_count: usize,
    pub top_merchant: MerchantTotal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearWithSpending {
    #[serde(flatten)]
    pub yearly: YearSummary,
    pub annual_spending: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearView {
    pub year: String,
    pub yearly: Option<YearSummary>,
    pub months: Vec<MonthOverview>,
    pub spending: Vec<MonthSpending>,
    pub annual_spending: f64,
    pub nav: YearNav,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearInsights {
    pub year: String,
    pub nav: YearNav,
    pub category_distribution: BTreeMap<String, f64>,
    pub top_merchants: UsageOverTime,
    pub flagged: Vec<Outlier>,
    pub recurring: Vec<RecurringBill>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRow {
    pub category: String,
    pub amount: f64,
    pub change_vs_previous: Option<f64>,
    pub budget: Option<BudgetVsActual>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthView {
    pub month: String,
    pub overview: Option<MonthOverview>,
    pub spending: f64,
    /// Largest increase vs the previous month first
    pub categories: Vec<CategoryRow>,
    pub spending_chart: Vec<MonthSpending>,
    pub nav: MonthNav,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthInsights {
    pub month: String,
    pub nav: MonthNav,
    pub daily_spending: Vec<DaySpending>,
    pub category_distribution: BTreeMap<String, f64>,
    pub spikes: Vec<Spike>,
    pub flagged: Vec<Outlier>,
    pub recurring: Vec<RecurringBill>,
    pub top_merchants: UsageOverTime,
}

fn year_months(summary: &Summary, year: &str) -> Vec<String> {
    let mut months: Vec<String> = filter_by_year(&summary.monthly_spending, year)
        .into_iter()
        .map(|m| m.month)
        .collect();
    months.sort();
    months
}

/// Usage restricted to `months`, dropping merchants with no spend there
fn usage_in(usage: &UsageOverTime, months: &[String]) -> UsageOverTime {
    usage
        .iter()
        .filter_map(|(merchant, per_month)| {
            let kept: BTreeMap<String, f64> = per_month
                .iter()
                .filter(|(m, _)| months.contains(m))
                .map(|(m, v)| (m.clone(), *v))
                .collect();
            (!kept.is_empty()).then(|| (merchant.clone(), kept))
        })
        .collect()
}

pub fn dashboard(summary: &Summary, year: &str) -> Dashboard {
    let prefix = format!("{}-", year);

    let mut top_merchant: Option<MerchantTotal> = None;
    for (merchant, per_month) in &summary.merchant_insights.usage_over_time {
        let total: f64 = per_month
            .iter()
            .filter(|(m, _)| m.starts_with(&prefix))
            .map(|(_, v)| v)
            .sum();
        if top_merchant.as_ref().map_or(true, |t| total > t.total) {
            top_merchant = Some(MerchantTotal {
                merchant: merchant.clone(),
                total: round2(total),
            });
        }
    }

    Dashboard {
        year: year.to_string(),
        yearly: summary.yearly_summary.iter().find(|y| y.year == year).cloned(),
        spending: filter_by_year(&summary.monthly_spending, year),
        num_flagged: filter_by_year(&summary.anomalies.outliers, year).len(),
        recurring_count: summary.trends.recurring_bills.len(),
        top_merchant: top_merchant.unwrap_or_default(),
    }
}

fn annual_spending(summary: &Summary, year: &str) -> f64 {
    round2(
        filter_by_year(&summary.monthly_spending, year)
            .iter()
            .map(|m| m.spending)
            .sum(),
    )
}

pub fn all_years(summary: &Summary) -> Vec<YearWithSpending> {
    summary
        .yearly_summary
        .iter()
        .map(|y| YearWithSpending {
            annual_spending: annual_spending(summary, &y.year),
            yearly: y.clone(),
        })
        .collect()
}

pub fn year_view(summary: &Summary, year: &str) -> YearView {
    YearView {
        year: year.to_string(),
        yearly: summary.yearly_summary.iter().find(|y| y.year == year).cloned(),
        months: filter_by_year(&summary.monthly_overview, year),
        spending: filter_by_year(&summary.monthly_spending, year),
        annual_spending: annual_spending(summary, year),
        nav: year_nav(&summary.years(), year),
    }
}

pub fn year_insights(summary: &Summary, year: &str) -> YearInsights {
    let months = year_months(summary, year);

    let mut category_distribution: BTreeMap<String, f64> = BTreeMap::new();
    for month in &months {
        if let Some(breakdown) = summary.category_breakdown.per_month.get(month) {
            for (c, a) in &breakdown.categories {
                *category_distribution.entry(c.clone()).or_default() += a;
            }
        }
    }
    category_distribution.values_mut().for_each(|v| *v = round2(*v));

    let usage = &summary.merchant_insights.usage_over_time;
    let recurring = summary
        .trends
        .recurring_bills
        .iter()
        .filter_map(|item| {
            let per_month = usage.get(&item.description)?;
            let values: Vec<f64> = months
                .iter()
                .filter_map(|m| per_month.get(m).copied())
                .filter(|v| *v > 0.0)
                .collect();
            if values.is_empty() {
                return None;
            }
            let total: f64 = values.iter().sum();
            Some(RecurringBill {
                description: item.description.clone(),
                category: item.category.clone(),
                occurrences: values.len(),
                total: round2(total),
                avg_amount: round2(total / values.len() as f64),
            })
        })
        .collect();

    YearInsights {
        year: year.to_string(),
        nav: year_nav(&summary.years(), year),
        category_distribution,
        top_merchants: usage_in(usage, &months),
        flagged: filter_by_year(&summary.anomalies.outliers, year),
        recurring,
    }
}

pub fn month_view(summary: &Summary, year: &str, month: &str) -> MonthView {
    let key = month_key(year, month);
    let scoped = summary.for_month(&key);

    let mut categories: Vec<CategoryRow> = scoped
        .category_breakdown
        .per_month
        .get(&key)
        .map(|b| {
            b.categories
                .iter()
                .map(|(c, a)| CategoryRow {
                    category: c.clone(),
                    amount: *a,
                    change_vs_previous: b.change_vs_previous.get(c).copied(),
                    budget: b.budget_vs_actual.get(c).cloned(),
                })
                .collect()
        })
        .unwrap_or_default();
    categories.sort_by(|a, b| {
        let a = a.change_vs_previous.unwrap_or(f64::NEG_INFINITY);
        let b = b.change_vs_previous.unwrap_or(f64::NEG_INFINITY);
        b.total_cmp(&a)
    });

    MonthView {
        overview: scoped.monthly_overview.into_iter().next(),
        spending: filter_by_month(&summary.monthly_spending, &key)
            .first()
            .map_or(0.0, |m| m.spending),
        categories,
        spending_chart: summary.monthly_spending.clone(),
        nav: month_nav(&summary.months(), year, month),
        month: key,
    }
}

pub fn month_insights(summary: &Summary, year: &str, month: &str) -> MonthInsights {
    let key = month_key(year, month);
    let scoped = summary.for_month(&key);
    let usage = &scoped.merchant_insights.usage_over_time;

    let recurring = scoped
        .trends
        .recurring_bills
        .iter()
        .filter(|item| {
            usage
                .get(&item.description)
                .and_then(|u| u.get(&key))
                .map_or(false, |v| *v > 0.0)
        })
        .cloned()
        .collect();

    MonthInsights {
        nav: month_nav(&summary.months(), year, month),
        daily_spending: scoped.daily_spending.clone(),
        category_distribution: scoped
            .category_breakdown
            .per_month
            .get(&key)
            .map(|b| b.categories.clone())
            .unwrap_or_default(),
        spikes: scoped.anomalies.spikes.clone(),
        flagged: scoped.anomalies.outliers.clone(),
        recurring,
        top_merchants: usage_in(usage, std::slice::from_ref(&key)),
        month: key,
    }
}
