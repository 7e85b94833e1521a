//! Summary reports
//!
//! [`generate`] turns categorized transactions into the `summary.json`
//! document every view reads from. It is a pure function: budgets, goals and
//! category groups come in through [`SummaryInputs`].
//!
//! Conventions:
//! - amounts >= 0 are income, amounts < 0 are expenses (reported as |amount|)
//! - an expense without a category counts as `Other expenses`
//! - every monetary output is rounded to 2 dp

mod insights;
mod view;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::{
    Budgets, CategoryGroups, DeductibleCategories, Goals, Transaction,
};
use crate::store::DataStore;

pub use insights::{
    all_years, dashboard, month_insights, month_view, year_insights, year_view, CategoryRow,
    Dashboard, MonthInsights, MonthView, YearInsights, YearView, YearWithSpending,
};
pub use view::{
    filter_by_month, filter_by_year, month_key, month_nav, year_nav, Dated, MonthNav, YearNav,
};

/// Internal-movement categories left out of monthly spending when the
/// `Internal` group is not configured
pub const DEFAULT_INTERNAL_CATEGORIES: [&str; 3] = ["Transfers", "Savings", "Income"];

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn pct(part: f64, whole: f64) -> Option<f64> {
    (whole != 0.0).then(|| round2(part / whole * 100.0))
}

// ----- document types -----

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Summary {
    pub monthly_overview: Vec<MonthOverview>,
    pub monthly_spending: Vec<MonthSpending>,
    pub category_breakdown: CategoryBreakdown,
    pub trends: Trends,
    pub lifestyle: Option<Vec<LifestyleMonth>>,
    pub merchant_insights: MerchantInsights,
    pub budget_adherence: Option<BTreeMap<String, BTreeMap<String, BudgetAdherence>>>,
    pub savings_goals: Option<BTreeMap<String, GoalProgress>>,
    pub anomalies: Anomalies,
    pub yearly_summary: Vec<YearSummary>,
    pub daily_spending: Vec<DaySpending>,
    pub categories_list: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CategoryAmount {
    pub category: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonthOverview {
    pub month: String,
    pub total_income: f64,
    pub total_expenses: f64,
    pub net_cash_flow: f64,
    pub savings_rate: f64,
    pub top_categories: Vec<CategoryAmount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonthSpending {
    pub month: String,
    pub spending: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub per_month: BTreeMap<String, MonthCategories>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonthCategories {
    pub categories: BTreeMap<String, f64>,
    pub change_vs_previous: BTreeMap<String, f64>,
    pub budget_vs_actual: BTreeMap<String, BudgetVsActual>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BudgetVsActual {
    pub budget: f64,
    pub actual: f64,
    pub variance: f64,
    pub pct_used: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Trends {
    pub monthly_trends: Vec<MonthTrend>,
    pub recurring_bills: Vec<RecurringBill>,
    pub monthly_recurring_bills: BTreeMap<String, Vec<RecurringBill>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonthTrend {
    pub month: String,
    pub income: f64,
    pub expenses: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecurringBill {
    pub description: String,
    pub category: String,
    pub occurrences: usize,
    pub total: f64,
    pub avg_amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LifestyleMonth {
    pub month: String,
    pub essentials: f64,
    pub lifestyle: f64,
    pub discretionary_pct: Option<f64>,
    pub wants_vs_needs: WantsVsNeeds,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WantsVsNeeds {
    pub wants: f64,
    pub needs: f64,
}

/// Merchant → month → amount
pub type UsageOverTime = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MerchantInsights {
    pub top_merchants: Vec<MerchantTotal>,
    pub transaction_counts: BTreeMap<String, usize>,
    pub usage_over_time: UsageOverTime,
    pub usage_over_time_by_category: BTreeMap<String, BTreeMap<String, BTreeMap<String, f64>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerchantTotal {
    pub merchant: String,
    pub total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BudgetAdherence {
    pub budget: f64,
    pub actual: f64,
    pub remaining: f64,
    pub pct_used: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GoalProgress {
    pub target: f64,
    pub actual: f64,
    pub progress_pct: Option<f64>,
    pub monthly_contributions: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Anomalies {
    pub outliers: Vec<Outlier>,
    pub spikes: Vec<Spike>,
    pub duplicates: Vec<Duplicate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Outlier {
    pub date: String,
    pub description: String,
    pub category: String,
    pub amount: f64,
    pub mean: f64,
    pub sd: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spike {
    pub category: String,
    pub month: String,
    pub amount: f64,
    pub mean: f64,
    pub sd: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Duplicate {
    pub date: String,
    pub amount: f64,
    pub description: String,
    pub occurrences: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct YearSummary {
    pub year: String,
    pub total_income: f64,
    pub total_expenses: f64,
    pub net_cash_flow: f64,
    pub savings_rate: f64,
    pub category_changes: CategoryChanges,
    pub year_on_year_comparison: Option<YearOnYear>,
    pub tax_deductible_total: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryChanges {
    pub increased: Vec<CategoryChange>,
    pub decreased: Vec<CategoryChange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryChange {
    pub category: String,
    pub change: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct YearOnYear {
    pub income_diff: f64,
    pub expenses_diff: f64,
    pub net_diff: f64,
    pub savings_rate_diff: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DaySpending {
    pub date: String,
    pub spending: f64,
    pub by_category: Vec<CategoryAmount>,
}

// ----- inputs -----

/// User configuration the report depends on
#[derive(Debug, Clone, Default)]
pub struct SummaryInputs {
    pub budgets: Budgets,
    pub goals: Goals,
    pub category_groups: CategoryGroups,
    pub deductible: DeductibleCategories,
    /// Inclusive `YYYY-MM` bounds
    pub start_month: Option<String>,
    pub end_month: Option<String>,
}

impl SummaryInputs {
    pub fn from_store(store: &DataStore) -> Self {
        Self {
            budgets: store.load_budgets(),
            goals: store.load_goals(),
            category_groups: store.load_category_groups(),
            deductible: store.load_deductible(),
            start_month: None,
            end_month: None,
        }
    }

    pub fn with_range(mut self, start_month: Option<String>, end_month: Option<String>) -> Self {
        self.start_month = start_month.filter(|m| !m.is_empty());
        self.end_month = end_month.filter(|m| !m.is_empty());
        self
    }

    fn in_range(&self, month: &str) -> bool {
        self.start_month.as_deref().map_or(true, |s| month >= s)
            && self.end_month.as_deref().map_or(true, |e| month <= e)
    }
}

// ----- aggregation -----

#[derive(Debug, Default)]
struct Totals {
    income: f64,
    expenses: f64,
    categories: BTreeMap<String, f64>,
}

impl Totals {
    fn add(&mut self, tx: &Transaction) {
        if tx.amount >= 0.0 {
            self.income += tx.amount;
        } else {
            let expense = tx.amount.abs();
            self.expenses += expense;
            *self
                .categories
                .entry(tx.expense_category().to_string())
                .or_default() += expense;
        }
    }

    fn net(&self) -> f64 {
        self.income - self.expenses
    }

    fn savings_rate(&self) -> f64 {
        if self.income != 0.0 {
            self.net() / self.income * 100.0
        } else {
            0.0
        }
    }
}

fn group_by<F: Fn(&Transaction) -> String>(txs: &[Transaction], key: F) -> BTreeMap<String, Totals> {
    let mut out: BTreeMap<String, Totals> = BTreeMap::new();
    for tx in txs {
        out.entry(key(tx)).or_default().add(tx);
    }
    out
}

/// Population mean and standard deviation
fn mean_sd(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn sorted_desc(map: &BTreeMap<String, f64>) -> Vec<(&String, f64)> {
    let mut entries: Vec<(&String, f64)> = map.iter().map(|(k, v)| (k, *v)).collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1));
    entries
}

/// Build the full report
pub fn generate(txs: &[Transaction], inputs: &SummaryInputs) -> Summary {
    let txs: Vec<Transaction> = txs
        .iter()
        .filter(|tx| inputs.in_range(&tx.month_key()))
        .cloned()
        .collect();
    let monthly = group_by(&txs, Transaction::month_key);

    Summary {
        monthly_overview: monthly_overview(&monthly),
        monthly_spending: monthly_spending(&monthly, &inputs.category_groups),
        category_breakdown: category_breakdown(&monthly, &inputs.budgets),
        trends: trends(&monthly, &txs),
        lifestyle: lifestyle(&monthly, &inputs.category_groups),
        merchant_insights: merchant_insights(&txs),
        budget_adherence: budget_adherence(&monthly, &inputs.budgets),
        savings_goals: savings_goals(&txs, &inputs.goals),
        anomalies: anomalies(&txs, &monthly),
        yearly_summary: yearly_summary(&txs, &inputs.deductible),
        daily_spending: daily_spending(&txs),
        categories_list: categories_list(&txs),
    }
}

fn monthly_overview(monthly: &BTreeMap<String, Totals>) -> Vec<MonthOverview> {
    monthly
        .iter()
        .rev()
        .map(|(month, t)| MonthOverview {
            month: month.clone(),
            total_income: round2(t.income),
            total_expenses: round2(t.expenses),
            net_cash_flow: round2(t.net()),
            savings_rate: round2(t.savings_rate()),
            top_categories: sorted_desc(&t.categories)
                .into_iter()
                .take(5)
                .map(|(c, a)| CategoryAmount {
                    category: c.clone(),
                    amount: round2(a),
                })
                .collect(),
        })
        .collect()
}

fn monthly_spending(monthly: &BTreeMap<String, Totals>, groups: &CategoryGroups) -> Vec<MonthSpending> {
    let internal: Vec<&str> = match groups.get("Internal") {
        Some(cats) if !cats.is_empty() => cats.iter().map(String::as_str).collect(),
        _ => DEFAULT_INTERNAL_CATEGORIES.to_vec(),
    };

    monthly
        .iter()
        .rev()
        .map(|(month, t)| MonthSpending {
            month: month.clone(),
            spending: round2(
                t.categories
                    .iter()
                    .filter(|(c, _)| !internal.contains(&c.as_str()))
                    .map(|(_, a)| a)
                    .sum(),
            ),
        })
        .collect()
}

fn category_breakdown(monthly: &BTreeMap<String, Totals>, budgets: &Budgets) -> CategoryBreakdown {
    let mut per_month = BTreeMap::new();
    let mut prev: Option<&Totals> = None;

    for (month, t) in monthly {
        let change_vs_previous = t
            .categories
            .iter()
            .map(|(c, a)| {
                let before = prev.and_then(|p| p.categories.get(c)).copied().unwrap_or(0.0);
                (c.clone(), round2(a - before))
            })
            .collect();

        let budget_vs_actual = budgets
            .iter()
            .map(|(c, budget)| {
                let actual = t.categories.get(c).copied().unwrap_or(0.0);
                (
                    c.clone(),
                    BudgetVsActual {
                        budget: *budget,
                        actual: round2(actual),
                        variance: round2(actual - budget),
                        pct_used: pct(actual, *budget),
                    },
                )
            })
            .collect();

        per_month.insert(
            month.clone(),
            MonthCategories {
                categories: t.categories.iter().map(|(c, a)| (c.clone(), round2(*a))).collect(),
                change_vs_previous,
                budget_vs_actual,
            },
        );
        prev = Some(t);
    }

    CategoryBreakdown { per_month }
}

fn recurring_item(description: &str, category: &str, amounts: &[f64]) -> RecurringBill {
    let total: f64 = amounts.iter().sum();
    RecurringBill {
        description: description.to_string(),
        category: category.to_string(),
        occurrences: amounts.len(),
        total: round2(total),
        avg_amount: round2(total / amounts.len() as f64),
    }
}

fn trends(monthly: &BTreeMap<String, Totals>, txs: &[Transaction]) -> Trends {
    let monthly_trends = monthly
        .iter()
        .map(|(month, t)| MonthTrend {
            month: month.clone(),
            income: round2(t.income),
            expenses: round2(t.expenses),
        })
        .collect();

    // (description, category) in first-seen order
    let mut keys: Vec<(String, String)> = Vec::new();
    let mut amounts: HashMap<(String, String), Vec<f64>> = HashMap::new();
    let mut by_month: BTreeMap<String, HashMap<(String, String), Vec<f64>>> = BTreeMap::new();

    for tx in txs.iter().filter(|t| t.is_expense()) {
        let key = (
            tx.description.clone(),
            tx.category.clone().unwrap_or_default(),
        );
        let amount = tx.amount.abs();
        by_month
            .entry(tx.month_key())
            .or_default()
            .entry(key.clone())
            .or_default()
            .push(amount);
        let slot = amounts.entry(key.clone()).or_default();
        if slot.is_empty() {
            keys.push(key);
        }
        slot.push(amount);
    }

    let recurring: Vec<&(String, String)> = keys
        .iter()
        .filter(|k| amounts.get(*k).map_or(false, |a| a.len() >= 3))
        .collect();

    let recurring_bills = recurring
        .iter()
        .map(|k| recurring_item(&k.0, &k.1, &amounts[*k]))
        .collect();

    let monthly_recurring_bills = monthly
        .keys()
        .map(|month| {
            let items = by_month
                .get(month)
                .map(|m| {
                    recurring
                        .iter()
                        .filter_map(|k| m.get(*k).map(|a| recurring_item(&k.0, &k.1, a)))
                        .collect()
                })
                .unwrap_or_default();
            (month.clone(), items)
        })
        .collect();

    Trends {
        monthly_trends,
        recurring_bills,
        monthly_recurring_bills,
    }
}

fn group_total(t: &Totals, cats: &[String]) -> f64 {
    cats.iter().filter_map(|c| t.categories.get(c)).sum()
}

fn lifestyle(monthly: &BTreeMap<String, Totals>, groups: &CategoryGroups) -> Option<Vec<LifestyleMonth>> {
    let essentials = groups.get("Essentials")?;
    let lifestyle = groups.get("Lifestyle")?;

    Some(
        monthly
            .iter()
            .map(|(month, t)| {
                let needs = round2(group_total(t, essentials));
                let wants = round2(group_total(t, lifestyle));
                LifestyleMonth {
                    month: month.clone(),
                    essentials: needs,
                    lifestyle: wants,
                    discretionary_pct: pct(group_total(t, lifestyle), t.income),
                    wants_vs_needs: WantsVsNeeds { wants, needs },
                }
            })
            .collect(),
    )
}

fn merchant_name(tx: &Transaction) -> &str {
    if tx.description.is_empty() {
        "Unknown"
    } else {
        &tx.description
    }
}

fn merchant_insights(txs: &[Transaction]) -> MerchantInsights {
    let mut spend: BTreeMap<String, f64> = BTreeMap::new();
    let mut out = MerchantInsights::default();

    for tx in txs.iter().filter(|t| t.is_expense()) {
        let merchant = merchant_name(tx).to_string();
        let amount = tx.amount.abs();
        let month = tx.month_key();

        *spend.entry(merchant.clone()).or_default() += amount;
        *out.transaction_counts.entry(merchant.clone()).or_default() += 1;
        *out
            .usage_over_time
            .entry(merchant.clone())
            .or_default()
            .entry(month.clone())
            .or_default() += amount;
        *out
            .usage_over_time_by_category
            .entry(merchant)
            .or_default()
            .entry(month)
            .or_default()
            .entry(tx.expense_category().to_string())
            .or_default() += amount;
    }

    out.top_merchants = sorted_desc(&spend)
        .into_iter()
        .take(5)
        .map(|(m, total)| MerchantTotal {
            merchant: m.clone(),
            total: round2(total),
        })
        .collect();

    for months in out.usage_over_time.values_mut() {
        months.values_mut().for_each(|v| *v = round2(*v));
    }
    for months in out.usage_over_time_by_category.values_mut() {
        for cats in months.values_mut() {
            cats.values_mut().for_each(|v| *v = round2(*v));
        }
    }
    out
}

fn budget_adherence(
    monthly: &BTreeMap<String, Totals>,
    budgets: &Budgets,
) -> Option<BTreeMap<String, BTreeMap<String, BudgetAdherence>>> {
    if budgets.is_empty() {
        return None;
    }
    Some(
        monthly
            .iter()
            .map(|(month, t)| {
                let per_cat = budgets
                    .iter()
                    .map(|(c, budget)| {
                        let actual = t.categories.get(c).copied().unwrap_or(0.0);
                        (
                            c.clone(),
                            BudgetAdherence {
                                budget: *budget,
                                actual: round2(actual),
                                remaining: round2(budget - actual),
                                pct_used: pct(actual, *budget),
                            },
                        )
                    })
                    .collect();
                (month.clone(), per_cat)
            })
            .collect(),
    )
}

fn savings_goals(txs: &[Transaction], goals: &Goals) -> Option<BTreeMap<String, GoalProgress>> {
    if goals.is_empty() {
        return None;
    }
    Some(
        goals
            .iter()
            .map(|(name, goal)| {
                let mut actual = 0.0;
                let mut monthly: BTreeMap<String, f64> = BTreeMap::new();
                for tx in txs
                    .iter()
                    .filter(|t| t.category.as_deref() == Some(goal.category.as_str()))
                {
                    actual += tx.amount.abs();
                    *monthly.entry(tx.month_key()).or_default() += tx.amount.abs();
                }
                (
                    name.clone(),
                    GoalProgress {
                        target: goal.target,
                        actual: round2(actual),
                        progress_pct: pct(actual, goal.target),
                        monthly_contributions: monthly
                            .into_iter()
                            .map(|(m, v)| (m, round2(v)))
                            .collect(),
                    },
                )
            })
            .collect(),
    )
}

fn anomalies(txs: &[Transaction], monthly: &BTreeMap<String, Totals>) -> Anomalies {
    let mut by_category: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for tx in txs.iter().filter(|t| t.is_expense()) {
        by_category
            .entry(tx.expense_category())
            .or_default()
            .push(tx.amount.abs());
    }
    let stats: BTreeMap<&str, (f64, f64)> = by_category
        .iter()
        .map(|(c, values)| (*c, mean_sd(values)))
        .collect();

    let outliers = txs
        .iter()
        .filter(|t| t.is_expense())
        .filter_map(|tx| {
            let category = tx.expense_category();
            let amount = tx.amount.abs();
            let (mean, sd) = *stats.get(category)?;
            let flagged = if sd > 0.0 {
                (amount - mean).abs() > 2.0 * sd
            } else {
                amount > mean
            };
            flagged.then(|| Outlier {
                date: tx.date_key(),
                description: tx.description.clone(),
                category: category.to_string(),
                amount: round2(amount),
                mean: round2(mean),
                sd: round2(sd),
            })
        })
        .collect();

    // Months in first-seen order, each with its expense categories in
    // first-seen order; spikes come out in that order
    let mut seen: Vec<(String, Vec<&str>)> = Vec::new();
    for tx in txs {
        let month = tx.month_key();
        let idx = match seen.iter().position(|(m, _)| *m == month) {
            Some(i) => i,
            None => {
                seen.push((month, Vec::new()));
                seen.len() - 1
            }
        };
        let categories = &mut seen[idx].1;
        if tx.is_expense() && !categories.contains(&tx.expense_category()) {
            categories.push(tx.expense_category());
        }
    }
    let mut month_series: Vec<(&str, Vec<(&str, f64)>)> = Vec::new();
    for (month, categories) in &seen {
        let Some(totals) = monthly.get(month) else {
            continue;
        };
        for &category in categories {
            let Some(amount) = totals.categories.get(category) else {
                continue;
            };
            let point = (month.as_str(), *amount);
            match month_series.iter_mut().find(|(c, _)| *c == category) {
                Some((_, series)) => series.push(point),
                None => month_series.push((category, vec![point])),
            }
        }
    }
    let mut spikes = Vec::new();
    for (category, series) in &month_series {
        let values: Vec<f64> = series.iter().map(|(_, a)| *a).collect();
        let (mean, sd) = mean_sd(&values);
        for (month, amount) in series {
            if *amount > mean + 2.0 * sd {
                spikes.push(Spike {
                    category: category.to_string(),
                    month: month.to_string(),
                    amount: round2(*amount),
                    mean: round2(mean),
                    sd: round2(sd),
                });
            }
        }
    }

    let mut dup_order: Vec<(String, u64, String)> = Vec::new();
    let mut dup_counts: HashMap<(String, u64, String), (f64, usize)> = HashMap::new();
    for tx in txs {
        let key = (tx.date_key(), tx.amount.to_bits(), tx.description.clone());
        let entry = dup_counts.entry(key.clone()).or_insert((tx.amount, 0));
        if entry.1 == 0 {
            dup_order.push(key);
        }
        entry.1 += 1;
    }
    let duplicates = dup_order
        .into_iter()
        .filter_map(|key| {
            let (amount, occurrences) = dup_counts[&key];
            (occurrences > 1).then(|| Duplicate {
                date: key.0,
                amount,
                description: key.2,
                occurrences,
            })
        })
        .collect();

    Anomalies {
        outliers,
        spikes,
        duplicates,
    }
}

fn yearly_summary(txs: &[Transaction], deductible: &DeductibleCategories) -> Vec<YearSummary> {
    let years = group_by(txs, Transaction::year_key);
    let mut out = Vec::new();
    let mut prev: Option<&Totals> = None;

    for (year, t) in &years {
        let mut changes = CategoryChanges::default();
        if let Some(p) = prev {
            for (c, a) in &t.categories {
                let diff = a - p.categories.get(c).copied().unwrap_or(0.0);
                let change = CategoryChange {
                    category: c.clone(),
                    change: round2(diff),
                };
                if diff > 0.0 {
                    changes.increased.push(change);
                } else if diff < 0.0 {
                    changes.decreased.push(change);
                }
            }
        }

        let year_on_year_comparison = prev.map(|p| YearOnYear {
            income_diff: round2(t.income - p.income),
            expenses_diff: round2(t.expenses - p.expenses),
            net_diff: round2(t.net() - p.net()),
            savings_rate_diff: round2(t.savings_rate() - p.savings_rate()),
        });

        let tax_deductible_total = (!deductible.is_empty()).then(|| {
            round2(deductible.iter().filter_map(|c| t.categories.get(c)).sum())
        });

        out.push(YearSummary {
            year: year.clone(),
            total_income: round2(t.income),
            total_expenses: round2(t.expenses),
            net_cash_flow: round2(t.net()),
            savings_rate: round2(t.savings_rate()),
            category_changes: changes,
            year_on_year_comparison,
            tax_deductible_total,
        });
        prev = Some(t);
    }
    out
}

fn daily_spending(txs: &[Transaction]) -> Vec<DaySpending> {
    let mut days: BTreeMap<String, (f64, Vec<(String, f64)>)> = BTreeMap::new();
    for tx in txs.iter().filter(|t| t.is_expense()) {
        let amount = tx.amount.abs();
        let (total, cats) = days.entry(tx.date_key()).or_default();
        *total += amount;
        let category = tx.expense_category();
        match cats.iter_mut().find(|(c, _)| c == category) {
            Some(slot) => slot.1 += amount,
            None => cats.push((category.to_string(), amount)),
        }
    }

    days.into_iter()
        .map(|(date, (total, cats))| DaySpending {
            date,
            spending: round2(total),
            by_category: cats
                .into_iter()
                .map(|(category, amount)| CategoryAmount {
                    category,
                    amount: round2(amount),
                })
                .collect(),
        })
        .collect()
}

fn categories_list(txs: &[Transaction]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for c in txs.iter().filter_map(|t| t.category.as_deref()) {
        if !c.is_empty() && !out.iter().any(|o| o == c) {
            out.push(c.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Goal;
    use chrono::NaiveDate;

    fn tx(date: &str, amount: f64, description: &str, category: &str) -> Transaction {
        Transaction {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            amount,
            description: description.into(),
            notes: String::new(),
            original_category: String::new(),
            original_category_group: String::new(),
            category: (!category.is_empty()).then(|| category.to_string()),
            orig_id: None,
        }
    }

    fn sample() -> Vec<Transaction> {
        vec![
            tx("2023-12-01", 1000.0, "Salary", "Income"),
            tx("2023-12-05", -50.0, "Tesco", "Groceries"),
            tx("2024-01-01", 2000.0, "Salary", "Income"),
            tx("2024-01-03", -100.0, "Tesco", "Groceries"),
            tx("2024-01-04", -20.0, "Netflix", "Entertainment"),
            tx("2024-01-10", -500.0, "Transfer to ISA", "Savings"),
            tx("2024-01-15", -30.0, "", ""),
            tx("2024-02-01", 2000.0, "Salary", "Income"),
            tx("2024-02-03", -300.0, "Tesco", "Groceries"),
            tx("2024-02-04", -20.0, "Netflix", "Entertainment"),
            tx("2024-02-04", -20.0, "Netflix", "Entertainment"),
            tx("2024-03-04", -20.0, "Netflix", "Entertainment"),
        ]
    }

    fn inputs() -> SummaryInputs {
        let mut groups = CategoryGroups::new();
        groups.insert("Essentials".into(), vec!["Groceries".into()]);
        groups.insert("Lifestyle".into(), vec!["Entertainment".into()]);
        SummaryInputs {
            category_groups: groups,
            ..Default::default()
        }
    }

    #[test]
    fn test_monthly_overview_newest_first() {
        let s = generate(&sample(), &inputs());
        let months: Vec<&str> = s.monthly_overview.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, vec!["2024-03", "2024-02", "2024-01", "2023-12"]);

        let jan = &s.monthly_overview[2];
        assert_eq!(jan.total_income, 2000.0);
        assert_eq!(jan.total_expenses, 650.0);
        assert_eq!(jan.net_cash_flow, 1350.0);
        assert_eq!(jan.savings_rate, 67.5);
        assert_eq!(jan.top_categories[0].category, "Savings");
        assert!(jan
            .top_categories
            .iter()
            .any(|c| c.category == "Other expenses" && c.amount == 30.0));

        // no income: rate 0
        assert_eq!(s.monthly_overview[0].savings_rate, 0.0);
    }

    #[test]
    fn test_monthly_spending_excludes_internal() {
        let s = generate(&sample(), &inputs());
        let jan = s.monthly_spending.iter().find(|m| m.month == "2024-01").unwrap();
        assert_eq!(jan.spending, 150.0);

        let mut with_internal = inputs();
        with_internal
            .category_groups
            .insert("Internal".into(), vec!["Entertainment".into()]);
        let s = generate(&sample(), &with_internal);
        let jan = s.monthly_spending.iter().find(|m| m.month == "2024-01").unwrap();
        assert_eq!(jan.spending, 630.0);
    }

    #[test]
    fn test_category_breakdown_and_budgets() {
        let mut inputs = inputs();
        inputs.budgets.insert("Groceries".into(), 200.0);
        inputs.budgets.insert("Rent".into(), 0.0);
        let s = generate(&sample(), &inputs);

        let feb = &s.category_breakdown.per_month["2024-02"];
        assert_eq!(feb.categories["Groceries"], 300.0);
        assert_eq!(feb.change_vs_previous["Groceries"], 200.0);
        assert_eq!(feb.change_vs_previous["Entertainment"], 20.0);
        assert!(!feb.change_vs_previous.contains_key("Savings"));

        let g = &feb.budget_vs_actual["Groceries"];
        assert_eq!(g.variance, 100.0);
        assert_eq!(g.pct_used, Some(150.0));
        assert_eq!(feb.budget_vs_actual["Rent"].pct_used, None);

        let adherence = s.budget_adherence.unwrap();
        assert_eq!(adherence["2024-01"]["Groceries"].remaining, 100.0);
    }

    #[test]
    fn test_recurring_bills() {
        let s = generate(&sample(), &inputs());
        assert_eq!(s.trends.recurring_bills.len(), 2);
        let tesco = &s.trends.recurring_bills[0];
        assert_eq!(tesco.description, "Tesco");
        assert_eq!(tesco.occurrences, 3);
        assert_eq!(tesco.total, 450.0);
        assert_eq!(tesco.avg_amount, 150.0);

        let netflix = &s.trends.recurring_bills[1];
        assert_eq!(netflix.occurrences, 4);

        let feb = &s.trends.monthly_recurring_bills["2024-02"];
        let feb_netflix = feb.iter().find(|r| r.description == "Netflix").unwrap();
        assert_eq!(feb_netflix.occurrences, 2);
        assert_eq!(s.trends.monthly_recurring_bills["2024-03"].len(), 1);
        assert_eq!(s.trends.monthly_trends[0].month, "2023-12");
    }

    #[test]
    fn test_lifestyle_requires_groups() {
        let s = generate(&sample(), &inputs());
        let lifestyle = s.lifestyle.unwrap();
        let jan = lifestyle.iter().find(|l| l.month == "2024-01").unwrap();
        assert_eq!(jan.essentials, 100.0);
        assert_eq!(jan.lifestyle, 20.0);
        assert_eq!(jan.discretionary_pct, Some(1.0));
        let mar = lifestyle.iter().find(|l| l.month == "2024-03").unwrap();
        assert_eq!(mar.discretionary_pct, None);

        assert!(generate(&sample(), &SummaryInputs::default()).lifestyle.is_none());
    }

    #[test]
    fn test_merchant_insights() {
        let s = generate(&sample(), &inputs());
        let m = &s.merchant_insights;
        assert_eq!(m.top_merchants[0].merchant, "Transfer to ISA");
        assert_eq!(m.top_merchants[1].merchant, "Tesco");
        assert_eq!(m.transaction_counts["Netflix"], 4);
        assert_eq!(m.usage_over_time["Netflix"]["2024-02"], 40.0);
        assert_eq!(m.usage_over_time["Unknown"]["2024-01"], 30.0);
        assert_eq!(
            m.usage_over_time_by_category["Unknown"]["2024-01"]["Other expenses"],
            30.0
        );
        assert!(!m.transaction_counts.contains_key("Salary"));
    }

    #[test]
    fn test_savings_goals() {
        let mut inputs = inputs();
        assert!(generate(&sample(), &inputs).savings_goals.is_none());

        inputs.goals.insert(
            "Emergency fund".into(),
            Goal {
                category: "Savings".into(),
                target: 2000.0,
            },
        );
        let goals = generate(&sample(), &inputs).savings_goals.unwrap();
        let g = &goals["Emergency fund"];
        assert_eq!(g.actual, 500.0);
        assert_eq!(g.progress_pct, Some(25.0));
        assert_eq!(g.monthly_contributions["2024-01"], 500.0);
    }

    #[test]
    fn test_anomalies() {
        let mut txs = sample();
        for day in 1..=8 {
            txs.push(tx(&format!("2024-03-{:02}", day + 10), -10.0, "Cafe", "Eating out"));
        }
        txs.push(tx("2024-03-25", -200.0, "Fancy dinner", "Eating out"));

        let s = generate(&txs, &inputs());
        let outlier = s
            .anomalies
            .outliers
            .iter()
            .find(|o| o.category == "Eating out")
            .unwrap();
        assert_eq!(outlier.description, "Fancy dinner");
        assert_eq!(outlier.amount, 200.0);

        let dup = &s.anomalies.duplicates;
        assert_eq!(dup.len(), 1);
        assert_eq!(dup[0].description, "Netflix");
        assert_eq!(dup[0].date, "2024-02-04");
        assert_eq!(dup[0].amount, -20.0);
        assert_eq!(dup[0].occurrences, 2);
    }

    #[test]
    fn test_spikes() {
        let mut txs = Vec::new();
        for m in 1..=9 {
            txs.push(tx(&format!("2024-{:02}-01", m), -100.0, "Shop", "Shopping"));
        }
        txs.push(tx("2024-10-01", -1000.0, "Shop", "Shopping"));
        let s = generate(&txs, &SummaryInputs::default());
        assert_eq!(s.anomalies.spikes.len(), 1);
        assert_eq!(s.anomalies.spikes[0].month, "2024-10");
        assert_eq!(s.anomalies.spikes[0].mean, 190.0);
    }

    #[test]
    fn test_spikes_follow_first_seen_category_order() {
        let mut txs = Vec::new();
        for m in 1..=9 {
            txs.push(tx(&format!("2024-{:02}-01", m), -100.0, "Zoo", "Zeta"));
            txs.push(tx(&format!("2024-{:02}-02", m), -50.0, "Art", "Alpha"));
        }
        txs.push(tx("2024-10-01", -1000.0, "Zoo", "Zeta"));
        txs.push(tx("2024-10-02", -500.0, "Art", "Alpha"));
        let s = generate(&txs, &SummaryInputs::default());
        let order: Vec<&str> = s
            .anomalies
            .spikes
            .iter()
            .map(|sp| sp.category.as_str())
            .collect();
        assert_eq!(order, vec!["Zeta", "Alpha"]);
    }

    #[test]
    fn test_yearly_summary() {
        let mut inputs = inputs();
        inputs.deductible = vec!["Groceries".into()];
        let s = generate(&sample(), &inputs);

        assert_eq!(s.yearly_summary.len(), 2);
        let y23 = &s.yearly_summary[0];
        assert_eq!(y23.year, "2023");
        assert!(y23.year_on_year_comparison.is_none());
        assert!(y23.category_changes.increased.is_empty());
        assert_eq!(y23.tax_deductible_total, Some(50.0));

        let y24 = &s.yearly_summary[1];
        assert_eq!(y24.total_income, 4000.0);
        let yoy = y24.year_on_year_comparison.as_ref().unwrap();
        assert_eq!(yoy.income_diff, 3000.0);
        assert!(y24
            .category_changes
            .increased
            .iter()
            .any(|c| c.category == "Groceries" && c.change == 350.0));

        let no_deductible = generate(&sample(), &SummaryInputs::default());
        assert_eq!(no_deductible.yearly_summary[0].tax_deductible_total, None);
    }

    #[test]
    fn test_daily_spending_and_categories_list() {
        let s = generate(&sample(), &inputs());
        let day = s
            .daily_spending
            .iter()
            .find(|d| d.date == "2024-02-04")
            .unwrap();
        assert_eq!(day.spending, 40.0);
        assert_eq!(day.by_category.len(), 1);
        assert_eq!(s.daily_spending[0].date, "2023-12-05");
        assert_eq!(
            s.categories_list,
            vec!["Income", "Groceries", "Entertainment", "Savings"]
        );
    }

    #[test]
    fn test_month_range_filter() {
        let inputs = inputs().with_range(Some("2024-01".into()), Some("2024-02".into()));
        let s = generate(&sample(), &inputs);
        let months: Vec<&str> = s.monthly_overview.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, vec!["2024-02", "2024-01"]);
    }

    #[test]
    fn test_partial_document_deserializes() {
        let s: Summary = serde_json::from_str(r#"{"monthlySpending":[{"month":"2024-01"}]}"#).unwrap();
        assert_eq!(s.monthly_spending[0].spending, 0.0);
        assert!(s.anomalies.outliers.is_empty());
        assert!(s.lifestyle.is_none());
    }
}
