//! Pipeline commands: ingest, categorize, summary and run

use anyhow::{Context, Result};
use spendlens_core::classify::{CategorizeReport, ChainSelection};
use spendlens_core::currency::{format_amount, format_month};
use spendlens_core::pipeline::{self, run_categorize, run_ingest, run_summary};
use spendlens_core::{IngestReport, Settings, Summary};

use super::open_store;

pub fn cmd_ingest(settings: &Settings) -> Result<()> {
    println!("📥 Ingesting from {}...", settings.import_dir.display());

    let store = open_store(settings);
    let report = run_ingest(&store, settings).context("Ingest failed")?;
    print_ingest(&report);
    Ok(())
}

pub async fn cmd_categorize(settings: &Settings) -> Result<()> {
    let selection = ChainSelection::resolve(&settings.classifiers, None)?;
    println!("🏷️  Categorizing with {}...", selection);

    let store = open_store(settings);
    let report = run_categorize(&store, settings, &selection)
        .await
        .context("Categorization failed")?;
    print_categorize(&report);
    Ok(())
}

pub fn cmd_summary(settings: &Settings) -> Result<()> {
    println!("📊 Building summary...");

    let store = open_store(settings);
    let summary = run_summary(&store, settings)?;
    print_summary(&summary, &settings.currency);
    Ok(())
}

/// Ingest, categorize with the importer's default classifier unless one is
/// chosen, then summarize
pub async fn cmd_run(settings: &Settings) -> Result<()> {
    println!("🚀 Processing {}...", settings.import_dir.display());

    let store = open_store(settings);
    let report = pipeline::process_imports(&store, settings).await?;

    print_ingest(&report.ingest);
    println!();
    println!("🏷️  Classifier: {}", report.chain);
    print_categorize(&report.categorize);
    println!();
    print_summary(&store.load_summary(), &settings.currency);
    Ok(())
}

fn print_ingest(report: &IngestReport) {
    if report.files.is_empty() {
        println!("   No files to import");
    }
    for file in &report.files {
        println!("   {} ({}): {} rows", file.name, file.format, file.rows);
    }
    for name in &report.skipped_files {
        println!("   ⚠️  Skipped {} (unrecognized format)", name);
    }
    println!(
        "   New: {}, already stored: {}, duplicates: {}, invalid dates: {}",
        report.new_rows, report.existing_rows, report.duplicates, report.invalid_dates
    );
    if !report.excluded_months.is_empty() {
        println!(
            "   Dropped low-coverage months: {}",
            report.excluded_months.join(", ")
        );
    }
    println!("✅ {} transactions stored", report.total);
}

fn print_categorize(report: &CategorizeReport) {
    for stage in &report.stages {
        if stage.failed {
            println!("   ⚠️  {}: failed, skipped", stage.classifier);
        } else {
            println!("   {}: {} assigned", stage.classifier, stage.assigned);
        }
    }
    if report.fallback > 0 {
        println!("   Unresolved (other): {}", report.fallback);
    }
    println!("✅ Categorized {} transactions", report.total);
}

fn print_summary(summary: &Summary, currency: &str) {
    if summary.yearly_summary.is_empty() {
        println!("   No transactions to summarize");
        return;
    }

    println!(
        "{:<6} {:>14} {:>14} {:>14} {:>8}",
        "YEAR", "INCOME", "EXPENSES", "NET", "SAVED"
    );
    println!("{}", "-".repeat(60));
    for year in &summary.yearly_summary {
        println!(
            "{:<6} {:>14} {:>14} {:>14} {:>7.1}%",
            year.year,
            format_amount(year.total_income, currency),
            format_amount(year.total_expenses, currency),
            format_amount(year.net_cash_flow, currency),
            year.savings_rate
        );
    }

    // monthly_overview is newest first
    if let Some(latest) = summary.monthly_overview.first() {
        println!();
        println!(
            "   Latest month {}: spent {}, net {}",
            format_month(&latest.month),
            format_amount(latest.total_expenses, currency),
            format_amount(latest.net_cash_flow, currency)
        );
    }
    println!(
        "✅ {} months summarized",
        summary.monthly_overview.len()
    );
}
