//! Export command implementation

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use spendlens_core::{ExportFormat, Settings};

use super::open_store;

pub fn cmd_export(settings: &Settings, format: &str, output: Option<&Path>) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let store = open_store(settings);
    let txs = store
        .load_categorized()?
        .context("No categorized transactions found (run categorize first)")?;

    let content = format.render(&txs)?;

    match output {
        Some(path) => {
            fs::write(path, &content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "✅ Exported {} transactions to {} ({})",
                txs.len(),
                path.display(),
                format
            );
        }
        None => println!("{}", content),
    }

    Ok(())
}
