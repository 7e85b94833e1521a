//! Shared utilities and data directory maintenance

use std::path::Path;

use anyhow::{Context, Result};
use spendlens_core::{DataStore, Settings};

/// Resolve settings from the embedded defaults, config file and environment
pub fn load_settings(config: Option<&Path>, data_dir: Option<&Path>) -> Result<Settings> {
    Settings::load_with(config, data_dir, |key| std::env::var(key).ok())
        .context("Failed to load settings")
}

pub fn open_store(settings: &Settings) -> DataStore {
    DataStore::new(&settings.data_dir)
}

pub fn cmd_reset(settings: &Settings, yes: bool) -> Result<()> {
    let store = open_store(settings);
    if !yes {
        println!(
            "⚠️  This deletes everything in {}",
            store.root().display()
        );
        println!("   Re-run with --yes to confirm.");
        return Ok(());
    }

    store.reset().context("Failed to reset data directory")?;
    store.seed_defaults().context("Failed to seed defaults")?;
    println!("✅ Data directory reset: {}", store.root().display());
    Ok(())
}
