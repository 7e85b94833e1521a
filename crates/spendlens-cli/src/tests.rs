//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::fs;

use clap::Parser;
use spendlens_core::{DataStore, Settings};
use tempfile::TempDir;

use crate::cli::{Cli, ClassifierArgs, Commands, IngestArgs, SummaryArgs};
use crate::commands;

fn test_settings(dir: &TempDir) -> Settings {
    let mut settings = Settings::defaults().unwrap();
    settings.data_dir = dir.path().join("data");
    settings.import_dir = dir.path().join("import");
    settings.ingest.coverage_threshold = 0.0;
    settings.ai = Default::default();
    settings
}

fn write_moneyhub(settings: &Settings) {
    fs::create_dir_all(&settings.import_dir).unwrap();
    fs::write(
        settings.import_dir.join("export.csv"),
        "DATE,DESCRIPTION,AMOUNT,CATEGORY\n\
         2024-01-02,TESCO STORES,-25.50,Groceries\n\
         2024-01-03,TFL TRAVEL,-3.10,Transport\n\
         2024-01-28,ACME PAYROLL,2000.00,Income\n",
    )
    .unwrap();
}

// ========== Argument parsing ==========

#[test]
fn test_parse_global_flags() {
    let cli = Cli::try_parse_from([
        "spendlens",
        "summary",
        "--data-dir",
        "/tmp/data",
        "-v",
        "--currency",
        "usd",
    ])
    .unwrap();
    assert!(cli.verbose);
    assert_eq!(cli.data_dir.as_deref(), Some(std::path::Path::new("/tmp/data")));
    match cli.command {
        Commands::Summary(args) => assert_eq!(args.currency.as_deref(), Some("usd")),
        _ => panic!("expected summary"),
    }
}

#[test]
fn test_parse_run_flattens_args() {
    let cli = Cli::try_parse_from([
        "spendlens",
        "run",
        "--format",
        "qif",
        "--rules",
        "--start-month",
        "2024-01",
    ])
    .unwrap();
    match cli.command {
        Commands::Run {
            ingest,
            classifiers,
            summary,
        } => {
            assert_eq!(ingest.format.as_deref(), Some("qif"));
            assert!(classifiers.rules);
            assert_eq!(summary.start_month.as_deref(), Some("2024-01"));
        }
        _ => panic!("expected run"),
    }
}

#[test]
fn test_parse_export_defaults_to_qif() {
    let cli = Cli::try_parse_from(["spendlens", "export"]).unwrap();
    match cli.command {
        Commands::Export { format, output } => {
            assert_eq!(format, "qif");
            assert!(output.is_none());
        }
        _ => panic!("expected export"),
    }
}

#[test]
fn test_unknown_subcommand_fails() {
    assert!(Cli::try_parse_from(["spendlens", "detect"]).is_err());
}

// ========== Settings overrides ==========

#[test]
fn test_classifier_args_override_settings() {
    let dir = TempDir::new().unwrap();
    let mut settings = test_settings(&dir);
    settings.classifiers.chain = vec!["knn".into()];

    let args = ClassifierArgs {
        ai: true,
        ..Default::default()
    };
    args.apply(&mut settings);
    assert!(settings.classifiers.chain.is_empty());
    assert!(settings.classifiers.use_ai);

    let args = ClassifierArgs {
        rules: true,
        chain: Some("rules, ai,".into()),
        ..Default::default()
    };
    args.apply(&mut settings);
    assert_eq!(settings.classifiers.chain, vec!["rules", "ai"]);
}

#[test]
fn test_ingest_and_summary_args() {
    let dir = TempDir::new().unwrap();
    let mut settings = test_settings(&dir);

    IngestArgs {
        import_dir: Some(dir.path().join("elsewhere")),
        coverage: Some(0.5),
        keep_files: true,
        ..Default::default()
    }
    .apply(&mut settings);
    assert_eq!(settings.import_dir, dir.path().join("elsewhere"));
    assert_eq!(settings.ingest.coverage_threshold, 0.5);
    assert!(settings.ingest.keep_files);

    SummaryArgs {
        currency: Some(" eur ".into()),
        ..Default::default()
    }
    .apply(&mut settings);
    assert_eq!(settings.currency, "EUR");
}

#[test]
fn test_load_settings_with_data_dir() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    let settings = commands::load_settings(None, Some(&data)).unwrap();
    assert_eq!(settings.data_dir, data);
}

#[test]
fn test_load_settings_missing_config_fails() {
    let dir = TempDir::new().unwrap();
    let result = commands::load_settings(Some(&dir.path().join("nope.toml")), None);
    assert!(result.is_err());
}

// ========== Commands ==========

#[tokio::test]
async fn test_cmd_run_end_to_end() {
    let dir = TempDir::new().unwrap();
    let settings = test_settings(&dir);
    write_moneyhub(&settings);

    commands::cmd_run(&settings).await.unwrap();

    let store = DataStore::new(&settings.data_dir);
    let categorized = store.load_categorized().unwrap().unwrap();
    assert_eq!(categorized.len(), 3);
    assert_eq!(store.load_summary().yearly_summary[0].year, "2024");
}

#[tokio::test]
async fn test_cmd_ingest_then_categorize_and_summary() {
    let dir = TempDir::new().unwrap();
    let mut settings = test_settings(&dir);
    write_moneyhub(&settings);

    commands::cmd_ingest(&settings).unwrap();
    let store = DataStore::new(&settings.data_dir);
    assert_eq!(store.load_transactions().unwrap().len(), 3);

    // summary before categorize has nothing to read
    assert!(commands::cmd_summary(&settings).is_err());

    settings.classifiers.use_pass = true;
    commands::cmd_categorize(&settings).await.unwrap();
    commands::cmd_summary(&settings).unwrap();

    let tesco = store
        .load_categorized()
        .unwrap()
        .unwrap()
        .into_iter()
        .find(|t| t.description == "TESCO STORES")
        .unwrap();
    assert_eq!(tesco.category.as_deref(), Some("Groceries"));
}

#[tokio::test]
async fn test_cmd_export_to_file() {
    let dir = TempDir::new().unwrap();
    let settings = test_settings(&dir);
    write_moneyhub(&settings);
    commands::cmd_run(&settings).await.unwrap();

    let out = dir.path().join("out.csv");
    commands::cmd_export(&settings, "csv", Some(&out)).unwrap();
    let content = fs::read_to_string(&out).unwrap();
    assert!(content.starts_with("date,amount,description"));
    assert_eq!(content.lines().count(), 4);

    assert!(commands::cmd_export(&settings, "ofx", Some(&out)).is_err());
}

#[test]
fn test_cmd_export_without_data_fails() {
    let dir = TempDir::new().unwrap();
    let settings = test_settings(&dir);
    assert!(commands::cmd_export(&settings, "qif", None).is_err());
}

#[tokio::test]
async fn test_cmd_generate_categories() {
    let dir = TempDir::new().unwrap();
    let settings = test_settings(&dir);
    write_moneyhub(&settings);
    commands::cmd_run(&settings).await.unwrap();

    commands::cmd_generate_categories(&settings).unwrap();
    let categories = DataStore::new(&settings.data_dir).load_categories();
    assert_eq!(categories.get("Transport"), Some(&["Transport".to_string()][..]));
}

#[tokio::test]
async fn test_cmd_train_knn_and_evaluate() {
    let dir = TempDir::new().unwrap();
    let mut settings = test_settings(&dir);
    settings.classifiers.hashing_dim = 32;
    write_moneyhub(&settings);
    commands::cmd_run(&settings).await.unwrap();

    commands::cmd_train_knn(&settings, Some(1)).await.unwrap();
    assert!(DataStore::new(&settings.data_dir).knn_dir().exists());

    commands::cmd_evaluate(&settings, 10, false).await.unwrap();
    commands::cmd_evaluate(&settings, 10, true).await.unwrap();
}

#[test]
fn test_cmd_reset_requires_confirmation() {
    let dir = TempDir::new().unwrap();
    let settings = test_settings(&dir);
    let store = DataStore::new(&settings.data_dir);
    store.save_transactions(&[]).unwrap();

    commands::cmd_reset(&settings, false).unwrap();
    assert!(store.path("transactions.json").exists());

    commands::cmd_reset(&settings, true).unwrap();
    assert!(!store.path("transactions.json").exists());
    assert!(!store.load_categories().is_empty());
}
