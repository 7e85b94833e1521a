//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use spendlens_core::Settings;

/// spendlens - See where the money goes
#[derive(Parser)]
#[command(name = "spendlens")]
#[command(about = "Self-hosted personal finance dashboard", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides config and DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Config file (default: <data_dir>/config.toml, then ~/.config/spendlens/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse bank exports in the import directory into transactions.json
    Ingest(IngestArgs),

    /// Assign categories to ingested transactions
    Categorize(ClassifierArgs),

    /// Build summary.json and print the yearly table
    Summary(SummaryArgs),

    /// Ingest, categorize and summarize in one go
    Run {
        #[command(flatten)]
        ingest: IngestArgs,

        #[command(flatten)]
        classifiers: ClassifierArgs,

        #[command(flatten)]
        summary: SummaryArgs,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Directory of static frontend files
        #[arg(long)]
        static_dir: Option<PathBuf>,

        /// Disable Basic authentication even when credentials are configured
        #[arg(long)]
        no_auth: bool,
    },

    /// Train the nearest-neighbour classifier on categorized transactions
    TrainKnn {
        /// Neighbours to vote (default: KNN_K)
        #[arg(short)]
        k: Option<usize>,
    },

    /// Train the neural classifier on categorized transactions
    TrainNeural {
        /// Training epochs
        #[arg(long)]
        epochs: Option<usize>,

        /// Seed for shuffling and weight init
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Score each available classifier against the bank categories
    Evaluate {
        /// Transactions to evaluate on
        #[arg(long, default_value = "100")]
        sample: usize,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Derive categories.json from the categorized transactions
    GenerateCategories,

    /// Export categorized transactions
    Export {
        /// Output format: qif, csv
        #[arg(short, long, default_value = "qif")]
        format: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete everything in the data directory
    Reset {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug, Default)]
pub struct IngestArgs {
    /// Directory of bank exports (default: IMPORT_DIR or ./import)
    #[arg(long)]
    pub import_dir: Option<PathBuf>,

    /// Force an importer: moneyhub, monzo, qfx, qif (auto-detected if not specified)
    #[arg(long)]
    pub format: Option<String>,

    /// Minimum fraction of days a month must cover to be kept
    #[arg(long)]
    pub coverage: Option<f64>,

    /// Leave parsed files in the import directory
    #[arg(long)]
    pub keep_files: bool,
}

impl IngestArgs {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(dir) = &self.import_dir {
            settings.import_dir = dir.clone();
        }
        if let Some(format) = &self.format {
            settings.ingest.format = Some(format.clone());
        }
        if let Some(coverage) = self.coverage {
            settings.ingest.coverage_threshold = coverage;
        }
        if self.keep_files {
            settings.ingest.keep_files = true;
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct ClassifierArgs {
    /// Keyword rules from categories.json
    #[arg(long)]
    pub rules: bool,

    /// Keep the bank's own category
    #[arg(long)]
    pub pass: bool,

    /// Closest category name by embedding (no training needed)
    #[arg(long)]
    pub emb: bool,

    /// Neural classifier (needs train-neural)
    #[arg(long)]
    pub neural: bool,

    /// Ask the configured LLM
    #[arg(long)]
    pub ai: bool,

    /// Comma-separated chain, e.g. rules,emb,knn,ai (wins over single flags)
    #[arg(long)]
    pub chain: Option<String>,
}

impl ClassifierArgs {
    fn any_flag(&self) -> bool {
        self.rules || self.pass || self.emb || self.neural || self.ai
    }

    /// Command-line choices replace the configured ones
    pub fn apply(&self, settings: &mut Settings) {
        let c = &mut settings.classifiers;
        if let Some(chain) = &self.chain {
            c.chain = chain
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        } else if self.any_flag() {
            c.chain.clear();
            c.use_rules = self.rules;
            c.use_pass = self.pass;
            c.use_embeddings = self.emb;
            c.use_neural = self.neural;
            c.use_ai = self.ai;
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct SummaryArgs {
    /// First month to include (YYYY-MM)
    #[arg(long)]
    pub start_month: Option<String>,

    /// Last month to include (YYYY-MM)
    #[arg(long)]
    pub end_month: Option<String>,

    /// Display currency, e.g. USD (default: DEFAULT_CURRENCY or GBP)
    #[arg(long)]
    pub currency: Option<String>,
}

impl SummaryArgs {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(start) = &self.start_month {
            settings.summary.start_month = Some(start.clone());
        }
        if let Some(end) = &self.end_month {
            settings.summary.end_month = Some(end.clone());
        }
        if let Some(currency) = &self.currency {
            settings.currency = currency.trim().to_uppercase();
        }
    }
}
