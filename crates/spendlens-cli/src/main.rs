//! spendlens CLI - Personal finance dashboard
//!
//! Usage:
//!   spendlens run                       Ingest, categorize and summarize ./import
//!   spendlens categorize --chain rules,ai
//!   spendlens summary --currency USD    Print the yearly table
//!   spendlens serve --port 3000         Start the JSON API

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let mut settings = commands::load_settings(cli.config.as_deref(), cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Ingest(args) => {
            args.apply(&mut settings);
            commands::cmd_ingest(&settings)
        }
        Commands::Categorize(args) => {
            args.apply(&mut settings);
            commands::cmd_categorize(&settings).await
        }
        Commands::Summary(args) => {
            args.apply(&mut settings);
            commands::cmd_summary(&settings)
        }
        Commands::Run {
            ingest,
            classifiers,
            summary,
        } => {
            ingest.apply(&mut settings);
            classifiers.apply(&mut settings);
            summary.apply(&mut settings);
            commands::cmd_run(&settings).await
        }
        Commands::Serve {
            port,
            host,
            static_dir,
            no_auth,
        } => {
            if let Some(port) = port {
                settings.server.port = port;
            }
            if let Some(host) = host {
                settings.server.host = host;
            }
            if static_dir.is_some() {
                settings.server.static_dir = static_dir;
            }
            commands::cmd_serve(settings, no_auth).await
        }
        Commands::TrainKnn { k } => commands::cmd_train_knn(&settings, k).await,
        Commands::TrainNeural { epochs, seed } => {
            commands::cmd_train_neural(&settings, epochs, seed).await
        }
        Commands::Evaluate { sample, json } => commands::cmd_evaluate(&settings, sample, json).await,
        Commands::GenerateCategories => commands::cmd_generate_categories(&settings),
        Commands::Export { format, output } => {
            commands::cmd_export(&settings, &format, output.as_deref())
        }
        Commands::Reset { yes } => commands::cmd_reset(&settings, yes),
    }
}
