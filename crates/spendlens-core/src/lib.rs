//! spendlens core library
//!
//! Shared functionality for the spendlens personal finance dashboard:
//! - Importers for Moneyhub/Monzo CSV, QFX and QIF bank exports
//! - Ingest with date validation, deduplication and month coverage checks
//! - Flat-file JSON data store
//! - Classifier chain: keyword rules, pass-through, KNN, neural and LLM
//! - Pluggable AI backends (OpenAI-compatible, Ollama, mock)
//! - Summary reports and the view models built on them
//! - QIF/CSV export and classifier evaluation

pub mod ai;
pub mod classify;
pub mod config;
pub mod currency;
pub mod error;
pub mod evaluate;
pub mod export;
pub mod import;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod summary;

/// Test utilities including a mock OpenAI/Ollama server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIBackend, AIClient, MockBackend, OllamaBackend, OpenAICompatibleBackend};
pub use classify::{
    build_categorizer, CategorizeReport, Categorizer, ChainSelection, Classifier, ClassifierKind,
};
pub use config::Settings;
pub use error::{Error, Result};
pub use evaluate::EvaluationResult;
pub use export::ExportFormat;
pub use import::ImportFormat;
pub use ingest::{IngestOptions, IngestReport};
pub use models::{Transaction, FALLBACK_CATEGORY};
pub use pipeline::ProcessReport;
pub use store::DataStore;
pub use summary::{Summary, SummaryInputs};
