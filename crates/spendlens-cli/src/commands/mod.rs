//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `data` - Settings loading and data directory reset
//! - `export` - QIF/CSV export
//! - `pipeline` - Ingest, categorize, summary and the combined run
//! - `serve` - Web server command
//! - `training` - Model training, evaluation and category generation

pub mod data;
pub mod export;
pub mod pipeline;
pub mod serve;
pub mod training;

// Re-export command functions for main.rs
pub use data::*;
pub use export::*;
pub use pipeline::*;
pub use serve::*;
pub use training::*;
