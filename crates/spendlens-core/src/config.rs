//! Layered settings
//!
//! Resolution order, later layers winning:
//! 1. Embedded defaults (`config/default.toml`, compiled into the binary)
//! 2. One override file: `--config`, else `<data_dir>/config.toml`, else
//!    `~/.config/spendlens/config.toml`
//! 3. Environment variables

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub import_dir: PathBuf,
    /// ISO 4217 code used for display
    pub currency: String,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub ingest: IngestSettings,
    #[serde(default)]
    pub classifiers: ClassifierSettings,
    #[serde(default)]
    pub summary: SummarySettings,
    #[serde(default)]
    pub ai: AiSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub static_dir: Option<PathBuf>,
    /// CORS origins allowed to call the API (empty = same-origin only)
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub coverage_threshold: f64,
    /// Force one importer instead of detecting per file
    pub format: Option<String>,
    pub keep_files: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub use_rules: bool,
    pub use_pass: bool,
    pub use_embeddings: bool,
    pub use_neural: bool,
    pub use_ai: bool,
    pub chain: Vec<String>,
    pub ai_concurrency: usize,
    pub embed_batch_size: usize,
    pub knn_k: usize,
    pub embedder: String,
    pub hashing_dim: usize,
}

impl ClassifierSettings {
    /// True when any single-classifier flag was set
    pub fn any_flag(&self) -> bool {
        self.use_rules || self.use_pass || self.use_embeddings || self.use_neural || self.use_ai
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    pub start_month: Option<String>,
    pub end_month: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    /// `openai`, `ollama` or `mock`; inferred from the keys below when unset
    pub backend: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_embedding_model: String,
    pub ollama_host: Option<String>,
    pub ollama_model: String,
    pub ollama_embedding_model: String,
}

impl AiSettings {
    /// Settings read from the process environment over the embedded defaults
    pub fn from_env() -> Self {
        let mut settings = Settings::defaults()
            .map(|s| s.ai)
            .unwrap_or_default();
        settings.apply_env(|key| std::env::var(key).ok());
        settings
    }

    fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, var: F) {
        if let Some(v) = var("AI_BACKEND") {
            self.backend = Some(v.to_lowercase());
        }
        if let Some(v) = var("OPENAI_API_KEY") {
            self.openai_api_key = Some(v);
        }
        if let Some(v) = var("OPENAI_BASE_URL") {
            self.openai_base_url = v;
        }
        if let Some(v) = var("OPENAI_MODEL") {
            self.openai_model = v;
        }
        if let Some(v) = var("OPENAI_EMBEDDING_MODEL") {
            self.openai_embedding_model = v;
        }
        if let Some(v) = var("OLLAMA_HOST") {
            self.ollama_host = Some(v);
        }
        if let Some(v) = var("OLLAMA_MODEL") {
            self.ollama_model = v;
        }
        if let Some(v) = var("OLLAMA_EMBEDDING_MODEL") {
            self.ollama_embedding_model = v;
        }
    }
}

impl Settings {
    /// Embedded defaults only
    pub fn defaults() -> Result<Self> {
        parse_config(DEFAULT_CONFIG, None)
    }

    /// Load all three layers from disk and the process environment
    pub fn load(path_override: Option<&Path>) -> Result<Self> {
        Self::load_with(path_override, None, |key| std::env::var(key).ok())
    }

    /// Load with an explicit data dir (CLI `--data-dir`) and env lookup
    ///
    /// The data dir takes part in override-file discovery and wins over
    /// both the file and `DATA_DIR`.
    pub fn load_with<F>(path_override: Option<&Path>, data_dir: Option<&Path>, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir_hint = data_dir
            .map(Path::to_path_buf)
            .or_else(|| var("DATA_DIR").map(PathBuf::from));

        let overlay = match find_override(path_override, data_dir_hint.as_deref())? {
            Some(path) => {
                debug!(path = %path.display(), "Loading config override");
                Some(fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?)
            }
            None => None,
        };

        let mut settings = parse_config(DEFAULT_CONFIG, overlay.as_deref())?;
        settings.apply_env(var)?;
        if let Some(dir) = data_dir {
            settings.data_dir = dir.to_path_buf();
        }
        Ok(settings)
    }

    /// Apply environment variables over the file layers
    pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, var: F) -> Result<()> {
        if let Some(v) = var("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = var("IMPORT_DIR") {
            self.import_dir = PathBuf::from(v);
        }
        if let Some(v) = var("DEFAULT_CURRENCY") {
            self.currency = v.to_uppercase();
        }

        if let Some(v) = var("HOST") {
            self.server.host = v;
        }
        if let Some(v) = var("PORT") {
            self.server.port = parse_env("PORT", &v)?;
        }
        if let Some(v) = var("USERNAME") {
            self.server.username = Some(v);
        }
        if let Some(v) = var("PASSWORD") {
            self.server.password = Some(v);
        }
        if let Some(v) = var("STATIC_DIR") {
            self.server.static_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("ALLOWED_ORIGINS") {
            self.server.allowed_origins = v
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        if let Some(v) = var("MONTH_COVERAGE") {
            self.ingest.coverage_threshold = parse_env("MONTH_COVERAGE", &v)?;
        }
        if let Some(v) = var("INGEST_FORMAT") {
            self.ingest.format = Some(v);
        }

        let c = &mut self.classifiers;
        if let Some(v) = var("USE_RULES") {
            c.use_rules = is_true(&v);
        }
        if let Some(v) = var("USE_PASS") {
            c.use_pass = is_true(&v);
        }
        if let Some(v) = var("USE_EMBEDDINGS") {
            c.use_embeddings = is_true(&v);
        }
        if let Some(v) = var("USE_NEURAL") {
            c.use_neural = is_true(&v);
        }
        if let Some(v) = var("USE_AI") {
            c.use_ai = is_true(&v);
        }
        if let Some(v) = var("AI_CONCURRENCY") {
            c.ai_concurrency = parse_env("AI_CONCURRENCY", &v)?;
        }
        if let Some(v) = var("EMBED_BATCH_SIZE") {
            c.embed_batch_size = parse_env("EMBED_BATCH_SIZE", &v)?;
        }
        if let Some(v) = var("KNN_K") {
            c.knn_k = parse_env("KNN_K", &v)?;
        }
        if let Some(v) = var("EMBEDDER") {
            c.embedder = v.to_lowercase();
        }
        if let Some(v) = var("HASHING_DIM") {
            c.hashing_dim = parse_env("HASHING_DIM", &v)?;
        }

        if let Some(v) = var("START_MONTH") {
            self.summary.start_month = Some(v);
        }
        if let Some(v) = var("END_MONTH") {
            self.summary.end_month = Some(v);
        }

        self.ai.apply_env(&var);
        Ok(())
    }

    /// HTTP Basic credentials, only when both halves are set
    pub fn basic_auth(&self) -> Option<(String, String)> {
        match (&self.server.username, &self.server.password) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some((u.clone(), p.clone())),
            _ => None,
        }
    }
}

/// Default user-level override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("spendlens").join("config.toml"))
}

fn find_override(path_override: Option<&Path>, data_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = path_override {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }

    let data_dir = data_dir.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("./data"));
    let candidates = [Some(data_dir.join("config.toml")), default_config_path()];
    Ok(candidates.into_iter().flatten().find(|p| p.exists()))
}

/// Parse the embedded defaults with an optional overlay merged on top
fn parse_config(base: &str, overlay: Option<&str>) -> Result<Settings> {
    let mut value: toml::Value = toml::from_str(base)
        .map_err(|e| Error::Config(format!("Invalid default config: {}", e)))?;

    if let Some(overlay) = overlay {
        let overlay: toml::Value = toml::from_str(overlay)
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;
        merge(&mut value, overlay);
    }

    value
        .try_into()
        .map_err(|e| Error::Config(format!("Invalid config: {}", e)))
}

/// Deep-merge TOML tables; scalars and arrays in `overlay` replace `base`
fn merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn is_true(v: &str) -> bool {
    v.trim().eq_ignore_ascii_case("true") || v.trim() == "1"
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("Invalid value for {}: {}", key, value)))
}
