//! Configuration parsing and validation.
//!
//! mnemo is configured via a TOML file (default: `config/mnemo.toml`).
//! Every section except `[db]` is optional and falls back to defaults.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/mnemo.sqlite"
//!
//! [retrieval]
//! relevance_threshold = 0.55
//! final_limit = 20
//!
//! [backlinks]
//! context_budget = 200
//! context_window = 80
//!
//! [embedding]
//! provider = "hash"
//! dims = 256
//!
//! [sync]
//! provider = "directory"
//! root = "./remote"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use mnemo_core::backlinks::BacklinkParams;
use mnemo_core::search::SearchParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub backlinks: BacklinksConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_keyword_base_score")]
    pub keyword_base_score: f64,
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
    #[serde(default = "default_min_semantic_query_chars")]
    pub min_semantic_query_chars: usize,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    #[serde(default = "default_fallback_limit")]
    pub fallback_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            keyword_base_score: default_keyword_base_score(),
            relevance_threshold: default_relevance_threshold(),
            min_semantic_query_chars: default_min_semantic_query_chars(),
            final_limit: default_final_limit(),
            fallback_limit: default_fallback_limit(),
        }
    }
}

fn default_keyword_base_score() -> f64 {
    0.5
}
fn default_relevance_threshold() -> f64 {
    0.55
}
fn default_min_semantic_query_chars() -> usize {
    3
}
fn default_final_limit() -> usize {
    20
}
fn default_fallback_limit() -> usize {
    10
}

impl RetrievalConfig {
    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            keyword_base_score: self.keyword_base_score,
            relevance_threshold: self.relevance_threshold,
            min_semantic_query_chars: self.min_semantic_query_chars,
            final_limit: self.final_limit,
            fallback_limit: self.fallback_limit,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BacklinksConfig {
    #[serde(default = "default_context_budget")]
    pub context_budget: usize,
    #[serde(default = "default_context_window")]
    pub context_window: usize,
}

impl Default for BacklinksConfig {
    fn default() -> Self {
        Self {
            context_budget: default_context_budget(),
            context_window: default_context_window(),
        }
    }
}

fn default_context_budget() -> usize {
    200
}
fn default_context_window() -> usize {
    80
}

impl BacklinksConfig {
    pub fn params(&self) -> BacklinkParams {
        BacklinkParams {
            context_budget: self.context_budget,
            context_window: self.context_window,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (ollama: `http://localhost:11434`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Root directory of the `directory` remote.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Key of the stored change-feed cursor. Defaults to the provider name.
    #[serde(default)]
    pub name: Option<String>,
    /// Force demo/offline mode: in-memory store, sync bypassed.
    #[serde(default)]
    pub demo: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            root: None,
            name: None,
            demo: false,
        }
    }
}

impl SyncConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn cursor_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.provider)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Retrieval
    if config.retrieval.final_limit < 1 {
        bail!("retrieval.final_limit must be >= 1");
    }
    // NaN fails the range check too.
    if !(-1.0..=1.0).contains(&config.retrieval.relevance_threshold) {
        bail!("retrieval.relevance_threshold must be in [-1.0, 1.0]");
    }
    let base = config.retrieval.keyword_base_score;
    if !base.is_finite() || base <= 0.0 {
        bail!("retrieval.keyword_base_score must be a finite number > 0");
    }

    // Backlinks
    if config.backlinks.context_window == 0 {
        bail!("backlinks.context_window must be > 0");
    }
    if config.backlinks.context_budget < config.backlinks.context_window {
        bail!("backlinks.context_budget must be >= backlinks.context_window");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "hash" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.provider != "hash" && config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    // Sync
    match config.sync.provider.as_str() {
        "disabled" => {}
        "directory" => {
            if config.sync.root.is_none() {
                bail!("sync.root must be specified when provider is 'directory'");
            }
        }
        other => bail!(
            "Unknown sync provider: '{}'. Must be disabled or directory.",
            other
        ),
    }

    Ok(())
}
