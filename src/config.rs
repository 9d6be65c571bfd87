//! TOML configuration.
//!
//! Everything except API keys lives in the config file. Keys are read from
//! the environment (`GEMINI_API_KEY`, `OPENAI_API_KEY`), optionally seeded
//! from a `.env` file by the CLI before the config is loaded.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Source documents, laid out `<course>/<semester>/<subject>/...`.
    pub docs_dir: PathBuf,
    /// Chunk stores and indexes, laid out `<course>/<semester>/`.
    pub index_dir: PathBuf,
    #[serde(default = "default_chunks_path")]
    pub default_chunks: PathBuf,
    #[serde(default = "default_index_path")]
    pub default_index: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_chunks_path() -> PathBuf {
    PathBuf::from("output/chunks.jsonl")
}
fn default_index_path() -> PathBuf {
    PathBuf::from("output/vectors.index")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string(), "**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_words")]
    pub chunk_words: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
    /// Pages with less trimmed text than this are treated as having no usable text.
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_words: default_chunk_words(),
            overlap_words: default_overlap_words(),
            min_text_chars: default_min_text_chars(),
        }
    }
}

fn default_chunk_words() -> usize {
    500
}
fn default_overlap_words() -> usize {
    50
}
fn default_min_text_chars() -> usize {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    /// Number of vectors buffered before they are added to the index.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Upper bound on embedding calls per second during ingestion. `0` disables throttling.
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
    /// Sleep used for a rate-limited call when the provider gives no retry hint.
    #[serde(default = "default_retry_secs")]
    pub default_retry_secs: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            requests_per_second: default_requests_per_second(),
            default_retry_secs: default_retry_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    10
}
fn default_requests_per_second() -> f64 {
    1.4
}
fn default_retry_secs() -> f64 {
    12.0
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
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Let the model ground answers with a web search tool when the provider has one.
    #[serde(default = "default_web_search")]
    pub web_search: bool,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_llm_model(),
            url: None,
            web_search: default_web_search(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_model() -> String {
    "gemini-3-flash-preview".to_string()
}
fn default_web_search() -> bool {
    true
}
fn default_llm_timeout_secs() -> u64 {
    60
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Config {
    /// Resolve a path from the config relative to `index_dir` unless it is absolute.
    pub fn index_relative(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.corpus.index_dir.join(path)
        }
    }
}

const MIN_REQUESTS_PER_SECOND: f64 = 1.0 / 86_400.0;
const MAX_DEFAULT_RETRY_SECS: f64 = 3600.0;

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_words == 0 {
        anyhow::bail!("chunking.chunk_words must be > 0");
    }
    if config.chunking.overlap_words >= config.chunking.chunk_words {
        anyhow::bail!(
            "chunking.overlap_words ({}) must be smaller than chunking.chunk_words ({})",
            config.chunking.overlap_words,
            config.chunking.chunk_words
        );
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "gemini" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, gemini, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.model.is_none() {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0 when set");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    let rps = config.embedding.requests_per_second;
    if !rps.is_finite() || rps < 0.0 {
        anyhow::bail!("embedding.requests_per_second must be a finite number >= 0");
    }
    if rps > 0.0 && rps < MIN_REQUESTS_PER_SECOND {
        anyhow::bail!(
            "embedding.requests_per_second must be 0 (unthrottled) or at least {} (one call per day)",
            MIN_REQUESTS_PER_SECOND
        );
    }
    let retry_secs = config.embedding.default_retry_secs;
    if !retry_secs.is_finite() || !(0.0..=MAX_DEFAULT_RETRY_SECS).contains(&retry_secs) {
        anyhow::bail!(
            "embedding.default_retry_secs must be between 0 and {}",
            MAX_DEFAULT_RETRY_SECS
        );
    }

    // Validate llm
    match config.llm.provider.as_str() {
        "disabled" | "gemini" | "openai" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, gemini, or openai.",
            other
        ),
    }

    Ok(config)
}
