use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{LongmemError, Result};

/// Messages ≥ this count in the short-term buffer trigger extraction.
pub const DEFAULT_EXTRACTION_TRIGGER_MESSAGES: usize = 10;
/// Fixed offset applied to disambiguate messages sharing one session marker.
pub const DEFAULT_NORMALIZER_OFFSET_MS: i64 = 500;
/// Consolidation phase 1 candidate pool size before truncation.
pub const DEFAULT_TOP_K: usize = 20;
/// Consolidation phase 1 queue length kept per record.
pub const DEFAULT_KEEP_TOP_N: usize = 10;
/// Consolidation phase 2 minimum cosine similarity to trigger a decision.
pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.9;
/// Default embedding dimension when the provider config does not override it.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;
/// Default max_tokens sent on chat-completion requests.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// How the extractor filters buffered messages by role before rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleFilter {
    UserOnly,
    AssistantOnly,
    Hybrid,
}

impl Default for RoleFilter {
    fn default() -> Self {
        Self::Hybrid
    }
}

/// Retrieval strategy. Only `Embedding` is implemented by the core; the
/// other variants are accepted for forward config compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrieveStrategy {
    Embedding,
    Context,
    Hybrid,
}

impl Default for RetrieveStrategy {
    fn default() -> Self {
        Self::Embedding
    }
}

/// Whether consolidation runs inline with ingestion or as a separate batch.
/// The core only implements the offline path; `Online` is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    Online,
    Offline,
}

impl Default for UpdateMode {
    fn default() -> Self {
        Self::Offline
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    pub api_key: String,
    #[serde(default = "default_embedder_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedder_model")]
    pub model: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Top-level engine configuration (longmem.toml + LONGMEM_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub messages_use: RoleFilter,
    #[serde(default = "bool_true")]
    pub metadata_generate: bool,
    #[serde(default)]
    pub text_summary: bool,
    pub llm: LlmConfig,
    pub embedder: EmbedderConfig,
    #[serde(default)]
    pub retrieve_strategy: RetrieveStrategy,
    #[serde(default)]
    pub update: UpdateMode,
    #[serde(default)]
    pub store: StoreConfig,
    pub log_level: Option<String>,
}

fn bool_true() -> bool {
    true
}
fn default_llm_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}
fn default_embedder_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_embedder_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dimensions() -> usize {
    DEFAULT_EMBEDDING_DIMENSIONS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.longmem/longmem.db")
}

impl EngineConfig {
    /// Load config from a TOML file with `LONGMEM_*` env var overrides.
    ///
    /// Checks, in order: the explicit path argument, then
    /// `~/.longmem/longmem.toml`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: EngineConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("LONGMEM_").split("_"))
            .extract()
            .map_err(|e| LongmemError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.longmem/longmem.toml")
}
