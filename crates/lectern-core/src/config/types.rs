use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Claude,
    Ollama,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Ollama => "ollama",
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_embedding_model() -> String {
    "all-minilm".into()
}

fn default_max_tokens() -> u32 {
    800
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    /// Ollama endpoint; embeddings always come from here.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider() -> ProviderKind {
    ProviderKind::Claude
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            embedding_model: default_embedding_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}

fn default_chunk_overlap() -> usize {
    100
}

/// Sizes are counted in characters of lesson text.
#[derive(Debug, Deserialize, Serialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Memory,
    Qdrant,
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

fn default_max_results() -> usize {
    5
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Reject course-name matches farther than this cosine distance. Unset
    /// means the closest course always matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_match_max_distance: Option<f32>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            qdrant_url: default_qdrant_url(),
            max_results: default_max_results(),
            course_match_max_distance: None,
        }
    }
}

fn default_max_history() -> usize {
    2
}

fn default_max_tool_rounds() -> usize {
    1
}

fn default_max_sessions() -> usize {
    1000
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AgentConfig {
    /// Exchanges kept per conversation.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    /// Conversations kept in memory; the least recently used is dropped first.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            max_tool_rounds: default_max_tool_rounds(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_search_timeout() -> u64 {
    15
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_llm_timeout")]
    pub llm_seconds: u64,
    #[serde(default = "default_search_timeout")]
    pub search_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_seconds: default_llm_timeout(),
            search_seconds: default_search_timeout(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct IngestConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs_path: Option<PathBuf>,
}

/// Wrapper that keeps secret values out of logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    pub claude_api_key: Option<Secret>,
}
