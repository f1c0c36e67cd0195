//! Provider and backend construction from [`Config`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use lectern_index::EmbedFn;
use lectern_index::in_memory_store::InMemoryVectorStore;
use lectern_index::qdrant_ops::QdrantOps;
use lectern_index::vector_store::VectorStore;
use lectern_llm::LlmProvider;
use lectern_llm::any::AnyProvider;
use lectern_llm::claude::ClaudeProvider;
use lectern_llm::ollama::OllamaProvider;

use crate::config::{Config, IndexBackend, ProviderKind};
use crate::rag::RagSystem;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Explicit path, then `LECTERN_CONFIG`, then `config/default.toml`.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("LECTERN_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// # Errors
///
/// Returns an error if the Claude provider is selected without an API key.
pub fn create_chat_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    match config.llm.provider {
        ProviderKind::Claude => {
            let api_key = config
                .secrets
                .claude_api_key
                .as_ref()
                .context("LECTERN_CLAUDE_API_KEY (or ANTHROPIC_API_KEY) is required for the claude provider")?;
            Ok(AnyProvider::Claude(ClaudeProvider::new(
                api_key.expose().to_owned(),
                config.llm.model.clone(),
                config.llm.max_tokens,
            )))
        }
        ProviderKind::Ollama => Ok(AnyProvider::Ollama(ollama_provider(config))),
    }
}

/// Embeddings always come from Ollama; Claude has no embedding endpoint.
#[must_use]
pub fn create_embedding_provider(config: &Config) -> AnyProvider {
    AnyProvider::Ollama(ollama_provider(config))
}

fn ollama_provider(config: &Config) -> OllamaProvider {
    OllamaProvider::new(
        &config.llm.base_url,
        config.llm.model.clone(),
        config.llm.embedding_model.clone(),
    )
}

/// # Errors
///
/// Returns an error if the Qdrant client cannot be created.
pub fn create_vector_backend(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    match config.index.backend {
        IndexBackend::Memory => Ok(Arc::new(InMemoryVectorStore::new())),
        IndexBackend::Qdrant => {
            let ops = QdrantOps::new(&config.index.qdrant_url).with_context(|| {
                format!("failed to create qdrant client for {}", config.index.qdrant_url)
            })?;
            tracing::info!(url = %config.index.qdrant_url, "using qdrant index backend");
            Ok(Arc::new(ops))
        }
    }
}

pub async fn health_check(provider: &AnyProvider) {
    if let AnyProvider::Ollama(ollama) = provider {
        match ollama.health_check().await {
            Ok(()) => tracing::info!("ollama health check passed"),
            Err(e) => tracing::warn!("ollama health check failed: {e:#}"),
        }
    }
}

/// Build the full system from configuration: chat provider, Ollama
/// embeddings and the configured index backend.
///
/// # Errors
///
/// Returns an error if a provider or backend cannot be created or the index
/// collections cannot be initialised.
pub async fn build_rag_system(config: &Config) -> anyhow::Result<RagSystem<AnyProvider>> {
    let chat = create_chat_provider(config)?;
    if !chat.supports_tool_use() {
        tracing::warn!(
            provider = chat.name(),
            "provider has no tool use; answers will not be grounded in course content"
        );
    }
    let embedder = create_embedding_provider(config);
    health_check(&embedder).await;

    let embed: EmbedFn = Arc::new(embedder.embed_fn());
    let backend = create_vector_backend(config)?;
    RagSystem::new(config, chat, backend, embed)
        .await
        .context("failed to initialise course index")
}
