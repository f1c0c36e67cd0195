use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lectern_index::course::CourseChunker;
use lectern_index::vector_store::VectorStore;
use lectern_index::{
    CatalogSummary, CourseResolver, CourseStore, EmbedFn, IngestOutcome, IngestReport,
    IngestionPipeline,
};
use lectern_llm::provider::LlmProvider;
use lectern_tools::{CompositeExecutor, CourseOutlineExecutor, CourseSearchExecutor, Source};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::Config;
use crate::error::RagError;
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::session::SessionStore;

pub type CourseTools = CompositeExecutor<CourseSearchExecutor, CourseOutlineExecutor>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
    pub conversation_id: String,
}

/// Ingestion, querying and stats over one course index.
pub struct RagSystem<P> {
    store: Arc<CourseStore>,
    pipeline: IngestionPipeline,
    orchestrator: Orchestrator<P, CourseTools>,
    sessions: SessionStore,
}

impl<P> std::fmt::Debug for RagSystem<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagSystem")
            .field("orchestrator", &self.orchestrator)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> RagSystem<P> {
    /// Wire the index, tools and orchestrator, creating collections if needed.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Index`] if the collections cannot be created.
    pub async fn new(
        config: &Config,
        provider: P,
        backend: Arc<dyn VectorStore>,
        embed: EmbedFn,
    ) -> Result<Self, RagError> {
        let store = Arc::new(CourseStore::new(backend, embed));
        store.ensure_collections().await?;

        let resolver = CourseResolver::new(Arc::clone(&store))
            .with_max_distance(config.index.course_match_max_distance);
        let tools = CompositeExecutor::new(
            CourseSearchExecutor::new(
                Arc::clone(&store),
                resolver.clone(),
                config.index.max_results,
            ),
            CourseOutlineExecutor::new(resolver),
        );
        let settings = OrchestratorSettings {
            max_tool_rounds: config.agent.max_tool_rounds,
            llm_timeout: Duration::from_secs(config.timeouts.llm_seconds),
            tool_timeout: Duration::from_secs(config.timeouts.search_seconds),
        };
        let pipeline = IngestionPipeline::new(
            CourseChunker::new(config.chunker_config()),
            Arc::clone(&store),
        );

        Ok(Self {
            store,
            pipeline,
            orchestrator: Orchestrator::new(provider, tools, settings),
            sessions: SessionStore::new(config.agent.max_history, config.agent.max_sessions),
        })
    }

    pub fn store(&self) -> &Arc<CourseStore> {
        &self.store
    }

    pub fn orchestrator(&self) -> &Orchestrator<P, CourseTools> {
        &self.orchestrator
    }

    pub fn create_session(&self) -> String {
        self.sessions.create_session()
    }

    /// Forget a conversation's history.
    pub fn end_session(&self, conversation_id: &str) {
        self.sessions.clear(conversation_id);
    }

    /// # Errors
    ///
    /// Returns [`RagError::Document`] for malformed documents or index failures.
    pub async fn ingest_text(&self, text: &str) -> Result<IngestOutcome, RagError> {
        Ok(self.pipeline.ingest_text(text).await?)
    }

    /// # Errors
    ///
    /// Returns [`RagError::Document`] if the file cannot be loaded or indexed.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestOutcome, RagError> {
        Ok(self.pipeline.ingest_file(path).await?)
    }

    /// Ingest every supported document in `folder`. Per-file failures are
    /// collected in the report.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Document`] if the folder cannot be read or the
    /// index cannot be cleared.
    pub async fn ingest_folder(
        &self,
        folder: &Path,
        clear_existing: bool,
    ) -> Result<IngestReport, RagError> {
        Ok(self.pipeline.ingest_folder(folder, clear_existing).await?)
    }

    /// Answer `query` within a conversation. A fresh conversation is started
    /// when `conversation_id` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Query`] when the model call fails or times out.
    pub async fn submit_query(
        &self,
        query: &str,
        conversation_id: Option<&str>,
    ) -> Result<QueryAnswer, RagError> {
        self.submit_query_with_cancel(query, conversation_id, &CancellationToken::new())
            .await
    }

    /// Like [`Self::submit_query`], aborting with
    /// [`crate::OrchestratorError::Cancelled`] once `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Query`] when the model call fails, times out or is
    /// cancelled.
    pub async fn submit_query_with_cancel(
        &self,
        query: &str,
        conversation_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<QueryAnswer, RagError> {
        let conversation_id = match conversation_id {
            Some(id) => id.to_owned(),
            None => self.sessions.create_session(),
        };
        let history = self.sessions.history(&conversation_id);
        let prompt = format!("Answer this question about course materials: {query}");

        let outcome = self
            .orchestrator
            .run_turn(&prompt, history.as_deref(), cancel)
            .instrument(tracing::info_span!("query", conversation = %conversation_id))
            .await?;

        self.sessions
            .add_exchange(&conversation_id, query, &outcome.answer);
        tracing::info!(
            conversation = %conversation_id,
            tool_rounds = outcome.tool_rounds,
            sources = outcome.sources.len(),
            "query answered"
        );
        Ok(QueryAnswer {
            answer: outcome.answer,
            sources: outcome.sources,
            conversation_id,
        })
    }

    /// # Errors
    ///
    /// Returns [`RagError::Index`] if the catalog cannot be read.
    pub async fn catalog_summary(&self) -> Result<CatalogSummary, RagError> {
        Ok(self.store.catalog_summary().await?)
    }
}
