use lectern_index::IndexError;
use lectern_index::course::DocumentError;
use lectern_llm::LlmError;

/// Failure of a query turn. Tool-level problems never surface here; they are
/// handed back to the model as error tool results.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("model unavailable: {0}")]
    Model(#[from] LlmError),

    #[error("model call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("query cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error(transparent)]
    Query(#[from] OrchestratorError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Document(#[from] DocumentError),
}
