use lectern_llm::LlmError;

use crate::vector_store::VectorStoreError;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Embedding or backend failure. Distinct from an empty result set.
    #[error("search unavailable: {0}")]
    Unavailable(String),

    #[error("chunks reference course {0:?} which is not in the catalog")]
    UnknownCourse(String),
}

impl From<LlmError> for IndexError {
    fn from(e: LlmError) -> Self {
        Self::Unavailable(format!("embedding failed: {e}"))
    }
}

impl From<VectorStoreError> for IndexError {
    fn from(e: VectorStoreError) -> Self {
        Self::Unavailable(e.to_string())
    }
}
