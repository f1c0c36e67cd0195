use crate::claude::ClaudeProvider;
use crate::error::LlmError;
#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::ollama::OllamaProvider;
use crate::provider::{ChatResponse, EmbedFuture, LlmProvider, Message, ToolDefinition};

/// Generates a match over all `AnyProvider` variants, binding the inner provider
/// and evaluating the given closure for each arm.
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyProvider::Ollama($p) => $expr,
            AnyProvider::Claude($p) => $expr,
            #[cfg(feature = "mock")]
            AnyProvider::Mock($p) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyProvider {
    Ollama(OllamaProvider),
    Claude(ClaudeProvider),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl AnyProvider {
    /// Return a cloneable closure that calls `embed()` on this provider.
    pub fn embed_fn(&self) -> impl Fn(&str) -> EmbedFuture + Send + Sync + Clone + 'static {
        let provider = std::sync::Arc::new(self.clone());
        move |text: &str| -> EmbedFuture {
            let p = std::sync::Arc::clone(&provider);
            let owned = text.to_owned();
            Box::pin(async move { p.embed(&owned).await })
        }
    }
}

impl LlmProvider for AnyProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        delegate_provider!(self, |p| p.chat(messages).await)
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse, LlmError> {
        delegate_provider!(self, |p| p.chat_with_tools(messages, tools).await)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        delegate_provider!(self, |p| p.embed(text).await)
    }

    fn supports_embeddings(&self) -> bool {
        delegate_provider!(self, |p| p.supports_embeddings())
    }

    fn supports_tool_use(&self) -> bool {
        delegate_provider!(self, |p| p.supports_tool_use())
    }

    fn name(&self) -> &'static str {
        delegate_provider!(self, |p| p.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delegates_capabilities() {
        let claude = AnyProvider::Claude(ClaudeProvider::new(
            "key".into(),
            "claude-sonnet-4-20250514".into(),
            800,
        ));
        assert_eq!(claude.name(), "claude");
        assert!(claude.supports_tool_use());
        assert!(!claude.supports_embeddings());

        let ollama = AnyProvider::Ollama(OllamaProvider::new(
            "http://localhost:11434",
            "llama3".into(),
            "all-minilm".into(),
        ));
        assert_eq!(ollama.name(), "ollama");
        assert!(!ollama.supports_tool_use());
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn embed_fn_calls_provider() {
        let any = AnyProvider::Mock(MockProvider::default());
        let embed = any.embed_fn();
        let v = embed("python lesson").await.unwrap();
        assert_eq!(v.len(), crate::mock::DEFAULT_EMBEDDING_DIM);
    }
}
