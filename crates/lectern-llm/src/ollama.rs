use ollama_rs::Ollama;
use ollama_rs::generation::chat::ChatMessage;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message, Role};

const DEFAULT_PORT: u16 = 11434;

/// Local Ollama backend. Chat has no native tool use, so the orchestrator
/// receives plain text answers through the trait's fallback.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Ollama,
    model: String,
    embedding_model: String,
}

impl OllamaProvider {
    #[must_use]
    pub fn new(base_url: &str, model: String, embedding_model: String) -> Self {
        let (host, port) = parse_host_port(base_url);
        Self {
            client: Ollama::new(host, port),
            model,
            embedding_model,
        }
    }

    /// Check if Ollama is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection to Ollama fails.
    pub async fn health_check(&self) -> Result<(), LlmError> {
        self.client.list_local_models().await.map_err(|e| {
            tracing::warn!("ollama health check failed: {e}");
            LlmError::Unavailable
        })?;
        Ok(())
    }
}

impl LlmProvider for OllamaProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let ollama_messages: Vec<ChatMessage> = messages.iter().map(convert_message).collect();
        let request = ChatMessageRequest::new(self.model.clone(), ollama_messages);

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| LlmError::Other(format!("Ollama chat request failed: {e}")))?;

        Ok(response.message.content)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let request = GenerateEmbeddingsRequest::new(
            self.embedding_model.clone(),
            EmbeddingsInput::from(text),
        );

        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| LlmError::Other(format!("Ollama embedding request failed: {e}")))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse { provider: "ollama" })
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

fn convert_message(msg: &Message) -> ChatMessage {
    let text = msg.to_llm_content().to_owned();
    match msg.role {
        Role::System => ChatMessage::system(text),
        Role::Assistant => ChatMessage::assistant(text),
        Role::User => ChatMessage::user(text),
    }
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':')
        && let Ok(port) = url[colon_pos + 1..].parse::<u16>()
    {
        return (url[..colon_pos].to_owned(), port);
    }
    (url.to_owned(), DEFAULT_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_host_port_with_port() {
        assert_eq!(
            parse_host_port("http://localhost:11434"),
            ("http://localhost".to_owned(), 11434)
        );
    }

    #[test]
    fn parse_host_port_defaults_port() {
        assert_eq!(
            parse_host_port("http://gpu-box/"),
            ("http://gpu-box".to_owned(), DEFAULT_PORT)
        );
    }

    #[test]
    fn parse_host_port_invalid_port_falls_back() {
        let (host, port) = parse_host_port("http://localhost:notaport");
        assert_eq!(host, "http://localhost:notaport");
        assert_eq!(port, DEFAULT_PORT);
    }

    #[test]
    fn convert_message_keeps_flattened_tool_text() {
        let msg = Message::from_legacy(Role::User, "[tool_result]\nbody");
        let cm = convert_message(&msg);
        assert_eq!(cm.content, "[tool_result]\nbody");
    }

    #[test]
    fn capabilities() {
        let provider =
            OllamaProvider::new("http://localhost:11434", "llama3".into(), "all-minilm".into());
        assert!(provider.supports_embeddings());
        assert!(!provider.supports_tool_use());
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.embedding_model, "all-minilm");
    }
}
