//! Test-only mock LLM provider.
//!
//! Chat answers and tool-use responses are scripted; embeddings are a hashed
//! bag of words so lexically similar texts land close together.

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::LlmError;
use crate::provider::{ChatResponse, LlmProvider, Message, ToolDefinition, ToolUseRequest};

pub const DEFAULT_EMBEDDING_DIM: usize = 256;

/// One request observed by the mock.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    /// Names of the tools offered with the request; empty for plain chat.
    pub tools: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    tool_responses: Arc<Mutex<Vec<ChatResponse>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    pub default_response: String,
    pub tool_use: bool,
    pub fail_chat: bool,
    pub fail_embed: bool,
    pub embedding_dim: usize,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            tool_responses: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            tool_use: true,
            fail_chat: false,
            fail_embed: false,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    /// Queue responses returned by `chat_with_tools`, in order. Once drained,
    /// `chat_with_tools` falls back to the plain chat script.
    #[must_use]
    pub fn with_tool_responses(mut self, responses: Vec<ChatResponse>) -> Self {
        self.tool_responses = Arc::new(Mutex::new(responses));
        self
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn without_tool_use(mut self) -> Self {
        self.tool_use = false;
        self
    }

    /// Build a single tool-use response for scripting.
    #[must_use]
    pub fn tool_call(id: &str, name: &str, input: serde_json::Value) -> ChatResponse {
        ChatResponse::ToolUse {
            text: None,
            tool_calls: vec![ToolUseRequest {
                id: id.to_owned(),
                name: name.to_owned(),
                input,
            }],
        }
    }

    /// Every request seen so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, messages: &[Message], tools: &[ToolDefinition]) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                messages: messages.to_vec(),
                tools: tools.iter().map(|t| t.name.clone()).collect(),
            });
    }

    async fn pause(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
    }

    fn next_text(&self) -> String {
        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        if responses.is_empty() {
            self.default_response.clone()
        } else {
            responses.remove(0)
        }
    }
}

impl LlmProvider for MockProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.record(messages, &[]);
        self.pause().await;
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        Ok(self.next_text())
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse, LlmError> {
        self.record(messages, tools);
        self.pause().await;
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        let scripted = {
            let mut queue = self
                .tool_responses
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if queue.is_empty() {
                None
            } else {
                Some(queue.remove(0))
            }
        };
        Ok(scripted.unwrap_or_else(|| ChatResponse::Text(self.next_text())))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        if self.fail_embed {
            return Err(LlmError::Unavailable);
        }
        Ok(bag_of_words(text, self.embedding_dim))
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    fn supports_tool_use(&self) -> bool {
        self.tool_use
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// L2-normalized term-frequency vector with tokens hashed into `dim` buckets.
#[must_use]
pub fn bag_of_words(text: &str, dim: usize) -> Vec<f32> {
    let dim = dim.max(1);
    let mut vector = vec![0.0f32; dim];
    let lowered = text.to_lowercase();
    for token in lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let hash = blake3::hash(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        #[allow(clippy::cast_possible_truncation)]
        let bucket = (u64::from_le_bytes(head) % dim as u64) as usize;
        vector[bucket] += 1.0;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}
