use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Boxed future returned by embedding closures handed to the index layer.
pub type EmbedFuture = Pin<Box<dyn Future<Output = Result<Vec<f32>, LlmError>> + Send>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Structured piece of a message. Plain messages carry no parts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePart {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl Message {
    #[must_use]
    pub fn from_legacy(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            parts: vec![],
        }
    }

    /// Build a message from structured parts; `content` is the flattened text view.
    #[must_use]
    pub fn from_parts(role: Role, parts: Vec<MessagePart>) -> Self {
        let content = flatten_parts(&parts);
        Self {
            role,
            content,
            parts,
        }
    }

    #[must_use]
    pub fn has_tool_parts(&self) -> bool {
        self.parts.iter().any(|p| {
            matches!(
                p,
                MessagePart::ToolUse { .. } | MessagePart::ToolResult { .. }
            )
        })
    }

    /// Text sent to providers that do not understand structured parts.
    #[must_use]
    pub fn to_llm_content(&self) -> &str {
        &self.content
    }
}

fn flatten_parts(parts: &[MessagePart]) -> String {
    let mut out = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            MessagePart::Text { text } => out.push(text.clone()),
            MessagePart::ToolUse { name, input, .. } => {
                out.push(format!("[tool_use: {name}] {input}"));
            }
            MessagePart::ToolResult { content, .. } => {
                out.push(format!("[tool_result]\n{content}"));
            }
        }
    }
    out.join("\n")
}

/// Tool interface advertised to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the tool input object.
    pub parameters: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolUseRequest {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChatResponse {
    /// Direct answer, no tool invocation requested.
    Text(String),
    /// The model asks for one or more tool invocations, optionally with preamble text.
    ToolUse {
        text: Option<String>,
        tool_calls: Vec<ToolUseRequest>,
    },
}

pub trait LlmProvider: Send + Sync {
    /// Send messages to the LLM and return the assistant response.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response is invalid.
    fn chat(&self, messages: &[Message]) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Send messages together with tool definitions.
    ///
    /// Providers without native tool use fall back to plain chat.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response is invalid.
    fn chat_with_tools(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> impl Future<Output = Result<ChatResponse, LlmError>> + Send {
        async move { Ok(ChatResponse::Text(self.chat(messages).await?)) }
    }

    /// Compute an embedding vector for `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider does not support embeddings or the request fails.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    fn supports_embeddings(&self) -> bool;

    fn supports_tool_use(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}
