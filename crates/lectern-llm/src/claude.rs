use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{
    ChatResponse, LlmProvider, Message, MessagePart, Role, ToolDefinition, ToolUseRequest,
};
use crate::retry::{RetryPolicy, send_with_retry};

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct ClaudeProvider {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl fmt::Debug for ClaudeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaudeProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl ClaudeProvider {
    #[must_use]
    pub fn new(api_key: String, model: String, max_tokens: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            api_url: DEFAULT_API_URL.to_owned(),
            model,
            max_tokens,
            temperature: 0.0,
        }
    }

    /// Point the provider at a different Messages endpoint (proxies, tests).
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ChatResponse, LlmError> {
        let (system, chat_messages) = split_messages_structured(messages);
        let api_tools: Vec<AnthropicTool<'_>> = tools
            .iter()
            .map(|t| AnthropicTool {
                name: &t.name,
                description: &t.description,
                input_schema: &t.parameters,
            })
            .collect();

        let body = RequestBody {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: system.as_deref(),
            messages: &chat_messages,
            tools: if api_tools.is_empty() {
                None
            } else {
                Some(api_tools.as_slice())
            },
            tool_choice: (!api_tools.is_empty()).then_some(ToolChoice { r#type: "auto" }),
        };

        let response = send_with_retry("claude", &RetryPolicy::default(), || {
            self.client
                .post(&self.api_url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;

        if !status.is_success() {
            tracing::error!("Claude API error {status}: {text}");
            return Err(LlmError::Api {
                provider: "claude",
                status: status.as_u16(),
            });
        }

        let resp: ApiResponse = serde_json::from_str(&text)?;
        if let Some(ref usage) = resp.usage {
            tracing::debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Claude API usage"
            );
        }
        let parsed = parse_response(resp);
        tracing::debug!(?parsed, "parsed ChatResponse");
        Ok(parsed)
    }
}

impl LlmProvider for ClaudeProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        match self.send(messages, &[]).await? {
            ChatResponse::Text(text) => Ok(text),
            ChatResponse::ToolUse { text, .. } => Ok(text.unwrap_or_default()),
        }
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse, LlmError> {
        self.send(messages, tools).await
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Err(LlmError::EmbedUnsupported { provider: "claude" })
    }

    fn supports_embeddings(&self) -> bool {
        false
    }

    fn supports_tool_use(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "claude"
    }
}

/// A reply without content blocks (e.g. an empty `end_turn`) is an empty answer.
fn parse_response(resp: ApiResponse) -> ChatResponse {
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in resp.content {
        match block {
            ContentBlock::Text { text } => text_parts.push(text),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolUseRequest { id, name, input });
            }
            ContentBlock::ToolResult { .. } | ContentBlock::Other => {}
        }
    }

    if tool_calls.is_empty() {
        if text_parts.is_empty() {
            tracing::debug!("Claude returned no content blocks");
        }
        return ChatResponse::Text(text_parts.join(""));
    }

    let text = if text_parts.is_empty() {
        None
    } else {
        Some(text_parts.join(""))
    };
    ChatResponse::ToolUse { text, tool_calls }
}

fn split_messages_structured(messages: &[Message]) -> (Option<String>, Vec<ApiMessage>) {
    let mut system_parts = Vec::new();
    let mut chat = Vec::new();

    for msg in messages {
        let role = match msg.role {
            Role::System => {
                system_parts.push(msg.to_llm_content().to_owned());
                continue;
            }
            Role::User => "user",
            Role::Assistant => "assistant",
        };

        if !msg.has_tool_parts() {
            chat.push(ApiMessage {
                role,
                content: ApiContent::Text(msg.to_llm_content().to_owned()),
            });
            continue;
        }

        let is_assistant = msg.role == Role::Assistant;
        let mut blocks = Vec::with_capacity(msg.parts.len());
        for part in &msg.parts {
            match part {
                MessagePart::Text { text } => {
                    if !text.is_empty() {
                        blocks.push(ContentBlock::Text { text: text.clone() });
                    }
                }
                MessagePart::ToolUse { id, name, input } if is_assistant => {
                    blocks.push(ContentBlock::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: input.clone(),
                    });
                }
                MessagePart::ToolUse { name, input, .. } => {
                    blocks.push(ContentBlock::Text {
                        text: format!("[tool_use: {name}] {input}"),
                    });
                }
                MessagePart::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } if !is_assistant => {
                    blocks.push(ContentBlock::ToolResult {
                        tool_use_id: tool_use_id.clone(),
                        content: content.clone(),
                        is_error: *is_error,
                    });
                }
                MessagePart::ToolResult { content, .. } => {
                    blocks.push(ContentBlock::Text {
                        text: content.clone(),
                    });
                }
            }
        }
        chat.push(ApiMessage {
            role,
            content: ApiContent::Blocks(blocks),
        });
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    (system, chat)
}

#[derive(Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [ApiMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [AnthropicTool<'a>]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Serialize)]
struct ToolChoice {
    r#type: &'static str,
}

#[derive(Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

#[derive(Serialize, Debug)]
struct ApiMessage {
    role: &'static str,
    content: ApiContent,
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
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
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize, Debug)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn search_tool() -> ToolDefinition {
        ToolDefinition {
            name: "search_course_content".into(),
            description: "Search course materials".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
        }
    }

    fn provider_for(server: &MockServer) -> ClaudeProvider {
        ClaudeProvider::new("test-key".into(), "claude-test".into(), 800)
            .with_api_url(format!("{}/v1/messages", server.uri()))
    }

    #[test]
    fn debug_redacts_api_key() {
        let provider = ClaudeProvider::new("sk-secret-key".into(), "claude-test".into(), 800);
        let debug_output = format!("{provider:?}");
        assert!(!debug_output.contains("sk-secret-key"));
        assert!(debug_output.contains("<redacted>"));
        assert!(debug_output.contains("claude-test"));
    }

    #[test]
    fn split_messages_extracts_system() {
        let messages = vec![
            Message::from_legacy(Role::System, "You are helpful."),
            Message::from_legacy(Role::User, "Hi"),
        ];
        let (system, chat) = split_messages_structured(&messages);
        assert_eq!(system.unwrap(), "You are helpful.");
        assert_eq!(chat.len(), 1);
        assert_eq!(chat[0].role, "user");
    }

    #[test]
    fn split_messages_emits_tool_blocks() {
        let messages = vec![
            Message::from_parts(
                Role::Assistant,
                vec![MessagePart::ToolUse {
                    id: "toolu_1".into(),
                    name: "search_course_content".into(),
                    input: serde_json::json!({"query": "mcp"}),
                }],
            ),
            Message::from_parts(
                Role::User,
                vec![MessagePart::ToolResult {
                    tool_use_id: "toolu_1".into(),
                    content: "[MCP - Lesson 1]\nbody".into(),
                    is_error: false,
                }],
            ),
        ];
        let (_, chat) = split_messages_structured(&messages);
        let json = serde_json::to_value(&chat).unwrap();
        assert_eq!(json[0]["content"][0]["type"], "tool_use");
        assert_eq!(json[1]["content"][0]["type"], "tool_result");
        assert_eq!(json[1]["content"][0]["tool_use_id"], "toolu_1");
        assert!(json[1]["content"][0].get("is_error").is_none());
    }

    #[test]
    fn parse_response_text_only() {
        let resp: ApiResponse = serde_json::from_value(serde_json::json!({
            "content": [{"type": "text", "text": "Hello"}]
        }))
        .unwrap();
        assert_eq!(
            parse_response(resp),
            ChatResponse::Text("Hello".into())
        );
    }

    #[test]
    fn parse_response_tool_use_with_preamble() {
        let resp: ApiResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "text", "text": "Searching."},
                {"type": "tool_use", "id": "toolu_1", "name": "search_course_content", "input": {"query": "x"}}
            ]
        }))
        .unwrap();
        let ChatResponse::ToolUse { text, tool_calls } = parse_response(resp) else {
            panic!("expected tool use");
        };
        assert_eq!(text.as_deref(), Some("Searching."));
        assert_eq!(tool_calls.len(), 1);
        assert_eq!(tool_calls[0].input["query"], "x");
    }

    #[test]
    fn parse_response_ignores_unknown_blocks() {
        let resp: ApiResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Answer"}
            ]
        }))
        .unwrap();
        assert_eq!(
            parse_response(resp),
            ChatResponse::Text("Answer".into())
        );
    }

    #[test]
    fn parse_response_empty_is_empty_text() {
        let resp: ApiResponse =
            serde_json::from_value(serde_json::json!({"content": [], "stop_reason": "end_turn"}))
                .unwrap();
        assert_eq!(parse_response(resp), ChatResponse::Text(String::new()));
    }

    #[tokio::test]
    async fn chat_with_tools_sends_auto_tool_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "tool_choice": {"type": "auto"},
                "temperature": 0.0
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    {"type": "tool_use", "id": "toolu_9", "name": "search_course_content", "input": {"query": "rag"}}
                ],
                "usage": {"input_tokens": 10, "output_tokens": 5}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let messages = vec![Message::from_legacy(Role::User, "What is RAG?")];
        let resp = provider
            .chat_with_tools(&messages, &[search_tool()])
            .await
            .unwrap();
        let ChatResponse::ToolUse { tool_calls, .. } = resp else {
            panic!("expected tool use");
        };
        assert_eq!(tool_calls[0].id, "toolu_9");
    }

    #[tokio::test]
    async fn chat_without_tools_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "final answer"}]
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let out = provider
            .chat(&[Message::from_legacy(Role::User, "q")])
            .await
            .unwrap();
        assert_eq!(out, "final answer");
    }

    #[tokio::test]
    async fn empty_end_turn_is_an_empty_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [],
                "stop_reason": "end_turn"
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let resp = provider
            .chat_with_tools(&[Message::from_legacy(Role::User, "q")], &[search_tool()])
            .await
            .unwrap();
        assert_eq!(resp, ChatResponse::Text(String::new()));
    }

    #[tokio::test]
    async fn server_error_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider
            .chat(&[Message::from_legacy(Role::User, "q")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LlmError::Api {
                provider: "claude",
                status: 500
            }
        ));
    }
}
