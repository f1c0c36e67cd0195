//! One query turn as an explicit state machine:
//!
//! ```text
//! AwaitingModel -> (ToolRequested -> ToolExecuted -> AwaitingModel)* -> Answered
//! ```
//!
//! Tools are offered for at most `max_tool_rounds` rounds. The call after the
//! last round goes out without tools so the model has to answer in text.

use std::future::Future;
use std::time::Duration;

use lectern_llm::LlmError;
use lectern_llm::provider::{
    ChatResponse, LlmProvider, Message, MessagePart, Role, ToolDefinition, ToolUseRequest,
};
use lectern_tools::{Source, ToolCall, ToolDef, ToolError, ToolExecutor, truncate_tool_output};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::OrchestratorError;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an assistant for questions about course materials. \
You can call tools to look up course content and course outlines.

Tool usage:
- Use search_course_content for questions about specific course content or lessons
- Use get_course_outline for questions about a course's structure, lesson list or instructor
- Answer general knowledge questions directly without searching
- If a search returns no results, say so plainly

Answers:
- Brief, accurate and grounded in the retrieved material
- Mention course titles and lesson numbers you rely on
- Do not describe the search process or refer to tool results";

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub max_tool_rounds: usize,
    pub llm_timeout: Duration,
    pub tool_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: 1,
            llm_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub answer: String,
    /// Sources gathered by tool calls of this turn only.
    pub sources: Vec<Source>,
    pub tool_rounds: usize,
}

#[derive(Debug)]
enum TurnState {
    AwaitingModel,
    ToolRequested {
        text: Option<String>,
        calls: Vec<ToolUseRequest>,
    },
    /// `abandoned` is set when a tool timed out; no further tools are offered.
    ToolExecuted {
        abandoned: bool,
    },
    Answered(String),
}

pub struct Orchestrator<P, T> {
    provider: P,
    executor: T,
    tools: Vec<ToolDefinition>,
    system_prompt: String,
    settings: OrchestratorSettings,
}

impl<P, T> std::fmt::Debug for Orchestrator<P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tools", &self.tools.iter().map(|t| &t.name).collect::<Vec<_>>())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider, T: ToolExecutor> Orchestrator<P, T> {
    pub fn new(provider: P, executor: T, settings: OrchestratorSettings) -> Self {
        let tools = executor
            .tool_definitions()
            .iter()
            .map(ToolDef::to_definition)
            .collect();
        Self {
            provider,
            executor,
            tools,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            settings,
        }
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }

    fn system_content(&self, history: Option<&str>) -> String {
        match history {
            Some(h) if !h.is_empty() => {
                format!("{}\n\nPrevious conversation:\n{h}", self.system_prompt)
            }
            _ => self.system_prompt.clone(),
        }
    }

    /// Run one query turn to completion.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] when a model call fails, times out or the
    /// turn is cancelled. Tool failures are reported to the model instead.
    pub async fn run_turn(
        &self,
        query: &str,
        history: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let mut messages = vec![
            Message::from_legacy(Role::System, self.system_content(history)),
            Message::from_legacy(Role::User, query),
        ];
        let mut sources = Vec::new();
        let mut rounds = 0usize;
        let mut tools_allowed = self.provider.supports_tool_use() && !self.tools.is_empty();
        let mut state = TurnState::AwaitingModel;

        loop {
            state = match state {
                TurnState::AwaitingModel => {
                    let offer_tools = tools_allowed && rounds < self.settings.max_tool_rounds;
                    tracing::debug!(round = rounds, offer_tools, "awaiting model");
                    if offer_tools {
                        let response = self
                            .call_model(self.provider.chat_with_tools(&messages, &self.tools), cancel)
                            .await?;
                        match response {
                            ChatResponse::Text(text) => TurnState::Answered(text),
                            ChatResponse::ToolUse { text, tool_calls } if tool_calls.is_empty() => {
                                TurnState::Answered(text.unwrap_or_default())
                            }
                            ChatResponse::ToolUse { text, tool_calls } => TurnState::ToolRequested {
                                text,
                                calls: tool_calls,
                            },
                        }
                    } else {
                        let text_only = text_only_view(&messages);
                        TurnState::Answered(
                            self.call_model(self.provider.chat(&text_only), cancel)
                                .await?,
                        )
                    }
                }
                TurnState::ToolRequested { text, calls } => {
                    tracing::debug!(
                        round = rounds,
                        calls = ?calls.iter().map(|c| &c.name).collect::<Vec<_>>(),
                        "model requested tools"
                    );
                    let abandoned = self
                        .execute_tools(text, &calls, &mut messages, &mut sources, cancel)
                        .await?;
                    rounds += 1;
                    TurnState::ToolExecuted { abandoned }
                }
                TurnState::ToolExecuted { abandoned } => {
                    if abandoned {
                        tools_allowed = false;
                    }
                    TurnState::AwaitingModel
                }
                TurnState::Answered(answer) => {
                    tracing::debug!(rounds, sources = sources.len(), "turn answered");
                    return Ok(TurnOutcome {
                        answer,
                        sources,
                        tool_rounds: rounds,
                    });
                }
            };
        }
    }

    async fn call_model<R>(
        &self,
        fut: impl Future<Output = Result<R, LlmError>>,
        cancel: &CancellationToken,
    ) -> Result<R, OrchestratorError> {
        let llm_span = tracing::info_span!("llm_call", provider = self.provider.name());
        let timed = tokio::time::timeout(self.settings.llm_timeout, fut.instrument(llm_span));
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!("model call cancelled");
                Err(OrchestratorError::Cancelled)
            }
            r = timed => match r {
                Ok(result) => result.map_err(OrchestratorError::Model),
                Err(_) => {
                    let seconds = self.settings.llm_timeout.as_secs();
                    tracing::warn!(seconds, "model call timed out");
                    Err(OrchestratorError::Timeout { seconds })
                }
            },
        }
    }

    /// Execute requested tools in order and append the assistant tool-use
    /// message plus the user tool-result message. Returns `true` when the
    /// round was abandoned after a timeout.
    async fn execute_tools(
        &self,
        text: Option<String>,
        calls: &[ToolUseRequest],
        messages: &mut Vec<Message>,
        sources: &mut Vec<Source>,
        cancel: &CancellationToken,
    ) -> Result<bool, OrchestratorError> {
        let mut parts: Vec<MessagePart> = Vec::with_capacity(calls.len() + 1);
        if let Some(t) = text
            && !t.is_empty()
        {
            parts.push(MessagePart::Text { text: t });
        }
        for tc in calls {
            parts.push(MessagePart::ToolUse {
                id: tc.id.clone(),
                name: tc.name.clone(),
                input: tc.input.clone(),
            });
        }
        messages.push(Message::from_parts(Role::Assistant, parts));

        let mut results = Vec::with_capacity(calls.len());
        let mut abandoned = false;
        for tc in calls {
            if abandoned {
                results.push(MessagePart::ToolResult {
                    tool_use_id: tc.id.clone(),
                    content: "Skipped: tool round abandoned after a timeout.".to_owned(),
                    is_error: true,
                });
                continue;
            }

            let call = ToolCall::from_input(tc.name.as_str(), &tc.input);
            let exec = tokio::time::timeout(
                self.settings.tool_timeout,
                self.executor.execute_tool_call(&call),
            )
            .instrument(tracing::info_span!("tool_exec", tool_name = %tc.name, id = %tc.id));
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!("tool execution cancelled");
                    return Err(OrchestratorError::Cancelled);
                }
                r = exec => r,
            };

            let (content, is_error) = match outcome {
                Ok(Ok(Some(output))) => {
                    sources.extend(output.sources);
                    (truncate_tool_output(&output.summary), false)
                }
                Ok(Ok(None)) => {
                    tracing::warn!(tool = %tc.name, "model requested unknown tool");
                    (format!("Tool '{}' not found", tc.name), true)
                }
                Ok(Err(e)) => {
                    tracing::warn!(tool = %tc.name, "tool call failed: {e}");
                    (format!("[error] {e}"), true)
                }
                Err(_) => {
                    abandoned = true;
                    let err = ToolError::Timeout {
                        timeout_secs: self.settings.tool_timeout.as_secs(),
                    };
                    tracing::warn!(tool = %tc.name, "{err}, abandoning tool round");
                    (format!("[error] {err}"), true)
                }
            };
            results.push(MessagePart::ToolResult {
                tool_use_id: tc.id.clone(),
                content,
                is_error,
            });
        }
        messages.push(Message::from_parts(Role::User, results));
        Ok(abandoned)
    }
}

/// Conversation with tool blocks flattened to text, for calls that offer no
/// tools.
fn text_only_view(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .map(|m| {
            if m.has_tool_parts() {
                Message::from_legacy(m.role, m.content.clone())
            } else {
                m.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use lectern_llm::mock::MockProvider;
    use lectern_tools::ToolOutput;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Clone, Default)]
    struct FakeSearch {
        seen: Arc<Mutex<Vec<ToolCall>>>,
        delay: Option<Duration>,
    }

    #[derive(serde::Deserialize, schemars::JsonSchema)]
    #[allow(dead_code)]
    struct FakeParams {
        query: String,
    }

    impl ToolExecutor for FakeSearch {
        fn tool_definitions(&self) -> Vec<ToolDef> {
            vec![ToolDef {
                id: "search_course_content",
                description: "search",
                schema: schemars::schema_for!(FakeParams),
            }]
        }

        async fn execute_tool_call(&self, call: &ToolCall) -> Result<Option<ToolOutput>, ToolError> {
            if call.tool_id != "search_course_content" {
                return Ok(None);
            }
            self.seen.lock().unwrap().push(call.clone());
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            let query = call
                .params
                .get("query")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::InvalidParams {
                    message: "missing field `query`".into(),
                })?;
            Ok(Some(ToolOutput {
                tool_name: call.tool_id.clone(),
                summary: format!("[Intro to Testing - Lesson 1]\nresult for {query}"),
                sources: vec![Source {
                    display_text: "Intro to Testing - Lesson 1".into(),
                    link: Some("https://example.com/1".into()),
                }],
            }))
        }
    }

    fn search_call(id: &str, query: &str) -> ChatResponse {
        MockProvider::tool_call(id, "search_course_content", json!({ "query": query }))
    }

    fn settings(max_tool_rounds: usize) -> OrchestratorSettings {
        OrchestratorSettings {
            max_tool_rounds,
            ..OrchestratorSettings::default()
        }
    }

    fn last_tool_results(messages: &[Message]) -> Vec<(String, bool)> {
        messages
            .iter()
            .rev()
            .find_map(|m| {
                let results: Vec<_> = m
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        MessagePart::ToolResult {
                            content, is_error, ..
                        } => Some((content.clone(), *is_error)),
                        _ => None,
                    })
                    .collect();
                (!results.is_empty()).then_some(results)
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn direct_answer_skips_tools() {
        let provider = MockProvider::with_responses(vec!["Paris.".into()]);
        let orch = Orchestrator::new(provider.clone(), FakeSearch::default(), settings(1));

        let out = orch
            .run_turn("capital of France?", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.answer, "Paris.");
        assert!(out.sources.is_empty());
        assert_eq!(out.tool_rounds, 0);

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tools, vec!["search_course_content".to_owned()]);
        assert_eq!(calls[0].messages[0].role, Role::System);
        assert_eq!(calls[0].messages[1].content, "capital of France?");
    }

    #[tokio::test]
    async fn one_tool_round_then_answer() {
        let provider = MockProvider::with_responses(vec!["Unit tests are small.".into()])
            .with_tool_responses(vec![search_call("t1", "unit tests")]);
        let search = FakeSearch::default();
        let orch = Orchestrator::new(provider.clone(), search.clone(), settings(1));

        let out = orch
            .run_turn("what is a unit test", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.answer, "Unit tests are small.");
        assert_eq!(out.tool_rounds, 1);
        assert_eq!(
            out.sources,
            vec![Source {
                display_text: "Intro to Testing - Lesson 1".into(),
                link: Some("https://example.com/1".into()),
            }]
        );
        assert_eq!(search.seen.lock().unwrap()[0].params["query"], "unit tests");

        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].tools.is_empty());
        let last = calls[1].messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last.content.contains("result for unit tests"));
    }

    #[tokio::test]
    async fn tool_loop_is_bounded() {
        let provider = MockProvider::with_responses(vec!["forced answer".into()])
            .with_tool_responses((0..10).map(|i| search_call(&format!("t{i}"), "again")).collect());
        let orch = Orchestrator::new(provider.clone(), FakeSearch::default(), settings(1));

        let out = orch
            .run_turn("loop forever", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.answer, "forced answer");
        assert_eq!(out.tool_rounds, 1);
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn configurable_round_bound() {
        let provider = MockProvider::with_responses(vec!["done".into()])
            .with_tool_responses((0..10).map(|i| search_call(&format!("t{i}"), "again")).collect());
        let orch = Orchestrator::new(provider.clone(), FakeSearch::default(), settings(2));

        let out = orch
            .run_turn("compare two courses", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.tool_rounds, 2);
        assert_eq!(out.sources.len(), 2);
        let calls = provider.calls();
        assert_eq!(calls.len(), 3);
        assert!(!calls[1].tools.is_empty());
        assert!(calls[2].tools.is_empty());
    }

    #[tokio::test]
    async fn multiple_calls_run_in_order() {
        let provider = MockProvider::with_responses(vec!["ok".into()]).with_tool_responses(vec![
            ChatResponse::ToolUse {
                text: Some("Let me check.".into()),
                tool_calls: vec![
                    ToolUseRequest {
                        id: "a".into(),
                        name: "search_course_content".into(),
                        input: json!({"query": "first"}),
                    },
                    ToolUseRequest {
                        id: "b".into(),
                        name: "search_course_content".into(),
                        input: json!({"query": "second"}),
                    },
                ],
            },
        ]);
        let search = FakeSearch::default();
        let orch = Orchestrator::new(provider, search.clone(), settings(1));

        let out = orch
            .run_turn("q", None, &CancellationToken::new())
            .await
            .unwrap();
        let seen = search.seen.lock().unwrap();
        assert_eq!(seen[0].params["query"], "first");
        assert_eq!(seen[1].params["query"], "second");
        assert_eq!(out.sources.len(), 2);
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_params_become_error_results() {
        let provider = MockProvider::with_responses(vec!["sorry".into()]).with_tool_responses(vec![
            ChatResponse::ToolUse {
                text: None,
                tool_calls: vec![
                    ToolUseRequest {
                        id: "a".into(),
                        name: "delete_everything".into(),
                        input: json!({}),
                    },
                    ToolUseRequest {
                        id: "b".into(),
                        name: "search_course_content".into(),
                        input: json!({"lesson_number": 1}),
                    },
                ],
            },
        ]);
        let orch = Orchestrator::new(provider.clone(), FakeSearch::default(), settings(2));

        let out = orch
            .run_turn("q", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.answer, "sorry");
        assert!(out.sources.is_empty());

        let calls = provider.calls();
        let results = last_tool_results(&calls[1].messages);
        assert_eq!(
            results,
            vec![
                ("Tool 'delete_everything' not found".to_owned(), true),
                (
                    "[error] invalid tool parameters: missing field `query`".to_owned(),
                    true
                ),
            ]
        );
    }

    #[tokio::test]
    async fn model_failure_is_error() {
        let orch = Orchestrator::new(MockProvider::failing(), FakeSearch::default(), settings(1));
        let err = orch
            .run_turn("q", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Model(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn model_timeout_is_error() {
        let provider = MockProvider::default().with_delay(5_000);
        let orch = Orchestrator::new(
            provider,
            FakeSearch::default(),
            OrchestratorSettings {
                llm_timeout: Duration::from_secs(1),
                ..OrchestratorSettings::default()
            },
        );
        let err = orch
            .run_turn("q", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Timeout { seconds: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn tool_timeout_abandons_round() {
        let provider = MockProvider::with_responses(vec!["degraded answer".into()])
            .with_tool_responses(vec![
                ChatResponse::ToolUse {
                    text: None,
                    tool_calls: vec![
                        ToolUseRequest {
                            id: "a".into(),
                            name: "search_course_content".into(),
                            input: json!({"query": "slow"}),
                        },
                        ToolUseRequest {
                            id: "b".into(),
                            name: "search_course_content".into(),
                            input: json!({"query": "never runs"}),
                        },
                    ],
                },
                search_call("c", "not offered"),
            ]);
        let search = FakeSearch {
            delay: Some(Duration::from_secs(30)),
            ..FakeSearch::default()
        };
        let orch = Orchestrator::new(
            provider.clone(),
            search.clone(),
            OrchestratorSettings {
                max_tool_rounds: 3,
                tool_timeout: Duration::from_secs(2),
                ..OrchestratorSettings::default()
            },
        );

        let out = orch
            .run_turn("q", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.answer, "degraded answer");
        assert!(out.sources.is_empty());
        assert_eq!(search.seen.lock().unwrap().len(), 1);

        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].tools.is_empty());
        let flattened = &calls[1].messages.last().unwrap().content;
        assert!(flattened.contains("tool timed out after 2s"));
        assert!(flattened.contains("Skipped: tool round abandoned"));
    }

    #[tokio::test]
    async fn cancelled_turn_returns_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let orch = Orchestrator::new(MockProvider::default(), FakeSearch::default(), settings(1));
        let err = orch.run_turn("q", None, &cancel).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Cancelled));
    }

    #[tokio::test]
    async fn sources_do_not_leak_between_turns() {
        let provider = MockProvider::with_responses(vec!["first".into(), "second".into()])
            .with_tool_responses(vec![search_call("t1", "x")]);
        let orch = Orchestrator::new(provider, FakeSearch::default(), settings(1));
        let cancel = CancellationToken::new();

        let first = orch.run_turn("q1", None, &cancel).await.unwrap();
        assert_eq!(first.sources.len(), 1);
        let second = orch.run_turn("q2", None, &cancel).await.unwrap();
        assert_eq!(second.answer, "second");
        assert!(second.sources.is_empty());
    }

    #[tokio::test]
    async fn provider_without_tool_use_gets_no_tools() {
        let provider = MockProvider::with_responses(vec!["plain".into()]).without_tool_use();
        let orch = Orchestrator::new(provider.clone(), FakeSearch::default(), settings(1));
        let out = orch
            .run_turn("q", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.answer, "plain");
        assert!(provider.calls()[0].tools.is_empty());
    }

    #[tokio::test]
    async fn history_is_appended_to_system_prompt() {
        let provider = MockProvider::default();
        let orch = Orchestrator::new(provider.clone(), FakeSearch::default(), settings(1))
            .with_system_prompt("Be brief.");
        orch.run_turn(
            "q",
            Some("User: hi\nAssistant: hello"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(
            provider.calls()[0].messages[0].content,
            "Be brief.\n\nPrevious conversation:\nUser: hi\nAssistant: hello"
        );
    }

    #[test]
    fn text_only_view_flattens_tool_parts() {
        let messages = vec![
            Message::from_legacy(Role::User, "q"),
            Message::from_parts(
                Role::User,
                vec![MessagePart::ToolResult {
                    tool_use_id: "a".into(),
                    content: "found".into(),
                    is_error: false,
                }],
            ),
        ];
        let flat = text_only_view(&messages);
        assert!(flat.iter().all(|m| !m.has_tool_parts()));
        assert_eq!(flat[1].content, "[tool_result]\nfound");
    }
}
