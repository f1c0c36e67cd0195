use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// Structured tool invocation from the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub tool_id: String,
    pub params: HashMap<String, serde_json::Value>,
}

impl ToolCall {
    /// Build a call from the raw JSON input of a tool-use block. Non-object
    /// input yields an empty parameter map.
    #[must_use]
    pub fn from_input(tool_id: impl Into<String>, input: &serde_json::Value) -> Self {
        let params = input
            .as_object()
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Self {
            tool_id: tool_id.into(),
            params,
        }
    }
}

/// Provenance shown to the user next to an answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Source {
    pub display_text: String,
    pub link: Option<String>,
}

/// Structured result from tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub tool_name: String,
    pub summary: String,
    /// Sources backing `summary`, owned by the call that produced them.
    pub sources: Vec<Source>,
}

impl ToolOutput {
    #[must_use]
    pub fn text(tool_name: &str, summary: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.to_owned(),
            summary: summary.into(),
            sources: Vec::new(),
        }
    }
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary)
    }
}

pub const MAX_TOOL_OUTPUT_CHARS: usize = 30_000;

/// Truncate tool output that exceeds `MAX_TOOL_OUTPUT_CHARS` using head+tail split.
#[must_use]
pub fn truncate_tool_output(output: &str) -> String {
    if output.len() <= MAX_TOOL_OUTPUT_CHARS {
        return output.to_string();
    }

    let half = MAX_TOOL_OUTPUT_CHARS / 2;
    let head_end = output.floor_char_boundary(half);
    let tail_start = output.ceil_char_boundary(output.len() - half);
    let head = &output[..head_end];
    let tail = &output[tail_start..];
    let truncated = tail_start - head_end;

    format!("{head}\n\n... [truncated {truncated} chars] ...\n\n{tail}")
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid tool parameters: {message}")]
    InvalidParams { message: String },

    /// The index could not be queried. Distinct from an empty result.
    #[error("search unavailable: {message}")]
    Unavailable { message: String },

    #[error("tool timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Deserialize tool call params from a `HashMap<String, Value>` into a typed struct.
///
/// # Errors
///
/// Returns `ToolError::InvalidParams` when deserialization fails.
pub fn deserialize_params<T: serde::de::DeserializeOwned, S: std::hash::BuildHasher>(
    params: &HashMap<String, serde_json::Value, S>,
) -> Result<T, ToolError> {
    let obj =
        serde_json::Value::Object(params.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    serde_json::from_value(obj).map_err(|e| ToolError::InvalidParams {
        message: e.to_string(),
    })
}

/// A backend of model-callable tools.
pub trait ToolExecutor: Send + Sync {
    /// Tool definitions this executor can handle.
    fn tool_definitions(&self) -> Vec<crate::registry::ToolDef>;

    /// Execute a structured tool call. Returns `None` if `tool_id` is not handled.
    fn execute_tool_call(
        &self,
        call: &ToolCall,
    ) -> impl Future<Output = Result<Option<ToolOutput>, ToolError>> + Send;
}
