use std::fmt::Write;
use std::sync::Arc;

use lectern_index::{ContentFilter, CourseResolver, CourseStore, ScoredChunk};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::executor::{ToolCall, ToolError, ToolExecutor, ToolOutput, deserialize_params};
use crate::registry::ToolDef;

pub const SEARCH_TOOL: &str = "search_course_content";

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchParams {
    /// What to search for in the course content
    query: String,
    /// Course title (partial matches work, e.g. 'MCP', 'Introduction')
    course_name: Option<String>,
    /// Specific lesson number to search within (e.g. 1, 2, 3)
    lesson_number: Option<u32>,
}

/// Semantic search over course content, optionally narrowed to one course
/// and/or lesson.
#[derive(Debug, Clone)]
pub struct CourseSearchExecutor {
    store: Arc<CourseStore>,
    resolver: CourseResolver,
    max_results: usize,
}

impl CourseSearchExecutor {
    #[must_use]
    pub fn new(store: Arc<CourseStore>, resolver: CourseResolver, max_results: usize) -> Self {
        Self {
            store,
            resolver,
            max_results: max_results.max(1),
        }
    }

    /// # Errors
    ///
    /// Returns [`ToolError::InvalidParams`] for an empty query and
    /// [`ToolError::Unavailable`] when the index cannot be queried.
    pub async fn search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
    ) -> Result<ToolOutput, ToolError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidParams {
                message: "query must not be empty".to_owned(),
            });
        }
        let course_name = course_name.map(str::trim).filter(|n| !n.is_empty());

        let course_title = match course_name {
            Some(name) => match self.resolver.resolve(name).await {
                Some(resolved) => Some(resolved.entry.title),
                None => {
                    return Ok(ToolOutput::text(
                        SEARCH_TOOL,
                        format!("No course found matching '{name}'"),
                    ));
                }
            },
            None => None,
        };

        let filter = ContentFilter {
            course_title,
            lesson_number,
        };
        let hits = self
            .store
            .query_content(query, &filter, self.max_results)
            .await
            .map_err(|e| ToolError::Unavailable {
                message: e.to_string(),
            })?;
        tracing::debug!(
            query,
            course = filter.course_title.as_deref(),
            lesson = filter.lesson_number,
            hits = hits.len(),
            "course content search"
        );

        if hits.is_empty() {
            return Ok(ToolOutput::text(SEARCH_TOOL, no_results_message(&filter)));
        }
        Ok(format_results(&hits))
    }
}

fn no_results_message(filter: &ContentFilter) -> String {
    let mut msg = String::from("No relevant content found");
    if let Some(title) = &filter.course_title {
        let _ = write!(msg, " in course '{title}'");
    }
    if let Some(n) = filter.lesson_number {
        let _ = write!(msg, " in lesson {n}");
    }
    msg.push('.');
    msg
}

fn header(hit: &ScoredChunk) -> String {
    match hit.lesson_number {
        Some(n) => format!("{} - Lesson {n}", hit.course_title),
        None => hit.course_title.clone(),
    }
}

fn format_results(hits: &[ScoredChunk]) -> ToolOutput {
    let mut blocks = Vec::with_capacity(hits.len());
    let mut sources = Vec::with_capacity(hits.len());
    for hit in hits {
        let label = header(hit);
        blocks.push(format!("[{label}]\n{}", hit.content));
        sources.push(crate::executor::Source {
            display_text: label,
            link: hit.lesson_link.clone(),
        });
    }
    ToolOutput {
        tool_name: SEARCH_TOOL.to_owned(),
        summary: blocks.join("\n\n"),
        sources,
    }
}

impl ToolExecutor for CourseSearchExecutor {
    fn tool_definitions(&self) -> Vec<ToolDef> {
        vec![ToolDef {
            id: SEARCH_TOOL,
            description: "Search course materials with smart course name matching and lesson filtering",
            schema: schemars::schema_for!(SearchParams),
        }]
    }

    async fn execute_tool_call(&self, call: &ToolCall) -> Result<Option<ToolOutput>, ToolError> {
        if call.tool_id != SEARCH_TOOL {
            return Ok(None);
        }
        let params: SearchParams = deserialize_params(&call.params)?;
        self.search(
            &params.query,
            params.course_name.as_deref(),
            params.lesson_number,
        )
        .await
        .map(Some)
    }
}
