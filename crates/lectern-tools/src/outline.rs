use std::fmt::Write;

use lectern_index::CourseResolver;
use lectern_index::course::CatalogEntry;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::executor::{Source, ToolCall, ToolError, ToolExecutor, ToolOutput, deserialize_params};
use crate::registry::ToolDef;

pub const OUTLINE_TOOL: &str = "get_course_outline";

#[derive(Debug, Deserialize, JsonSchema)]
struct OutlineParams {
    /// Course title (partial matches work, e.g. 'MCP', 'Introduction')
    course_name: String,
}

/// Course title, link, instructor and lesson list from the catalog.
#[derive(Debug, Clone)]
pub struct CourseOutlineExecutor {
    resolver: CourseResolver,
}

impl CourseOutlineExecutor {
    #[must_use]
    pub fn new(resolver: CourseResolver) -> Self {
        Self { resolver }
    }

    /// # Errors
    ///
    /// Returns [`ToolError::InvalidParams`] for an empty course name.
    pub async fn outline(&self, course_name: &str) -> Result<ToolOutput, ToolError> {
        let name = course_name.trim();
        if name.is_empty() {
            return Err(ToolError::InvalidParams {
                message: "course_name must not be empty".to_owned(),
            });
        }
        let Some(resolved) = self.resolver.resolve(name).await else {
            return Ok(ToolOutput::text(
                OUTLINE_TOOL,
                format!("No course found matching '{name}'"),
            ));
        };

        let entry = resolved.entry;
        Ok(ToolOutput {
            tool_name: OUTLINE_TOOL.to_owned(),
            summary: render_outline(&entry),
            sources: vec![Source {
                display_text: entry.title.clone(),
                link: entry.course_link.clone(),
            }],
        })
    }
}

fn render_outline(entry: &CatalogEntry) -> String {
    let mut out = format!("Course: {}\n", entry.title);
    if let Some(link) = &entry.course_link {
        let _ = writeln!(out, "Link: {link}");
    }
    if let Some(instructor) = &entry.instructor {
        let _ = writeln!(out, "Instructor: {instructor}");
    }
    if entry.lessons.is_empty() {
        out.push_str("No lessons listed.");
        return out;
    }
    let _ = write!(out, "Lessons ({}):", entry.lessons.len());
    for lesson in &entry.lessons {
        let _ = write!(out, "\n  Lesson {}: {}", lesson.number, lesson.title);
    }
    out
}

impl ToolExecutor for CourseOutlineExecutor {
    fn tool_definitions(&self) -> Vec<ToolDef> {
        vec![ToolDef {
            id: OUTLINE_TOOL,
            description: "Get a course outline: title, link, instructor and the numbered lesson list",
            schema: schemars::schema_for!(OutlineParams),
        }]
    }

    async fn execute_tool_call(&self, call: &ToolCall) -> Result<Option<ToolOutput>, ToolError> {
        if call.tool_id != OUTLINE_TOOL {
            return Ok(None);
        }
        let params: OutlineParams = deserialize_params(&call.params)?;
        self.outline(&params.course_name).await.map(Some)
    }
}
