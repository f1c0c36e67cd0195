//! Tools the model can call during a query turn: course content search and
//! course outline lookup.

pub mod composite;
pub mod executor;
pub mod outline;
pub mod registry;
pub mod search;

pub use composite::CompositeExecutor;
pub use executor::{
    MAX_TOOL_OUTPUT_CHARS, Source, ToolCall, ToolError, ToolExecutor, ToolOutput,
    truncate_tool_output,
};
pub use outline::CourseOutlineExecutor;
pub use registry::{ToolDef, ToolRegistry};
pub use search::CourseSearchExecutor;
