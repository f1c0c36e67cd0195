//! Course documents: parsing, chunking and loading from disk.

pub mod error;
pub mod loader;
pub mod parser;
pub mod splitter;
pub mod types;

pub use error::{DocumentError, ParseError};
pub use loader::{DocumentLoader, SourceDocument, TextLoader, loader_for};
pub use parser::parse_course;
pub use splitter::{ChunkerConfig, CourseChunker};
pub use types::{CatalogEntry, Course, CourseChunk, CourseDocument, CourseSection, Lesson};

#[cfg(feature = "pdf")]
pub use loader::PdfLoader;
