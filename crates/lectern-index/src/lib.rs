//! Course ingestion and semantic retrieval.
//!
//! Course documents are parsed into lessons, split into overlapping
//! sentence-aligned chunks, embedded and stored in two collections: a
//! catalog with one entry per course and a content collection with the
//! chunks. Search runs against either backend of [`vector_store::VectorStore`].

pub mod course;
pub mod error;
pub mod in_memory_store;
pub mod ingest;
pub mod qdrant_ops;
pub mod resolver;
pub mod store;
pub mod vector_store;

pub use error::IndexError;
pub use ingest::{IngestFailure, IngestOutcome, IngestReport, IngestionPipeline};
pub use resolver::{CourseResolver, ResolvedCourse};
pub use store::{CatalogSummary, ContentFilter, CourseStore, EmbedFn, ScoredChunk};
