use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;

use crate::course::{CatalogEntry, CourseChunker, DocumentError, loader_for, parse_course};
use crate::store::CourseStore;

const INGEST_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Indexed { title: String, chunks: usize },
    /// A course with this title is already catalogued; nothing was written.
    Duplicate { title: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestFailure {
    pub source: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub courses_added: usize,
    pub chunks_added: usize,
    pub duplicates: Vec<String>,
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    fn record(&mut self, source: &Path, result: Result<IngestOutcome, DocumentError>) {
        match result {
            Ok(IngestOutcome::Indexed { chunks, .. }) => {
                self.courses_added += 1;
                self.chunks_added += chunks;
            }
            Ok(IngestOutcome::Duplicate { title }) => self.duplicates.push(title),
            Err(e) => self.failures.push(IngestFailure {
                source: source.display().to_string(),
                error: e.to_string(),
            }),
        }
    }
}

/// Parse, chunk and index course documents.
pub struct IngestionPipeline {
    chunker: CourseChunker,
    store: Arc<CourseStore>,
}

impl IngestionPipeline {
    #[must_use]
    pub fn new(chunker: CourseChunker, store: Arc<CourseStore>) -> Self {
        Self { chunker, store }
    }

    /// Ingest one course document. Re-ingesting a known title is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Parse`] for malformed documents and
    /// [`DocumentError::Index`] if embedding or storage fails.
    pub async fn ingest_text(&self, text: &str) -> Result<IngestOutcome, DocumentError> {
        let document = parse_course(text)?;
        let title = document.course.title.clone();
        let chunks = self.chunker.chunk(&document);
        let entry = CatalogEntry::from(&document.course);

        match self.store.add_course(&entry, &chunks).await? {
            Some(count) => {
                tracing::info!(course = %title, chunks = count, "course indexed");
                Ok(IngestOutcome::Indexed {
                    title,
                    chunks: count,
                })
            }
            None => {
                tracing::info!(course = %title, "course already indexed, skipped");
                Ok(IngestOutcome::Duplicate { title })
            }
        }
    }

    /// # Errors
    ///
    /// Returns [`DocumentError::UnsupportedFormat`] for unknown extensions, or
    /// any loading, parsing or indexing error.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestOutcome, DocumentError> {
        let loader = loader_for(path)
            .ok_or_else(|| DocumentError::UnsupportedFormat(path.display().to_string()))?;
        let source = loader.load(path).await?;
        self.ingest_text(&source.content).await
    }

    /// Ingest every supported file directly inside `folder`. Documents are
    /// processed concurrently and a failing document does not stop the rest.
    ///
    /// With `clear_existing` both collections are dropped first.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder cannot be read or clearing the index fails.
    pub async fn ingest_folder(
        &self,
        folder: &Path,
        clear_existing: bool,
    ) -> Result<IngestReport, DocumentError> {
        if clear_existing {
            self.store.clear().await?;
        }

        let mut paths: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(folder).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && loader_for(&path).is_some() {
                paths.push(path);
            }
        }
        paths.sort();
        tracing::info!(folder = %folder.display(), files = paths.len(), "ingesting course folder");

        let pending: Vec<_> = paths
            .into_iter()
            .map(|path| async move {
                let result = self.ingest_file(&path).await;
                (path, result)
            })
            .collect();
        let results: Vec<(PathBuf, Result<IngestOutcome, DocumentError>)> =
            futures::stream::iter(pending)
                .buffered(INGEST_CONCURRENCY)
                .collect()
                .await;

        let mut report = IngestReport::default();
        for (path, result) in results {
            if let Err(e) = &result {
                tracing::warn!(file = %path.display(), "course ingestion failed: {e}");
            }
            report.record(&path, result);
        }
        tracing::info!(
            added = report.courses_added,
            chunks = report.chunks_added,
            duplicates = report.duplicates.len(),
            failures = report.failures.len(),
            "folder ingestion finished"
        );
        Ok(report)
    }
}
