//! Two-collection course index: one catalog record per course, many content chunks.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::{StreamExt, TryStreamExt};
use lectern_llm::provider::EmbedFuture;

use crate::course::{CatalogEntry, CourseChunk, Lesson};
use crate::error::IndexError;
use crate::vector_store::{FieldCondition, FieldValue, VectorFilter, VectorPoint, VectorStore};

pub const CATALOG_COLLECTION: &str = "course_catalog";
pub const CONTENT_COLLECTION: &str = "course_content";

const COURSE_NAMESPACE: uuid::Uuid = uuid::Uuid::from_bytes([
    0x6c, 0x65, 0x63, 0x74, // "lect"
    0x65, 0x72, 0x6e, 0x2d, // "ern-"
    0x63, 0x6f, 0x75, 0x72, // "cour"
    0x00, 0x00, 0x00, 0x01, // version
]);

const EMBED_CONCURRENCY: usize = 8;
const UPSERT_BATCH: usize = 64;
/// Extra hits fetched so ties straddling `limit` can be reordered.
const TIE_HEADROOM: usize = 4;
const SAMPLE_TEXT: &str = "course catalog sample";

pub type EmbedFn = Arc<dyn Fn(&str) -> EmbedFuture + Send + Sync>;

fn catalog_point_id(title: &str) -> String {
    uuid::Uuid::new_v5(&COURSE_NAMESPACE, title.as_bytes()).to_string()
}

fn chunk_point_id(title: &str, index: usize) -> String {
    uuid::Uuid::new_v5(&COURSE_NAMESPACE, format!("{title}_{index}").as_bytes()).to_string()
}

/// Exact-match restriction for content queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentFilter {
    pub course_title: Option<String>,
    pub lesson_number: Option<u32>,
}

impl ContentFilter {
    fn to_vector_filter(&self) -> Option<VectorFilter> {
        let mut must = Vec::new();
        if let Some(title) = &self.course_title {
            must.push(FieldCondition {
                field: "course_title".into(),
                value: FieldValue::Text(title.clone()),
            });
        }
        if let Some(n) = self.lesson_number {
            must.push(FieldCondition {
                field: "lesson_number".into(),
                value: FieldValue::Integer(i64::from(n)),
            });
        }
        (!must.is_empty()).then_some(VectorFilter {
            must,
            must_not: vec![],
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub content: String,
    pub course_title: String,
    pub lesson_number: Option<u32>,
    pub lesson_link: Option<String>,
    pub chunk_index: usize,
    /// `1 - cosine similarity`; smaller is closer.
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSummary {
    pub total_courses: usize,
    pub course_titles: Vec<String>,
}

pub struct CourseStore {
    backend: Arc<dyn VectorStore>,
    embed: EmbedFn,
    title_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    next_seq: AtomicU64,
}

impl std::fmt::Debug for CourseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourseStore").finish_non_exhaustive()
    }
}

impl CourseStore {
    #[must_use]
    pub fn new(backend: Arc<dyn VectorStore>, embed: EmbedFn) -> Self {
        Self {
            backend,
            embed,
            title_locks: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Create both collections if missing. The vector size is learned from a
    /// sample embedding.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Unavailable`] if embedding or the backend fails.
    pub async fn ensure_collections(&self) -> Result<(), IndexError> {
        let sample = (self.embed)(SAMPLE_TEXT).await?;
        let size = sample.len() as u64;
        self.backend
            .ensure_collection(CATALOG_COLLECTION, size)
            .await?;
        self.backend
            .ensure_collection(CONTENT_COLLECTION, size)
            .await?;
        Ok(())
    }

    /// Drop and recreate both collections.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Unavailable`] if the backend fails.
    pub async fn clear(&self) -> Result<(), IndexError> {
        for collection in [CATALOG_COLLECTION, CONTENT_COLLECTION] {
            if self.backend.collection_exists(collection).await? {
                self.backend.delete_collection(collection).await?;
            }
        }
        tracing::info!("course index cleared");
        self.ensure_collections().await
    }

    fn title_lock(&self, title: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .title_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(title.to_owned()).or_default())
    }

    /// Insert a catalog record unless one with the same title exists.
    /// Check and insert happen under a per-title lock.
    ///
    /// Returns `false` when the course was already present.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Unavailable`] if embedding or the backend fails.
    pub async fn upsert_course(&self, entry: &CatalogEntry) -> Result<bool, IndexError> {
        let lock = self.title_lock(&entry.title);
        let _guard = lock.lock().await;

        if self.has_course(&entry.title).await? {
            return Ok(false);
        }
        let vector = (self.embed)(&entry.title).await?;
        self.write_catalog_point(entry, vector).await?;
        Ok(true)
    }

    /// Embed and store chunks. Every referenced course must already be in the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::UnknownCourse`] for chunks of an uncatalogued
    /// course, or [`IndexError::Unavailable`] on embedding/backend failure.
    pub async fn upsert_chunks(&self, chunks: &[CourseChunk]) -> Result<usize, IndexError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let titles: BTreeSet<&str> = chunks.iter().map(|c| c.course_title.as_str()).collect();
        let catalog = self.backend.scroll_all(CATALOG_COLLECTION, "title").await?;
        if let Some(missing) = titles.iter().find(|t| !catalog.contains_key(**t)) {
            return Err(IndexError::UnknownCourse((*missing).to_owned()));
        }

        let vectors = self.embed_chunks(chunks).await?;
        self.write_chunk_points(chunks, vectors).await
    }

    /// Register a course and its chunks as one unit; returns `None` for a
    /// duplicate title.
    ///
    /// Everything is embedded before the first write. If writing the chunks
    /// fails the catalog record and any written chunks are removed again, so a
    /// later attempt starts from a clean slate.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::UnknownCourse`] if a chunk belongs to another
    /// course, or [`IndexError::Unavailable`] if embedding or storage fails.
    pub async fn add_course(
        &self,
        entry: &CatalogEntry,
        chunks: &[CourseChunk],
    ) -> Result<Option<usize>, IndexError> {
        if let Some(stray) = chunks.iter().find(|c| c.course_title != entry.title) {
            return Err(IndexError::UnknownCourse(stray.course_title.clone()));
        }

        let lock = self.title_lock(&entry.title);
        let _guard = lock.lock().await;

        if self.has_course(&entry.title).await? {
            return Ok(None);
        }

        let title_vector = (self.embed)(&entry.title).await?;
        let chunk_vectors = self.embed_chunks(chunks).await?;

        self.write_catalog_point(entry, title_vector).await?;
        match self.write_chunk_points(chunks, chunk_vectors).await {
            Ok(count) => Ok(Some(count)),
            Err(e) => {
                tracing::warn!(course = %entry.title, "chunk write failed, rolling back: {e}");
                self.remove_course_points(&entry.title, chunks.len()).await;
                Err(e)
            }
        }
    }

    async fn embed_chunks(&self, chunks: &[CourseChunk]) -> Result<Vec<Vec<f32>>, IndexError> {
        let pending: Vec<EmbedFuture> = chunks.iter().map(|c| (self.embed)(&c.content)).collect();
        let vectors: Vec<Vec<f32>> = futures::stream::iter(pending)
            .buffered(EMBED_CONCURRENCY)
            .try_collect()
            .await?;
        Ok(vectors)
    }

    async fn write_catalog_point(
        &self,
        entry: &CatalogEntry,
        vector: Vec<f32>,
    ) -> Result<(), IndexError> {
        let lessons_json = serde_json::to_string(&entry.lessons)
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        let mut payload = HashMap::from([
            ("title".to_owned(), serde_json::json!(entry.title)),
            ("lessons_json".to_owned(), serde_json::json!(lessons_json)),
            (
                "lesson_count".to_owned(),
                serde_json::json!(entry.lessons.len()),
            ),
        ]);
        if let Some(instructor) = &entry.instructor {
            payload.insert("instructor".into(), serde_json::json!(instructor));
        }
        if let Some(link) = &entry.course_link {
            payload.insert("course_link".into(), serde_json::json!(link));
        }

        self.backend
            .upsert(
                CATALOG_COLLECTION,
                vec![VectorPoint {
                    id: catalog_point_id(&entry.title),
                    vector,
                    payload,
                }],
            )
            .await?;
        Ok(())
    }

    async fn write_chunk_points(
        &self,
        chunks: &[CourseChunk],
        vectors: Vec<Vec<f32>>,
    ) -> Result<usize, IndexError> {
        let first_seq = self.reserve_seq(chunks.len());
        let points: Vec<VectorPoint> = chunks
            .iter()
            .zip(vectors)
            .zip(first_seq..)
            .map(|((chunk, vector), seq)| {
                let mut payload = HashMap::from([
                    ("course_title".to_owned(), serde_json::json!(chunk.course_title)),
                    ("chunk_index".to_owned(), serde_json::json!(chunk.chunk_index)),
                    ("content".to_owned(), serde_json::json!(chunk.content)),
                    ("seq".to_owned(), serde_json::json!(seq)),
                ]);
                if let Some(n) = chunk.lesson_number {
                    payload.insert("lesson_number".into(), serde_json::json!(n));
                }
                if let Some(link) = &chunk.lesson_link {
                    payload.insert("lesson_link".into(), serde_json::json!(link));
                }
                VectorPoint {
                    id: chunk_point_id(&chunk.course_title, chunk.chunk_index),
                    vector,
                    payload,
                }
            })
            .collect();

        let count = points.len();
        let mut points = points.into_iter().peekable();
        while points.peek().is_some() {
            let batch: Vec<VectorPoint> = points.by_ref().take(UPSERT_BATCH).collect();
            self.backend.upsert(CONTENT_COLLECTION, batch).await?;
        }
        Ok(count)
    }

    /// Best effort; a failed rollback is logged and the original error wins.
    async fn remove_course_points(&self, title: &str, chunk_count: usize) {
        let chunk_ids = (0..chunk_count).map(|i| chunk_point_id(title, i)).collect();
        if let Err(e) = self.backend.delete_by_ids(CONTENT_COLLECTION, chunk_ids).await {
            tracing::error!(course = %title, "failed to remove partial chunks: {e}");
        }
        if let Err(e) = self
            .backend
            .delete_by_ids(CATALOG_COLLECTION, vec![catalog_point_id(title)])
            .await
        {
            tracing::error!(course = %title, "failed to remove catalog record: {e}");
        }
    }

    /// First of `len` consecutive insertion sequence numbers. Seeded from the
    /// wall clock so numbers keep growing across restarts against a
    /// persistent backend.
    fn reserve_seq(&self, len: usize) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX));
        let len = len as u64;
        let prev = self
            .next_seq
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                Some(next.max(now).saturating_add(len))
            })
            .unwrap_or_else(|v| v);
        prev.max(now)
    }

    async fn has_course(&self, title: &str) -> Result<bool, IndexError> {
        let catalog = self.backend.scroll_all(CATALOG_COLLECTION, "title").await?;
        Ok(catalog.contains_key(title))
    }

    /// Nearest chunks to `query`, closest first. Equal distances keep
    /// insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Unavailable`] if embedding or search fails. An
    /// empty vector means the query was valid but nothing matched.
    pub async fn query_content(
        &self,
        query: &str,
        filter: &ContentFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let vector = (self.embed)(query).await?;
        let points = self
            .backend
            .search(
                CONTENT_COLLECTION,
                vector,
                limit.saturating_add(TIE_HEADROOM) as u64,
                filter.to_vector_filter(),
            )
            .await?;

        let mut results: Vec<(u64, ScoredChunk)> = points
            .into_iter()
            .filter_map(|p| {
                let payload = &p.payload;
                let Some(content) = payload.get("content").and_then(|v| v.as_str()) else {
                    tracing::warn!(id = %p.id, "content point without text payload skipped");
                    return None;
                };
                let seq = payload
                    .get("seq")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(u64::MAX);
                let chunk = ScoredChunk {
                    content: content.to_owned(),
                    course_title: payload
                        .get("course_title")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_owned(),
                    lesson_number: payload
                        .get("lesson_number")
                        .and_then(serde_json::Value::as_u64)
                        .and_then(|n| u32::try_from(n).ok()),
                    lesson_link: payload
                        .get("lesson_link")
                        .and_then(|v| v.as_str())
                        .map(str::to_owned),
                    chunk_index: payload
                        .get("chunk_index")
                        .and_then(serde_json::Value::as_u64)
                        .and_then(|n| usize::try_from(n).ok())
                        .unwrap_or_default(),
                    distance: 1.0 - p.score,
                };
                Some((seq, chunk))
            })
            .collect();
        results.sort_by(|(seq_a, a), (seq_b, b)| {
            a.distance.total_cmp(&b.distance).then(seq_a.cmp(seq_b))
        });
        Ok(results
            .into_iter()
            .take(limit)
            .map(|(_, chunk)| chunk)
            .collect())
    }

    /// The single catalog entry closest to `name`, with its distance.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Unavailable`] if embedding or search fails.
    pub async fn query_catalog_by_name(
        &self,
        name: &str,
    ) -> Result<Option<(CatalogEntry, f32)>, IndexError> {
        let vector = (self.embed)(name).await?;
        let best = self
            .backend
            .search(CATALOG_COLLECTION, vector, 1, None)
            .await?
            .into_iter()
            .next();
        Ok(best.and_then(|p| {
            let fields: HashMap<String, String> = p
                .payload
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_owned())))
                .collect();
            entry_from_fields(&fields).map(|e| (e, 1.0 - p.score))
        }))
    }

    /// # Errors
    ///
    /// Returns [`IndexError::Unavailable`] if the backend fails.
    pub async fn catalog_entry(&self, title: &str) -> Result<Option<CatalogEntry>, IndexError> {
        let catalog = self.backend.scroll_all(CATALOG_COLLECTION, "title").await?;
        Ok(catalog.get(title).and_then(entry_from_fields))
    }

    /// All catalogued titles in lexical order.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Unavailable`] if the backend fails.
    pub async fn course_titles(&self) -> Result<Vec<String>, IndexError> {
        let catalog = self.backend.scroll_all(CATALOG_COLLECTION, "title").await?;
        let mut titles: Vec<String> = catalog.into_keys().collect();
        titles.sort();
        Ok(titles)
    }

    /// # Errors
    ///
    /// Returns [`IndexError::Unavailable`] if the backend fails.
    pub async fn catalog_summary(&self) -> Result<CatalogSummary, IndexError> {
        let course_titles = self.course_titles().await?;
        Ok(CatalogSummary {
            total_courses: course_titles.len(),
            course_titles,
        })
    }
}

fn entry_from_fields(fields: &HashMap<String, String>) -> Option<CatalogEntry> {
    let title = fields.get("title")?.clone();
    let lessons: Vec<Lesson> = match fields.get("lessons_json") {
        Some(raw) => match serde_json::from_str(raw) {
            Ok(lessons) => lessons,
            Err(e) => {
                tracing::warn!(course = %title, "unreadable lesson list: {e}");
                Vec::new()
            }
        },
        None => Vec::new(),
    };
    Some(CatalogEntry {
        title,
        course_link: fields.get("course_link").cloned(),
        instructor: fields.get("instructor").cloned(),
        lessons,
    })
}
