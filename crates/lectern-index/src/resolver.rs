use std::sync::Arc;

use crate::course::CatalogEntry;
use crate::store::CourseStore;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCourse {
    pub entry: CatalogEntry,
    pub distance: f32,
}

impl ResolvedCourse {
    #[must_use]
    pub fn title(&self) -> &str {
        &self.entry.title
    }
}

/// Maps a fuzzy course name to a catalogued title via semantic lookup.
///
/// Without `max_distance` the closest entry always wins, however far away.
#[derive(Debug, Clone)]
pub struct CourseResolver {
    store: Arc<CourseStore>,
    max_distance: Option<f32>,
}

impl CourseResolver {
    #[must_use]
    pub fn new(store: Arc<CourseStore>) -> Self {
        Self {
            store,
            max_distance: None,
        }
    }

    #[must_use]
    pub fn with_max_distance(mut self, max_distance: Option<f32>) -> Self {
        self.max_distance = max_distance;
        self
    }

    /// `None` when the catalog is empty, the backend fails, or the best match
    /// is farther than the configured threshold.
    pub async fn resolve(&self, name: &str) -> Option<ResolvedCourse> {
        let best = match self.store.query_catalog_by_name(name).await {
            Ok(best) => best,
            Err(e) => {
                tracing::warn!(name, "course resolution failed: {e}");
                return None;
            }
        };
        let (entry, distance) = best?;

        if let Some(max) = self.max_distance
            && distance > max
        {
            tracing::debug!(name, closest = %entry.title, distance, max, "course match rejected");
            return None;
        }
        tracing::debug!(name, resolved = %entry.title, distance, "course resolved");
        Some(ResolvedCourse { entry, distance })
    }
}
