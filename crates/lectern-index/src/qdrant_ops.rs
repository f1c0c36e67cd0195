//! Qdrant backend for the course index.

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId,
    PointStruct, PointsIdsList, ScoredPoint, ScrollPointsBuilder, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder, point_id::PointIdOptions, value::Kind,
};

use crate::vector_store::{
    BoxFuture, FieldCondition, FieldValue, ScoredVectorPoint, ScrollResult, VectorFilter,
    VectorPoint, VectorStore, VectorStoreError,
};

type QdrantResult<T> = Result<T, Box<qdrant_client::QdrantError>>;

const SCROLL_PAGE: u32 = 100;

/// Thin wrapper over [`Qdrant`] client encapsulating common collection operations.
#[derive(Clone)]
pub struct QdrantOps {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantOps").finish_non_exhaustive()
    }
}

impl QdrantOps {
    /// Create a new `QdrantOps` connected to the given URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn new(url: &str) -> QdrantResult<Self> {
        let client = Qdrant::from_url(url).build().map_err(Box::new)?;
        Ok(Self { client })
    }

    /// Ensure a collection exists with cosine distance vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if Qdrant cannot be reached or collection creation fails.
    pub async fn ensure_collection(&self, collection: &str, vector_size: u64) -> QdrantResult<()> {
        if self
            .client
            .collection_exists(collection)
            .await
            .map_err(Box::new)?
        {
            return Ok(());
        }
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
            )
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if Qdrant cannot be reached.
    pub async fn collection_exists(&self, collection: &str) -> QdrantResult<bool> {
        self.client
            .collection_exists(collection)
            .await
            .map_err(Box::new)
    }

    /// # Errors
    ///
    /// Returns an error if the collection cannot be deleted.
    pub async fn delete_collection(&self, collection: &str) -> QdrantResult<()> {
        self.client
            .delete_collection(collection)
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    /// Upsert points and wait until they are searchable.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn upsert(&self, collection: &str, points: Vec<PointStruct>) -> QdrantResult<()> {
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the search fails.
    pub async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<Filter>,
    ) -> QdrantResult<Vec<ScoredPoint>> {
        let mut builder = SearchPointsBuilder::new(collection, vector, limit).with_payload(true);
        if let Some(f) = filter {
            builder = builder.filter(f);
        }
        let results = self.client.search_points(builder).await.map_err(Box::new)?;
        Ok(results.result)
    }

    /// # Errors
    ///
    /// Returns an error if the points cannot be deleted.
    pub async fn delete_by_ids(&self, collection: &str, ids: Vec<PointId>) -> QdrantResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(PointsIdsList { ids })
                    .wait(true),
            )
            .await
            .map_err(Box::new)?;
        Ok(())
    }

    /// Scroll all points in a collection, extracting string payload fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the scroll operation fails.
    pub async fn scroll_all(&self, collection: &str, key_field: &str) -> QdrantResult<ScrollResult> {
        let mut result = HashMap::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(collection)
                .with_payload(true)
                .with_vectors(false)
                .limit(SCROLL_PAGE);
            if let Some(ref off) = offset {
                builder = builder.offset(off.clone());
            }

            let response = self.client.scroll(builder).await.map_err(Box::new)?;

            for point in &response.result {
                let Some(Kind::StringValue(key)) =
                    point.payload.get(key_field).and_then(|v| v.kind.as_ref())
                else {
                    continue;
                };
                let fields = point
                    .payload
                    .iter()
                    .filter_map(|(k, val)| match &val.kind {
                        Some(Kind::StringValue(s)) => Some((k.clone(), s.clone())),
                        _ => None,
                    })
                    .collect();
                result.insert(key.clone(), fields);
            }

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(result)
    }
}

impl VectorStore for QdrantOps {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.ensure_collection(&collection, vector_size)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.collection_exists(&collection)
                .await
                .map_err(|e| VectorStoreError::Connection(e.to_string()))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.delete_collection(&collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut qdrant_points = Vec::with_capacity(points.len());
            for p in points {
                let payload: HashMap<String, qdrant_client::qdrant::Value> =
                    serde_json::from_value(serde_json::Value::Object(
                        p.payload.into_iter().collect(),
                    ))
                    .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
                qdrant_points.push(PointStruct::new(p.id, p.vector, payload));
            }
            self.upsert(&collection, qdrant_points)
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let qdrant_filter = filter
                .filter(|f| !f.is_empty())
                .map(vector_filter_to_qdrant);
            let results = self
                .search(&collection, vector, limit, qdrant_filter)
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            Ok(results.into_iter().map(scored_point_to_vector).collect())
        })
    }

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let ids: Vec<PointId> = ids.into_iter().map(PointId::from).collect();
            self.delete_by_ids(&collection, ids)
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))
        })
    }

    fn scroll_all(
        &self,
        collection: &str,
        key_field: &str,
    ) -> BoxFuture<'_, Result<ScrollResult, VectorStoreError>> {
        let collection = collection.to_owned();
        let key_field = key_field.to_owned();
        Box::pin(async move {
            self.scroll_all(&collection, &key_field)
                .await
                .map_err(|e| VectorStoreError::Scroll(e.to_string()))
        })
    }
}

fn vector_filter_to_qdrant(filter: VectorFilter) -> Filter {
    Filter {
        must: filter
            .must
            .into_iter()
            .map(field_condition_to_qdrant)
            .collect(),
        must_not: filter
            .must_not
            .into_iter()
            .map(field_condition_to_qdrant)
            .collect(),
        ..Filter::default()
    }
}

fn field_condition_to_qdrant(cond: FieldCondition) -> Condition {
    match cond.value {
        FieldValue::Integer(v) => Condition::matches(cond.field, v),
        FieldValue::Text(v) => Condition::matches(cond.field, v),
    }
}

fn scored_point_to_vector(point: ScoredPoint) -> ScoredVectorPoint {
    let payload: HashMap<String, serde_json::Value> = point
        .payload
        .into_iter()
        .filter_map(|(k, v)| {
            let json_val = match v.kind? {
                Kind::StringValue(s) => serde_json::Value::String(s),
                Kind::IntegerValue(i) => serde_json::Value::Number(i.into()),
                Kind::DoubleValue(d) => {
                    serde_json::Number::from_f64(d).map(serde_json::Value::Number)?
                }
                Kind::BoolValue(b) => serde_json::Value::Bool(b),
                _ => return None,
            };
            Some((k, json_val))
        })
        .collect();

    let id = match point.id.and_then(|pid| pid.point_id_options) {
        Some(PointIdOptions::Uuid(u)) => u,
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    };

    ScoredVectorPoint {
        id,
        score: point.score,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_valid_url() {
        assert!(QdrantOps::new("http://localhost:6334").is_ok());
    }

    #[test]
    fn debug_hides_client() {
        let ops = QdrantOps::new("http://localhost:6334").unwrap();
        assert_eq!(format!("{ops:?}"), "QdrantOps { .. }");
    }

    #[test]
    fn filter_conversion_keeps_all_conditions() {
        let filter = VectorFilter {
            must: vec![
                FieldCondition {
                    field: "course_title".into(),
                    value: FieldValue::Text("Intro to Testing".into()),
                },
                FieldCondition {
                    field: "lesson_number".into(),
                    value: FieldValue::Integer(1),
                },
            ],
            must_not: vec![],
        };
        let q = vector_filter_to_qdrant(filter);
        assert_eq!(q.must.len(), 2);
        assert!(q.must_not.is_empty());
    }

    #[test]
    fn scored_point_payload_is_converted() {
        let mut payload = HashMap::new();
        payload.insert(
            "course_title".to_owned(),
            qdrant_client::qdrant::Value::from("Intro to Testing"),
        );
        payload.insert(
            "lesson_number".to_owned(),
            qdrant_client::qdrant::Value::from(1_i64),
        );
        let point = ScoredPoint {
            id: Some(PointId::from("7b0e8a5c-4b3e-5b0c-9f6a-1d2e3f4a5b6c".to_owned())),
            payload,
            score: 0.75,
            ..ScoredPoint::default()
        };
        let converted = scored_point_to_vector(point);
        assert_eq!(converted.id, "7b0e8a5c-4b3e-5b0c-9f6a-1d2e3f4a5b6c");
        assert_eq!(converted.payload["course_title"], "Intro to Testing");
        assert_eq!(converted.payload["lesson_number"], 1);
        assert!((converted.score - 0.75).abs() < f32::EPSILON);
    }
}
