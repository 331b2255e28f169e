
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{
    Collection, DistanceMetric, ScoredRecord, StoredRecord, VectorStore, check_dimensions,
    check_query_dimension, dedupe_by_id,
};
use crate::{RagError, Result};

#[derive(Debug)]
struct MemoryCollection {
    info: Collection,
    records: Vec<StoredRecord>,
}

/// Brute-force vector store held in process memory.
///
/// Behaves like the pgvector store (atomic upserts, ties broken by id) and
/// is used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
        distance: DistanceMetric,
    ) -> Result<Collection> {
        let mut collections = self.collections.write().await;

        if let Some(existing) = collections.get(name) {
            if existing.info.dimension != dimension {
                return Err(RagError::DimensionMismatch {
                    collection: name.to_string(),
                    expected: existing.info.dimension,
                    actual: dimension,
                });
            }
            return Ok(existing.info.clone());
        }

        let info = Collection {
            id: Uuid::new_v4(),
            name: name.to_string(),
            dimension,
            distance,
            created_at: Utc::now(),
        };
        debug!("Created in-memory collection {} ({} dims)", name, dimension);
        collections.insert(
            name.to_string(),
            MemoryCollection {
                info: info.clone(),
                records: Vec::new(),
            },
        );
        Ok(info)
    }

    async fn collection(&self, name: &str) -> Result<Option<Collection>> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|c| c.info.clone()))
    }

    async fn upsert(&self, collection: &str, records: &[StoredRecord]) -> Result<usize> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| RagError::Data(format!("Collection '{}' does not exist", collection)))?;

        check_dimensions(&target.info, records)?;

        let incoming = dedupe_by_id(records);
        target
            .records
            .retain(|existing| !incoming.iter().any(|r| r.id == existing.id));
        target.records.extend(incoming.iter().map(|r| (*r).clone()));

        Ok(incoming.len())
    }

    async fn similarity_search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let collections = self.collections.read().await;
        let Some(target) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        if k == 0 || target.records.is_empty() {
            return Ok(Vec::new());
        }
        check_query_dimension(&target.info, query)?;

        let metric = target.info.distance;
        let mut scored: Vec<ScoredRecord> = target
            .records
            .iter()
            .map(|record| ScoredRecord {
                distance: metric.distance(query, &record.embedding),
                record: record.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map_or(0, |c| c.records.len()))
    }

    async fn delete(&self, collection: &str, ids: &[Uuid]) -> Result<usize> {
        let mut collections = self.collections.write().await;
        let Some(target) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let before = target.records.len();
        target.records.retain(|record| !ids.contains(&record.id));
        Ok(before - target.records.len())
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        let mut collections = self.collections.write().await;
        Ok(collections.remove(name).is_some())
    }
}
