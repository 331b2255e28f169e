// Database module
// Vector storage behind the VectorStore trait: pgvector for real runs, memory for tests and dry runs


pub mod memory;
pub mod postgres;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embeddings::chunking::ChunkMetadata;
use crate::{RagError, Result};

pub use memory::MemoryStore;
pub use postgres::{PgVectorStore, ServerInfo};

/// Distance function used for nearest-neighbour search, fixed per collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
}

impl DistanceMetric {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
        }
    }

    /// pgvector operator implementing this metric
    #[inline]
    pub fn operator(self) -> &'static str {
        match self {
            Self::Cosine => "<=>",
            Self::L2 => "<->",
        }
    }

    /// Distance between two vectors of equal length. Smaller is closer.
    #[inline]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let mut dot = 0.0_f32;
                let mut norm_a = 0.0_f32;
                let mut norm_b = 0.0_f32;
                for (x, y) in a.iter().zip(b) {
                    dot += x * y;
                    norm_a += x * x;
                    norm_b += y * y;
                }
                let denominator = norm_a.sqrt() * norm_b.sqrt();
                if denominator == 0.0 {
                    // pgvector returns NaN here; treat a zero vector as maximally distant
                    1.0
                } else {
                    1.0 - dot / denominator
                }
            }
            Self::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

impl fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = RagError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "l2" | "euclidean" => Ok(Self::L2),
            other => Err(RagError::Data(format!("Unknown distance metric: {}", other))),
        }
    }
}

/// Named namespace grouping the records of one knowledge base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub id: Uuid,
    pub name: String,
    pub dimension: usize,
    pub distance: DistanceMetric,
    pub created_at: DateTime<Utc>,
}

/// A chunk together with its embedding, as persisted in the store.
///
/// Records are immutable once written; re-ingestion replaces them by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: Uuid,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A record returned by similarity search with its distance to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: StoredRecord,
    pub distance: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return the named collection, creating it with `dimension` and
    /// `distance` when it does not exist yet. An existing collection with a
    /// different dimension is a [`RagError::DimensionMismatch`].
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
        distance: DistanceMetric,
    ) -> Result<Collection>;

    async fn collection(&self, name: &str) -> Result<Option<Collection>>;

    /// Write `records` atomically, replacing any records with the same ids.
    /// Returns the number of records written.
    async fn upsert(&self, collection: &str, records: &[StoredRecord]) -> Result<usize>;

    /// Up to `k` records ordered by non-decreasing distance. An unknown or
    /// empty collection yields an empty result.
    async fn similarity_search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>>;

    async fn count(&self, collection: &str) -> Result<usize>;

    /// Delete records by id, returning how many existed.
    async fn delete(&self, collection: &str, ids: &[Uuid]) -> Result<usize>;

    /// Drop a collection and all its records. Returns false if it did not exist.
    async fn delete_collection(&self, name: &str) -> Result<bool>;
}

/// Reject any record whose embedding does not match the collection dimension.
pub(crate) fn check_dimensions(collection: &Collection, records: &[StoredRecord]) -> Result<()> {
    if let Some(bad) = records
        .iter()
        .find(|record| record.embedding.len() != collection.dimension)
    {
        return Err(RagError::DimensionMismatch {
            collection: collection.name.clone(),
            expected: collection.dimension,
            actual: bad.embedding.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_query_dimension(collection: &Collection, query: &[f32]) -> Result<()> {
    if query.len() != collection.dimension {
        return Err(RagError::DimensionMismatch {
            collection: collection.name.clone(),
            expected: collection.dimension,
            actual: query.len(),
        });
    }
    Ok(())
}

/// Keep only the last record written for each id.
pub(crate) fn dedupe_by_id(records: &[StoredRecord]) -> Vec<&StoredRecord> {
    let mut latest = std::collections::HashMap::with_capacity(records.len());
    for (position, record) in records.iter().enumerate() {
        latest.insert(record.id, position);
    }

    records
        .iter()
        .enumerate()
        .filter(|(position, record)| latest.get(&record.id) == Some(position))
        .map(|(_, record)| record)
        .collect()
}
