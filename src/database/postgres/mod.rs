// PostgreSQL + pgvector store
// Schema lives in ./migrations and is applied on connect


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use sqlx::types::Json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    Collection, DistanceMetric, ScoredRecord, StoredRecord, VectorStore, check_dimensions,
    check_query_dimension, dedupe_by_id,
};
use crate::config::DatabaseConfig;
use crate::embeddings::chunking::ChunkMetadata;
use crate::{RagError, Result};

const DATABASE_TARGET: &str = "PostgreSQL";
// Replaces the whole row when the id already exists in the collection
const UPSERT_RECORD: &str = "INSERT INTO rag_embeddings (collection_id, id, document, cmetadata, embedding) \
     VALUES ($1, $2, $3, $4, $5) \
     ON CONFLICT (collection_id, id) DO UPDATE SET \
     document = EXCLUDED.document, cmetadata = EXCLUDED.cmetadata, embedding = EXCLUDED.embedding";
const REACHABILITY_HINT: &str = "Check that the PostgreSQL/pgvector database is reachable and that POSTGRES_CONNECTION is correct";

/// Versions reported by the connected server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub postgres_version: String,
    pub pgvector_version: String,
}

#[derive(Debug, Clone)]
pub struct PgVectorStore {
    pool: PgPool,
}

impl PgVectorStore {
    /// Connect, make sure the `vector` extension exists and apply migrations.
    #[inline]
    pub async fn connect(database_url: &str, config: &DatabaseConfig) -> Result<Self> {
        debug!(
            "Connecting to PostgreSQL (max {} connections)",
            config.max_connections
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_with(connect_options(database_url, config)?)
            .await
            .map_err(|e| connectivity_error(&e))?;

        let store = Self { pool };
        store.ensure_extension().await?;
        store.run_migrations().await?;

        info!("Connected to PostgreSQL vector store");
        Ok(store)
    }

    #[inline]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    #[inline]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        debug!("Running vector store migrations");
        sqlx::migrate!("src/database/postgres/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RagError::Database(format!("Failed to run schema migration: {}", e)))?;
        Ok(())
    }

    async fn ensure_extension(&self) -> Result<()> {
        if self.extension_version().await?.is_some() {
            return Ok(());
        }

        warn!("pgvector extension not installed, attempting to create it");
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(|e| RagError::MissingExtension(e.to_string()))?;
        Ok(())
    }

    async fn extension_version(&self) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT extversion FROM pg_extension WHERE extname = 'vector'",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RagError::database("Failed to query pg_extension", &e))
    }

    /// PostgreSQL server version and installed pgvector version
    #[inline]
    pub async fn server_info(&self) -> Result<ServerInfo> {
        let postgres_version = sqlx::query_scalar::<_, String>("SELECT version()")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RagError::database("Failed to query server version", &e))?;

        let pgvector_version = self
            .extension_version()
            .await?
            .ok_or_else(|| RagError::MissingExtension("extension 'vector' is not installed".to_string()))?;

        Ok(ServerInfo {
            postgres_version,
            pgvector_version,
        })
    }

    async fn has_records(&self, collection_id: Uuid) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM rag_embeddings WHERE collection_id = $1)",
        )
        .bind(collection_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RagError::database("Failed to inspect collection", &e))
    }

    #[inline]
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn connectivity_error(error: &dyn std::fmt::Display) -> RagError {
    RagError::Connectivity {
        target: DATABASE_TARGET.to_string(),
        message: error.to_string(),
        hint: REACHABILITY_HINT.to_string(),
    }
}

/// Parse `database_url` and bound every statement on its connections by
/// the configured query timeout.
pub(crate) fn connect_options(
    database_url: &str,
    config: &DatabaseConfig,
) -> Result<PgConnectOptions> {
    let options = database_url
        .parse::<PgConnectOptions>()
        .map_err(|e| connectivity_error(&e))?;
    let millis = config.query_timeout().as_millis();

    Ok(options.options([("statement_timeout", millis.to_string())]))
}

fn collection_from_row(row: &PgRow) -> Result<Collection> {
    let dimension: i32 = row
        .try_get("dimension")
        .map_err(|e| RagError::database("Failed to decode collection dimension", &e))?;
    let distance: String = row
        .try_get("distance")
        .map_err(|e| RagError::database("Failed to decode collection distance", &e))?;

    Ok(Collection {
        id: row
            .try_get::<Uuid, _>("id")
            .map_err(|e| RagError::database("Failed to decode collection id", &e))?,
        name: row
            .try_get("name")
            .map_err(|e| RagError::database("Failed to decode collection name", &e))?,
        dimension: usize::try_from(dimension)
            .map_err(|_| RagError::Data(format!("Invalid stored dimension {}", dimension)))?,
        distance: distance.parse()?,
        created_at: row
            .try_get::<DateTime<Utc>, _>("created_at")
            .map_err(|e| RagError::database("Failed to decode collection timestamp", &e))?,
    })
}

fn scored_from_row(row: &PgRow) -> Result<ScoredRecord> {
    let embedding: Vector = row
        .try_get("embedding")
        .map_err(|e| RagError::database("Failed to decode embedding", &e))?;
    let Json(metadata) = row
        .try_get::<Json<ChunkMetadata>, _>("cmetadata")
        .map_err(|e| RagError::database("Failed to decode record metadata", &e))?;
    let distance: f64 = row
        .try_get("distance")
        .map_err(|e| RagError::database("Failed to decode distance", &e))?;

    Ok(ScoredRecord {
        record: StoredRecord {
            id: row
                .try_get("id")
                .map_err(|e| RagError::database("Failed to decode record id", &e))?,
            text: row
                .try_get("document")
                .map_err(|e| RagError::database("Failed to decode record text", &e))?,
            embedding: embedding.to_vec(),
            metadata,
        },
        distance: distance as f32,
    })
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
        distance: DistanceMetric,
    ) -> Result<Collection> {
        let dimension_column = i32::try_from(dimension)
            .map_err(|_| RagError::Data(format!("Dimension {} is too large", dimension)))?;

        // A concurrent creator may win the race; the unique name keeps one row
        sqlx::query(
            "INSERT INTO rag_collections (id, name, dimension, distance) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (name) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(dimension_column)
        .bind(distance.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| RagError::database("Failed to create collection", &e))?;

        let collection = self.collection(name).await?.ok_or_else(|| {
            RagError::Database(format!("Collection '{}' vanished after creation", name))
        })?;

        if collection.dimension != dimension {
            return Err(RagError::DimensionMismatch {
                collection: name.to_string(),
                expected: collection.dimension,
                actual: dimension,
            });
        }
        if collection.distance != distance {
            warn!(
                "Collection {} uses {} distance; ignoring requested {}",
                name, collection.distance, distance
            );
        }

        Ok(collection)
    }

    async fn collection(&self, name: &str) -> Result<Option<Collection>> {
        let row = sqlx::query(
            "SELECT id, name, dimension, distance, created_at FROM rag_collections WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RagError::database("Failed to look up collection", &e))?;

        row.as_ref().map(collection_from_row).transpose()
    }

    async fn upsert(&self, collection: &str, records: &[StoredRecord]) -> Result<usize> {
        let target = self
            .collection(collection)
            .await?
            .ok_or_else(|| RagError::Data(format!("Collection '{}' does not exist", collection)))?;

        check_dimensions(&target, records)?;
        let records = dedupe_by_id(records);
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RagError::database("Failed to begin transaction", &e))?;

        for record in &records {
            sqlx::query(UPSERT_RECORD)
                .bind(target.id)
                .bind(record.id)
                .bind(&record.text)
                .bind(Json(&record.metadata))
                .bind(Vector::from(record.embedding.clone()))
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    RagError::database(&format!("Failed to upsert record {}", record.id), &e)
                })?;
        }

        tx.commit()
            .await
            .map_err(|e| RagError::database("Failed to commit batch", &e))?;

        debug!("Upserted {} records into {}", records.len(), collection);
        Ok(records.len())
    }

    async fn similarity_search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let Some(target) = self.collection(collection).await? else {
            debug!("Collection {} does not exist, returning no matches", collection);
            return Ok(Vec::new());
        };
        if k == 0 || !self.has_records(target.id).await? {
            return Ok(Vec::new());
        }
        check_query_dimension(&target, query)?;

        let limit = i64::try_from(k).unwrap_or(i64::MAX);
        let sql = format!(
            "SELECT id, document, cmetadata, embedding, \
                (embedding {op} $2)::float8 AS distance \
             FROM rag_embeddings \
             WHERE collection_id = $1 \
             ORDER BY embedding {op} $2 ASC, id ASC \
             LIMIT $3",
            op = target.distance.operator()
        );

        let rows = sqlx::query(&sql)
            .bind(target.id)
            .bind(Vector::from(query.to_vec()))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RagError::database("Similarity search failed", &e))?;

        rows.iter().map(scored_from_row).collect()
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM rag_embeddings e \
             JOIN rag_collections c ON c.id = e.collection_id \
             WHERE c.name = $1",
        )
        .bind(collection)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RagError::database("Failed to count records", &e))?;

        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn delete(&self, collection: &str, ids: &[Uuid]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "DELETE FROM rag_embeddings e USING rag_collections c \
             WHERE c.id = e.collection_id AND c.name = $1 AND e.id = ANY($2)",
        )
        .bind(collection)
        .bind(ids.to_vec())
        .execute(&self.pool)
        .await
        .map_err(|e| RagError::database("Failed to delete records", &e))?;

        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM rag_collections WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| RagError::database("Failed to drop collection", &e))?;

        if result.rows_affected() > 0 {
            info!("Dropped collection {}", name);
        }
        Ok(result.rows_affected() > 0)
    }
}
