#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use indicatif::ProgressBar;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::{DistanceMetric, StoredRecord, VectorStore};
use crate::documents::{self, Document};
use crate::embeddings::{Chunk, ChunkingConfig, Embedder, chunk_documents};
use crate::{RagError, Result};

/// Outcome of one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub collection: String,
    /// Distinct source files
    pub sources: usize,
    pub pages: usize,
    pub chunks: usize,
    pub batches: usize,
    /// Records written by this run
    pub records_written: usize,
    /// Records in the collection afterwards
    pub collection_count: usize,
}

/// Loads, chunks, embeds and stores documents in one collection.
///
/// Batches are independent: each is embedded and upserted atomically, with
/// up to `concurrency` batches in flight.
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    collection: String,
    distance: DistanceMetric,
    chunking: ChunkingConfig,
    batch_size: usize,
    concurrency: usize,
    progress: ProgressBar,
}

impl Ingestor {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, config: &Config) -> Self {
        Self {
            embedder,
            store,
            collection: config.retrieval.collection.clone(),
            distance: config.retrieval.distance,
            chunking: config.chunking.clone(),
            batch_size: config.embedding.batch_size.max(1),
            concurrency: config.ingest.concurrency.max(1),
            progress: ProgressBar::hidden(),
        }
    }

    #[inline]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Report batch progress on `progress` (length is set per run)
    #[inline]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Load every PDF in `dir` and ingest its pages.
    #[inline]
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestReport> {
        let documents = load_documents(dir).await?;
        self.ingest_documents(&documents).await
    }

    /// Chunk, embed and upsert `documents`.
    ///
    /// Re-ingesting the same documents replaces their records, so the
    /// collection count does not grow.
    #[inline]
    pub async fn ingest_documents(&self, documents: &[Document]) -> Result<IngestReport> {
        let chunks = chunk_documents(documents, &self.chunking)?;
        let mut report = plan(&self.collection, documents, &chunks, self.batch_size);

        let collection = self
            .store
            .ensure_collection(&self.collection, self.embedder.dimension(), self.distance)
            .await?;
        debug!(
            "Ingesting {} chunks into {} ({} dims, {})",
            chunks.len(),
            collection.name,
            collection.dimension,
            collection.distance
        );

        self.progress.set_length(report.batches as u64);
        self.progress.set_position(0);

        let written: Vec<usize> = stream::iter(chunks.chunks(self.batch_size))
            .map(|batch| self.ingest_batch(batch))
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;
        self.progress.finish_and_clear();

        report.records_written = written.iter().sum();
        report.collection_count = self.store.count(&self.collection).await?;

        info!(
            "Ingested {} chunks from {} pages into {} ({} records total)",
            report.chunks, report.pages, report.collection, report.collection_count
        );
        Ok(report)
    }

    async fn ingest_batch(&self, batch: &[Chunk]) -> Result<usize> {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
        let embedder = Arc::clone(&self.embedder);
        let embeddings = tokio::task::spawn_blocking(move || embedder.embed_documents(&texts))
            .await
            .map_err(|e| RagError::Other(e.into()))??;

        if embeddings.len() != batch.len() {
            return Err(RagError::MalformedResponse {
                service: self.embedder.model().to_string(),
                message: format!(
                    "{} embeddings returned for {} chunks",
                    embeddings.len(),
                    batch.len()
                ),
            });
        }

        let records: Vec<StoredRecord> = batch
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| StoredRecord {
                id: chunk.record_id(),
                text: chunk.text.clone(),
                embedding,
                metadata: chunk.metadata.clone(),
            })
            .collect();

        let written = self.store.upsert(&self.collection, &records).await?;
        self.progress.inc(1);
        Ok(written)
    }
}

/// Load PDFs on a blocking thread.
#[inline]
pub async fn load_documents(dir: &Path) -> Result<Vec<Document>> {
    let dir: PathBuf = dir.to_path_buf();
    tokio::task::spawn_blocking(move || documents::load_directory(&dir))
        .await
        .map_err(|e| RagError::Other(e.into()))?
}

/// Counts for ingesting `documents` without touching any service.
#[inline]
pub fn dry_run(
    collection: &str,
    documents: &[Document],
    chunking: &ChunkingConfig,
    batch_size: usize,
) -> Result<IngestReport> {
    let chunks = chunk_documents(documents, chunking)?;
    Ok(plan(collection, documents, &chunks, batch_size.max(1)))
}

fn plan(
    collection: &str,
    documents: &[Document],
    chunks: &[Chunk],
    batch_size: usize,
) -> IngestReport {
    let mut sources: Vec<&str> = documents
        .iter()
        .map(|d| d.metadata.source.as_str())
        .collect();
    sources.sort_unstable();
    sources.dedup();

    IngestReport {
        collection: collection.to_string(),
        sources: sources.len(),
        pages: documents.len(),
        chunks: chunks.len(),
        batches: chunks.len().div_ceil(batch_size),
        records_written: 0,
        collection_count: 0,
    }
}
