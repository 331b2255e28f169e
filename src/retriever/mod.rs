
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::database::{ScoredRecord, VectorStore};
use crate::embeddings::Embedder;
use crate::{RagError, Result};

/// Records retrieved for one query, nearest first
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub query: String,
    pub matches: Vec<ScoredRecord>,
}

impl RetrievalResult {
    #[inline]
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            matches: Vec::new(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.matches.len()
    }
}

/// Embeds a query and looks up its nearest chunks in one collection.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    collection: String,
    top_k: usize,
}

impl Retriever {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            collection: collection.into(),
            top_k,
        }
    }

    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Embed `query` on a blocking thread.
    #[inline]
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || embedder.embed_query(&query))
            .await
            .map_err(|e| RagError::Other(e.into()))?
    }

    /// Nearest records for an already embedded query.
    #[inline]
    pub async fn search(&self, query: &str, vector: &[f32]) -> Result<RetrievalResult> {
        let started = Instant::now();
        let matches = self
            .store
            .similarity_search(&self.collection, vector, self.top_k)
            .await?;

        info!(
            "Retrieved {} chunk(s) from {} in {:.2?}",
            matches.len(),
            self.collection,
            started.elapsed()
        );
        Ok(RetrievalResult {
            query: query.to_string(),
            matches,
        })
    }

    /// Embed `query` and return up to `top_k` nearest records.
    #[inline]
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        let vector = self.embed_query(query).await?;
        self.search(query, &vector).await
    }
}
