use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::database::MemoryStore;

/// Deterministic embedder: character histogram over a few buckets.
struct HashEmbedder {
    dimension: usize,
    calls: AtomicUsize,
}

impl HashEmbedder {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Embedder for HashEmbedder {
    fn model(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; self.dimension];
                for c in text.chars() {
                    vector[c as usize % self.dimension] += 1.0;
                }
                vector
            })
            .collect())
    }
}

fn corpus() -> Vec<Document> {
    (0..11)
        .map(|i| {
            let body = format!("Document {i} explains topic number {i}. ").repeat(i + 1);
            Document::new(body, format!("data/doc-{i:02}.pdf"), 0)
        })
        .collect()
}

fn config(batch_size: usize) -> Config {
    let mut config = Config::default();
    config.embedding.batch_size = batch_size;
    config.retrieval.collection = "test_collection".to_string();
    config.chunking = ChunkingConfig {
        chunk_size: 120,
        chunk_overlap: 30,
    };
    config
}

#[tokio::test]
async fn count_matches_sum_of_chunks() {
    let documents = corpus();
    let config = config(4);
    let expected: usize = documents
        .iter()
        .map(|d| {
            crate::embeddings::chunk_document(d, &config.chunking)
                .expect("should chunk")
                .len()
        })
        .sum();

    let store = Arc::new(MemoryStore::new());
    let ingestor = Ingestor::new(Arc::new(HashEmbedder::new(8)), store.clone(), &config);
    let report = ingestor
        .ingest_documents(&documents)
        .await
        .expect("ingestion should succeed");

    assert_eq!(report.sources, 11);
    assert_eq!(report.pages, 11);
    assert_eq!(report.chunks, expected);
    assert_eq!(report.records_written, expected);
    assert_eq!(report.collection_count, expected);
    assert_eq!(report.batches, expected.div_ceil(4));
    assert_eq!(
        store.count("test_collection").await.expect("count"),
        expected
    );
}

#[tokio::test]
async fn reingestion_is_idempotent() {
    let documents = corpus();
    let config = config(5);
    let store = Arc::new(MemoryStore::new());
    let ingestor = Ingestor::new(Arc::new(HashEmbedder::new(8)), store.clone(), &config);

    let first = ingestor
        .ingest_documents(&documents)
        .await
        .expect("first ingestion");
    let second = ingestor
        .ingest_documents(&documents)
        .await
        .expect("second ingestion");

    assert_eq!(first.collection_count, second.collection_count);
    assert_eq!(second.records_written, first.records_written);
}

#[tokio::test]
async fn single_short_page_is_one_record() {
    let store = Arc::new(MemoryStore::new());
    let ingestor = Ingestor::new(Arc::new(HashEmbedder::new(8)), store.clone(), &config(64));

    let report = ingestor
        .ingest_documents(&[Document::new("A single short page.", "data/one.pdf", 0)])
        .await
        .expect("ingestion should succeed");

    assert_eq!(report.chunks, 1);
    assert_eq!(store.count("test_collection").await.expect("count"), 1);
}

#[tokio::test]
async fn batches_are_embedded_separately() {
    let embedder = Arc::new(HashEmbedder::new(8));
    let store = Arc::new(MemoryStore::new());
    let ingestor = Ingestor::new(embedder.clone(), store, &config(3));

    let report = ingestor
        .ingest_documents(&corpus())
        .await
        .expect("ingestion should succeed");

    assert_eq!(embedder.calls.load(Ordering::SeqCst), report.batches);
}

#[tokio::test]
async fn dimension_change_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let documents = corpus();

    Ingestor::new(Arc::new(HashEmbedder::new(8)), store.clone(), &config(8))
        .ingest_documents(&documents)
        .await
        .expect("first model should ingest");

    let err = Ingestor::new(Arc::new(HashEmbedder::new(16)), store, &config(8))
        .ingest_documents(&documents)
        .await
        .expect_err("different dimension must fail");
    assert!(matches!(err, RagError::DimensionMismatch { .. }));
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn dry_run_counts_without_services() {
    let documents = corpus();
    let report = dry_run("preview", &documents, &config(4).chunking, 4).expect("dry run");

    assert_eq!(report.collection, "preview");
    assert_eq!(report.pages, 11);
    assert!(report.chunks >= 11);
    assert_eq!(report.records_written, 0);
}
