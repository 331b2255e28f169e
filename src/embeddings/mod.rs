// Embeddings module
// Text chunking and the remote embedding client

pub mod chunking;
pub mod openai;

pub use chunking::{
    Chunk, ChunkMetadata, ChunkingConfig, TextWindow, chunk_document, chunk_documents, split_text,
};
pub use openai::OpenAiEmbedder;

use crate::Result;

/// Turns text into fixed-length vectors.
///
/// Calls are blocking; async callers should go through
/// `tokio::task::spawn_blocking`.
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    /// Length of every vector this embedder returns
    fn dimension(&self) -> usize;

    /// One vector per input, in input order.
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    #[inline]
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_documents(&[text.to_string()])?;
        vectors.pop().ok_or_else(|| crate::RagError::MalformedResponse {
            service: self.model().to_string(),
            message: "no embedding returned for query".to_string(),
        })
    }
}
