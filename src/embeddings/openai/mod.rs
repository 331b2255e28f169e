
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::http;
use crate::retry::RetryPolicy;
use crate::{RagError, Result};

const SERVICE: &str = "OpenAI embeddings";

/// Client for an OpenAI-compatible `/embeddings` endpoint
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
    batch_size: usize,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbedder {
    #[inline]
    pub fn new(config: &EmbeddingConfig, api_key: &str, retry: RetryPolicy) -> Self {
        Self {
            agent: http::agent(config.timeout()),
            endpoint: http::endpoint(&config.base_url, "embeddings"),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
            retry,
        }
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };
        let body = serde_json::to_string(&request).map_err(|e| RagError::Other(e.into()))?;

        let text = self.retry.run(SERVICE, || {
            let response =
                http::post_json(&self.agent, &self.endpoint, &self.api_key, &body, SERVICE)?;
            http::read_body(response, SERVICE)
        })?;

        let mut parsed: EmbeddingResponse =
            serde_json::from_str(&text).map_err(|e| RagError::MalformedResponse {
                service: SERVICE.to_string(),
                message: format!("invalid JSON: {}", e),
            })?;

        if parsed.data.len() != inputs.len() {
            return Err(RagError::MalformedResponse {
                service: SERVICE.to_string(),
                message: format!(
                    "{} embeddings returned for {} inputs",
                    parsed.data.len(),
                    inputs.len()
                ),
            });
        }

        parsed.data.sort_by_key(|entry| entry.index);
        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|entry| entry.embedding).collect();

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(RagError::DimensionMismatch {
                collection: self.model.clone(),
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        Ok(vectors)
    }
}

impl Embedder for OpenAiEmbedder {
    #[inline]
    fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts with {}", texts.len(), self.model);
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch)?);
        }

        debug!("Embedded {} texts", vectors.len());
        Ok(vectors)
    }
}
