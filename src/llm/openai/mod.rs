
use std::io::BufReader;

use serde::Serialize;
use tracing::debug;

use super::{ChatMessage, ChatModel, ChatStream};
use crate::config::ChatConfig;
use crate::http;
use crate::retry::RetryPolicy;
use crate::{RagError, Result};

const SERVICE: &str = "OpenAI chat";

/// Streaming client for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

impl OpenAiChat {
    #[inline]
    pub fn new(config: &ChatConfig, api_key: &str, retry: RetryPolicy) -> Self {
        Self {
            agent: http::agent(config.timeout()),
            endpoint: http::endpoint(&config.base_url, "chat/completions"),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            retry,
        }
    }
}

impl ChatModel for OpenAiChat {
    #[inline]
    fn model(&self) -> &str {
        &self.model
    }

    /// Open a completion stream. Only opening the stream is retried; a
    /// failure after the first fragment ends the stream with an error.
    #[inline]
    fn stream(&self, messages: &[ChatMessage]) -> Result<ChatStream> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stream: true,
        };
        let body = serde_json::to_string(&request).map_err(|e| RagError::Other(e.into()))?;

        debug!(
            "Requesting completion from {} with {} messages",
            self.model,
            messages.len()
        );
        let response = self.retry.run(SERVICE, || {
            http::post_json(&self.agent, &self.endpoint, &self.api_key, &body, SERVICE)
        })?;

        let reader = BufReader::new(response.into_body().into_reader());
        Ok(ChatStream::from_reader(reader, SERVICE))
    }
}
