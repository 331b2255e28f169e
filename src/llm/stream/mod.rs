
use std::fmt;
use std::io::BufRead;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{RagError, Result};

const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

/// Text fragments decoded from a server-sent-events chat completion.
///
/// The stream is finite and single-use: `[DONE]` ends it with `None`, and
/// any failure yields exactly one `Err` followed by `None`. Reaching the end
/// of input before `[DONE]` counts as a failure.
pub struct ChatStream {
    reader: Box<dyn BufRead + Send>,
    service: String,
    finished: bool,
    fragments: usize,
}

impl fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatStream")
            .field("service", &self.service)
            .field("finished", &self.finished)
            .field("fragments", &self.fragments)
            .finish_non_exhaustive()
    }
}

impl ChatStream {
    #[inline]
    pub fn from_reader(reader: impl BufRead + Send + 'static, service: &str) -> Self {
        Self {
            reader: Box::new(reader),
            service: service.to_string(),
            finished: false,
            fragments: 0,
        }
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drain the stream into one string.
    #[inline]
    pub fn collect_text(self) -> Result<String> {
        self.collect()
    }

    fn fail(&mut self, error: RagError) -> Option<Result<String>> {
        warn!("{} stream failed: {}", self.service, error);
        self.finished = true;
        Some(Err(error))
    }

    fn malformed(&self, message: String) -> RagError {
        RagError::MalformedResponse {
            service: self.service.clone(),
            message,
        }
    }
}

impl Iterator for ChatStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    let error = self.malformed("stream ended before [DONE]".to_string());
                    return self.fail(error);
                }
                Ok(_) => {}
                Err(e) => {
                    let error = RagError::Network {
                        service: self.service.clone(),
                        message: e.to_string(),
                    };
                    return self.fail(error);
                }
            }

            // Blank lines separate events; lines starting with ':' are comments
            let line = line.trim_end_matches(['\r', '\n']);
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();

            if data == DONE_MARKER {
                debug!("{} stream done after {} fragments", self.service, self.fragments);
                self.finished = true;
                return None;
            }

            let chunk: StreamChunk = match serde_json::from_str(data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    let error = self.malformed(format!("invalid stream event: {}", e));
                    return self.fail(error);
                }
            };

            if let Some(error) = chunk.error {
                let error = RagError::Api {
                    service: self.service.clone(),
                    status: 200,
                    message: error.message,
                };
                return self.fail(error);
            }

            let content: String = chunk
                .choices
                .into_iter()
                .filter_map(|choice| choice.delta.content)
                .collect();
            if !content.is_empty() {
                self.fragments += 1;
                return Some(Ok(content));
            }
        }
    }
}
