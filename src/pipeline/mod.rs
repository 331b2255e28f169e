// Pipeline module
// Ingestion (load, chunk, embed, upsert) and the query state machine

#[cfg(test)]
mod tests;

pub mod ingest;
pub mod query;

use std::fmt;

use tracing::debug;

use crate::{RagError, Result};

pub use ingest::{IngestReport, Ingestor};
pub use query::{Answer, Chatbot};

/// Stage of a single question moving through the query path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryState {
    Idle,
    Embedding,
    Retrieving,
    PromptAssembled,
    Generating,
    Streaming,
    Done,
    Failed,
}

impl QueryState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `self -> next` is a legal step.
    ///
    /// The path is linear; any non-terminal state may also fail.
    #[inline]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (from, Self::Failed) => !from.is_terminal(),
            (Self::Idle, Self::Embedding)
            | (Self::Embedding, Self::Retrieving)
            | (Self::Retrieving, Self::PromptAssembled)
            | (Self::PromptAssembled, Self::Generating)
            | (Self::Generating, Self::Streaming)
            | (Self::Streaming, Self::Done) => true,
            _ => false,
        }
    }

    /// Move to `next`, or fail with [`RagError::InvalidTransition`].
    #[inline]
    pub fn advance(&mut self, next: Self) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(RagError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        debug!("Query state {} -> {}", self, next);
        *self = next;
        Ok(())
    }

    /// Record a failure unless already terminal.
    #[inline]
    pub fn fail(&mut self) {
        if !self.is_terminal() {
            debug!("Query state {} -> {}", self, Self::Failed);
            *self = Self::Failed;
        }
    }
}

impl fmt::Display for QueryState {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Embedding => "embedding",
            Self::Retrieving => "retrieving",
            Self::PromptAssembled => "prompt-assembled",
            Self::Generating => "generating",
            Self::Streaming => "streaming",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
