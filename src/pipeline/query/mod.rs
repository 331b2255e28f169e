#[cfg(test)]
mod tests;

use std::sync::Arc;

use tracing::{debug, warn};

use super::QueryState;
use crate::llm::{ChatMessage, ChatModel, ChatStream};
use crate::prompt::{self, Prompt};
use crate::retriever::{RetrievalResult, Retriever};
use crate::{RagError, Result};

/// Answers questions from the knowledge base: retrieve, assemble, generate.
#[derive(Clone)]
pub struct Chatbot {
    retriever: Retriever,
    chat: Arc<dyn ChatModel>,
}

impl Chatbot {
    #[inline]
    pub fn new(retriever: Retriever, chat: Arc<dyn ChatModel>) -> Self {
        Self { retriever, chat }
    }

    #[inline]
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Run the query path up to the point where the model starts answering.
    ///
    /// The returned [`Answer`] yields the reply fragment by fragment. An
    /// empty retrieval is not an error; the prompt then tells the model that
    /// no context was found.
    #[inline]
    pub async fn ask(&self, question: &str, history: &[ChatMessage]) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(RagError::Data("The question is empty".to_string()));
        }

        let mut state = QueryState::Idle;
        match self.prepare(question, history, &mut state).await {
            Ok(answer) => Ok(answer),
            Err(error) => {
                warn!("Query failed while {}: {}", state, error);
                state.fail();
                Err(error)
            }
        }
    }

    async fn prepare(
        &self,
        question: &str,
        history: &[ChatMessage],
        state: &mut QueryState,
    ) -> Result<Answer> {
        state.advance(QueryState::Embedding)?;
        let vector = self.retriever.embed_query(question).await?;

        state.advance(QueryState::Retrieving)?;
        let retrieval = self.retriever.search(question, &vector).await?;

        state.advance(QueryState::PromptAssembled)?;
        let prompt = prompt::assemble(question, &retrieval);
        debug!(
            "Assembled prompt with {} source(s), {} chars",
            prompt.sources(),
            prompt.text().len()
        );

        state.advance(QueryState::Generating)?;
        let messages = prompt.to_messages(history);
        let chat = Arc::clone(&self.chat);
        let stream = tokio::task::spawn_blocking(move || chat.stream(&messages))
            .await
            .map_err(|e| RagError::Other(e.into()))??;

        Ok(Answer {
            prompt,
            retrieval,
            stream,
            state: *state,
        })
    }
}

/// A reply being generated for one question.
///
/// Iterating yields text fragments; the first fragment moves the query to
/// `Streaming`, the end of the reply to `Done`, and any error to `Failed`.
/// Reading the stream blocks on network I/O.
#[derive(Debug)]
pub struct Answer {
    prompt: Prompt,
    retrieval: RetrievalResult,
    stream: ChatStream,
    state: QueryState,
}

impl Answer {
    #[inline]
    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    #[inline]
    pub fn retrieval(&self) -> &RetrievalResult {
        &self.retrieval
    }

    #[inline]
    pub fn state(&self) -> QueryState {
        self.state
    }

    /// Consume the rest of the reply as one string.
    #[inline]
    pub fn collect_text(self) -> Result<String> {
        self.collect()
    }
}

impl Iterator for Answer {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state.is_terminal() {
            return None;
        }

        if self.state == QueryState::Generating {
            if let Err(error) = self.state.advance(QueryState::Streaming) {
                self.state.fail();
                return Some(Err(error));
            }
        }

        match self.stream.next() {
            Some(Ok(fragment)) => Some(Ok(fragment)),
            Some(Err(error)) => {
                self.state.fail();
                Some(Err(error))
            }
            None => {
                if let Err(error) = self.state.advance(QueryState::Done) {
                    self.state.fail();
                    return Some(Err(error));
                }
                None
            }
        }
    }
}
