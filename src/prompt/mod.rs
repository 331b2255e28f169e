// Prompt assembly
// Turns a question and its retrieved chunks into the instruction sent to the chat model


use std::fmt::Write as _;

use crate::llm::ChatMessage;
use crate::retriever::RetrievalResult;

/// Marker placed in the prompt when retrieval found nothing
pub const NO_CONTEXT_MARKER: &str = "NO RELEVANT CONTEXT FOUND";

pub const SYSTEM_INSTRUCTION: &str = "You are an assistant which answers questions based on knowledge which is provided to you. \
While answering, you don't use your internal knowledge, but solely the information in the \"The knowledge\" section. \
If the knowledge does not contain the answer, say that you don't know instead of guessing. \
You don't mention anything to the user about the provided knowledge.";

const NO_CONTEXT_INSTRUCTION: &str = "No relevant context was found in the knowledge base for this question. \
Tell the user that you could not find relevant information to answer it. \
Do not make up an answer and do not cite any sources.";

/// The assembled instruction for one question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    text: String,
    sources: usize,
}

impl Prompt {
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of retrieved chunks included
    #[inline]
    pub fn sources(&self) -> usize {
        self.sources
    }

    #[inline]
    pub fn has_context(&self) -> bool {
        self.sources > 0
    }

    /// Messages for the chat model: earlier turns, then this prompt as the
    /// user turn. The instruction travels inside the prompt text only.
    #[inline]
    pub fn to_messages(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(self.text.clone()));
        messages
    }
}

/// Build the prompt for `question` from `retrieval`.
///
/// Each retrieved chunk is numbered and tagged with its source and 1-based
/// page. With no chunks the prompt carries [`NO_CONTEXT_MARKER`] and tells
/// the model to say it has no answer.
#[inline]
pub fn assemble(question: &str, retrieval: &RetrievalResult) -> Prompt {
    let mut text = String::new();
    text.push_str(SYSTEM_INSTRUCTION);
    text.push_str("\n\nThe question: ");
    text.push_str(question.trim());
    text.push_str("\n\nThe knowledge:");

    if retrieval.is_empty() {
        text.push(' ');
        text.push_str(NO_CONTEXT_MARKER);
        text.push('\n');
        text.push_str(NO_CONTEXT_INSTRUCTION);
        text.push('\n');
        return Prompt { text, sources: 0 };
    }

    for (position, scored) in retrieval.matches.iter().enumerate() {
        let metadata = &scored.record.metadata;
        // Writing to a String cannot fail
        let _ = write!(
            text,
            "\n\n[{}] (source: {}, page {})\n{}",
            position + 1,
            metadata.source,
            metadata.page + 1,
            scored.record.text.trim()
        );
    }
    text.push('\n');

    Prompt {
        text,
        sources: retrieval.len(),
    }
}
