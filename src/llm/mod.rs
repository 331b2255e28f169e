// LLM module
// Chat models that answer with a lazily produced stream of text fragments

pub mod openai;
pub mod stream;

use serde::{Deserialize, Serialize};

pub use openai::OpenAiChat;
pub use stream::ChatStream;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A hosted chat model.
///
/// Every call to [`ChatModel::stream`] opens a fresh, single-use stream.
/// Calls block until the response headers arrive.
pub trait ChatModel: Send + Sync {
    fn model(&self) -> &str;

    fn stream(&self, messages: &[ChatMessage]) -> Result<ChatStream>;
}
