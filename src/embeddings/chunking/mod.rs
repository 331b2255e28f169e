#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::documents::Document;

/// Namespace for deterministic record ids
const RECORD_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_7a3e_9b2d_4e58_a0c4_3d9e_51b7_f286);

/// Metadata stored alongside every chunk
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Path of the source document as it was loaded
    pub source: String,
    /// 0-based page number within the source
    pub page: u32,
    /// Character offset of the chunk within the page text
    pub offset: usize,
}

impl ChunkMetadata {
    /// Stable id derived from source, page and offset, so re-ingesting the
    /// same document replaces rather than duplicates its records.
    #[inline]
    pub fn record_id(&self) -> Uuid {
        let key = format!("{}:{}:{}", self.source, self.page, self.offset);
        Uuid::new_v5(&RECORD_ID_NAMESPACE, key.as_bytes())
    }
}

/// A bounded window of a document's text, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Position of this chunk within its document
    pub index: usize,
}

impl Chunk {
    #[inline]
    pub fn record_id(&self) -> Uuid {
        self.metadata.record_id()
    }
}

/// Configuration for text chunking, measured in characters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 300,
            chunk_overlap: 100,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                overlap: self.chunk_overlap,
                chunk_size: self.chunk_size,
            });
        }

        Ok(())
    }
}

/// A window of text borrowed from the input, with its character offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextWindow<'a> {
    pub offset: usize,
    pub text: &'a str,
}

/// Chunk every document, keeping each document's chunks in order.
#[inline]
pub fn chunk_documents(
    documents: &[Document],
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, ConfigError> {
    config.validate()?;

    let mut chunks = Vec::new();
    for document in documents {
        chunks.extend(chunk_document(document, config)?);
    }

    debug!(
        "Chunked {} documents into {} chunks (size {}, overlap {})",
        documents.len(),
        chunks.len(),
        config.chunk_size,
        config.chunk_overlap
    );
    Ok(chunks)
}

/// Chunk a single document. Blank documents produce no chunks.
#[inline]
pub fn chunk_document(
    document: &Document,
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, ConfigError> {
    let windows = split_text(&document.text, config)?;

    Ok(windows
        .into_iter()
        .enumerate()
        .map(|(index, window)| Chunk {
            text: window.text.to_string(),
            metadata: ChunkMetadata {
                source: document.metadata.source.clone(),
                page: document.metadata.page,
                offset: window.offset,
            },
            index,
        })
        .collect())
}

/// Split `text` into overlapping windows of at most `chunk_size` characters.
///
/// A window ends after the last paragraph break, line break or whitespace
/// found past the overlap region, in that order of preference, and is cut
/// hard at `chunk_size` when none exists. The next window starts
/// `chunk_overlap` characters before the previous end, moved forward to a
/// word start when one lies inside the overlap. Windows never start or end
/// with whitespace.
#[inline]
pub fn split_text<'a>(
    text: &'a str,
    config: &ChunkingConfig,
) -> Result<Vec<TextWindow<'a>>, ConfigError> {
    config.validate()?;

    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let len = chars.len();
    let byte_at = |index: usize| chars.get(index).map_or(text.len(), |(byte, _)| *byte);
    let is_space = |index: usize| chars.get(index).is_some_and(|(_, c)| c.is_whitespace());

    let mut windows = Vec::new();
    let mut start = 0;

    loop {
        while start < len && is_space(start) {
            start += 1;
        }
        if start >= len {
            break;
        }

        let hard_end = (start + config.chunk_size).min(len);
        let end = if hard_end == len {
            len
        } else {
            find_break(&chars, start + config.chunk_overlap + 1, hard_end)
        };

        let mut trimmed_end = end;
        while trimmed_end > start && is_space(trimmed_end - 1) {
            trimmed_end -= 1;
        }
        if let Some(window) = text.get(byte_at(start)..byte_at(trimmed_end)) {
            windows.push(TextWindow {
                offset: start,
                text: window,
            });
        }

        if end == len {
            break;
        }

        let mut next = end - config.chunk_overlap;
        if next > 0 && !is_space(next - 1) && !is_space(next) {
            // Mid-word: move to the next word start if the overlap has one
            if let Some(word_start) = (next + 1..end).find(|&i| is_space(i - 1) && !is_space(i)) {
                next = word_start;
            }
        }
        start = next;
    }

    Ok(windows)
}

/// Best end position in `min_end..=hard_end` for a window.
fn find_break(chars: &[(usize, char)], min_end: usize, hard_end: usize) -> usize {
    let char_at = |index: usize| chars.get(index).map(|(_, c)| *c);
    let candidates = || (min_end..=hard_end).rev();

    let paragraph = candidates()
        .find(|&end| end >= 2 && char_at(end - 1) == Some('\n') && char_at(end - 2) == Some('\n'));
    let line = || candidates().find(|&end| char_at(end - 1) == Some('\n'));
    let space = || candidates().find(|&end| char_at(end - 1).is_some_and(char::is_whitespace));

    paragraph
        .or_else(line)
        .or_else(space)
        .unwrap_or(hard_end)
}
