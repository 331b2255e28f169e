// Documents module
// Raw page text loaded from PDFs, before chunking

pub mod loader;

use serde::{Deserialize, Serialize};

pub use loader::{find_pdfs, load_directory, load_pdf};

/// Where a document's text came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: String,
    /// 0-based page number
    pub page: u32,
}

/// Text of one PDF page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    #[inline]
    pub fn new(text: impl Into<String>, source: impl Into<String>, page: u32) -> Self {
        Self {
            text: text.into(),
            metadata: DocumentMetadata {
                source: source.into(),
                page,
            },
        }
    }

    #[inline]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
