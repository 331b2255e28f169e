
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::Document;
use crate::{RagError, Result};

const PDF_EXTENSION: &str = "pdf";

/// List the PDF files directly inside `dir`, sorted by path.
///
/// Subdirectories and hidden files are ignored; the extension match is
/// case-insensitive.
#[inline]
pub fn find_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| RagError::DocumentRead {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut pdfs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RagError::DocumentRead {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        let path = entry.path();

        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(PDF_EXTENSION));

        if !hidden && is_pdf && path.is_file() {
            pdfs.push(path);
        }
    }

    pdfs.sort();
    Ok(pdfs)
}

/// Extract the text of every page of one PDF, one [`Document`] per page.
#[inline]
pub fn load_pdf(path: &Path) -> Result<Vec<Document>> {
    let pdf = lopdf::Document::load(path).map_err(|e| RagError::DocumentRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let source = path.display().to_string();
    let mut documents = Vec::new();

    for page_number in pdf.get_pages().into_keys() {
        let text = match pdf.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(e) => {
                // Pages without a text layer still count; they chunk to nothing
                warn!(
                    "Could not extract text from {} page {}: {}",
                    source, page_number, e
                );
                String::new()
            }
        };
        documents.push(Document::new(text, source.clone(), page_number.saturating_sub(1)));
    }

    debug!("Loaded {} pages from {}", documents.len(), source);
    Ok(documents)
}

/// Load every PDF page in `dir`.
///
/// Fails with [`RagError::NoDocuments`] when the directory holds no PDFs.
#[inline]
pub fn load_directory(dir: &Path) -> Result<Vec<Document>> {
    let pdfs = find_pdfs(dir)?;
    if pdfs.is_empty() {
        return Err(RagError::NoDocuments(dir.to_path_buf()));
    }

    let mut documents = Vec::new();
    for pdf in &pdfs {
        documents.extend(load_pdf(pdf)?);
    }

    info!(
        "Loaded {} pages from {} PDF files in {}",
        documents.len(),
        pdfs.len(),
        dir.display()
    );
    Ok(documents)
}
