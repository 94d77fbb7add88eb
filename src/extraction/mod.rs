//! Document text extraction.
//!
//! Full-text extraction is delegated to the `pdf-extract` crate behind the
//! `TextExtractor` trait so that pipelines can be exercised with fakes.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while extracting text from a document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a document the extractor understands
    #[error("Malformed document: {0}")]
    Malformed(String),
}

/// Result type for extraction operations.
pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Trait for full-text extractors.
pub trait TextExtractor: Send + Sync {
    /// Extract the full text of the document at `path`.
    fn extract_text(&self, path: &Path) -> ExtractionResult<String>;
}

/// PDF text extractor backed by `pdf-extract`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl TextExtractor for PdfTextExtractor {
    fn extract_text(&self, path: &Path) -> ExtractionResult<String> {
        let bytes = std::fs::read(path)?;
        debug!("Extracting text from {} ({} bytes)", path.display(), bytes.len());

        // pdf-extract panics on some malformed inputs instead of returning an error.
        let extracted = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem(&bytes)
        }))
        .map_err(|_| {
            ExtractionError::Malformed(format!("{}: extractor aborted", path.display()))
        })?;

        extracted.map_err(|e| ExtractionError::Malformed(format!("{}: {}", path.display(), e)))
    }
}

/// Return at most the first `max_chars` characters of `text`.
///
/// Cuts on a character boundary, never inside a multi-byte sequence.
pub fn take_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
