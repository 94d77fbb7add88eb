//! Ingestion pipeline module.
//!
//! This module holds the two ingestion pipelines and what they share:
//!
//! - [`paper::PaperIngestion`]: extract → embed → resolve topics → file into a
//!   topic folder → persist, for PDF papers
//! - [`image::ImageIngestion`]: decode → embed → persist, for images
//!
//! # Usage
//!
//! ```ignore
//! let store = Arc::new(SqliteVectorStore::open("embeddings")?);
//! let text = Arc::new(FastEmbedProvider::new(None, None)?);
//!
//! // Validates (or creates) the "papers" collection for this provider
//! let papers = PaperIngestion::connect(text, PdfTextExtractor::new(), store, "docs").await?;
//!
//! let outcome = papers.process_paper(Path::new("attention.pdf"), Some("NLP, Transformers")).await?;
//! let stats = papers.process_directory(Path::new("inbox")).await?;
//! println!("Inserted: {}, Failed: {}", stats.inserted, stats.failed);
//! ```
//!
//! Each single-item call either succeeds or returns an `IngestionError`; the
//! directory variants log per-item failures and keep going.

pub mod image;
pub mod paper;

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub use self::image::{ImageIngestion, ImageOutcome};
pub use self::paper::{PaperIngestion, PaperOutcome};

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The input file or directory does not exist
    #[error("Input not found: {}", .0.display())]
    MissingInput(PathBuf),

    /// The input exists but is not a readable document or image
    #[error("Failed to decode {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Storage operation failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Filesystem error outside of the best-effort relocation step
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Statistics from a directory run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionStats {
    /// Total number of files attempted, failures included
    pub total_processed: usize,

    /// Number of records inserted
    pub inserted: usize,

    /// Number of files whose id was already indexed
    pub duplicates_skipped: usize,

    /// Number of files that failed to process
    pub failed: usize,
}

impl IngestionStats {
    /// Create new empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful insertion.
    pub fn record_inserted(&mut self) {
        self.total_processed += 1;
        self.inserted += 1;
    }

    /// Record a file whose id was already present.
    pub fn record_duplicate(&mut self) {
        self.total_processed += 1;
        self.duplicates_skipped += 1;
    }

    /// Record a failed processing attempt.
    pub fn record_failed(&mut self) {
        self.total_processed += 1;
        self.failed += 1;
    }
}

/// Whether `path` has one of `extensions` (compared case-insensitively, no dot).
pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|candidate| ext.eq_ignore_ascii_case(candidate)))
        .unwrap_or(false)
}

/// Recursively collect files under `dir` with one of `extensions`.
///
/// The full list is gathered before the caller touches any file, so files moved
/// during ingestion are never visited twice. Entries are sorted by file name.
pub(crate) fn collect_files(dir: &Path, extensions: &[&str]) -> IngestionResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(IngestionError::MissingInput(dir.to_path_buf()));
    }

    Ok(WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| has_extension(path, extensions))
        .collect())
}

/// The record id for a file: its original filename.
pub(crate) fn file_id(path: &Path) -> IngestionResult<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| IngestionError::InvalidInput(format!("{} has no file name", path.display())))
}
