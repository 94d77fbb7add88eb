//! Paper ingestion pipeline.
//!
//! A paper goes through these steps, in order:
//!
//! 1. Fail fast if the file is missing
//! 2. Extract the full text
//! 3. Embed the first `EMBEDDING_INPUT_CHARS` characters
//! 4. Resolve topics (explicit, else extracted keywords, else none)
//! 5. Sanitize the primary topic into a directory name
//! 6. Move the file into `<papers-root>/<primary-topic>/` (best effort)
//! 7. Insert the record into the "papers" collection
//!
//! The move happens before the insert and the two are not transactional: a
//! failed move keeps the original path, a failed insert leaves the file moved.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{collect_files, file_id, IngestionError, IngestionResult, IngestionStats};
use crate::embedding::EmbeddingProvider;
use crate::extraction::{take_chars, TextExtractor};
use crate::keywords::extract_keywords;
use crate::models::{Collection, Record, RecordMetadata};
use crate::storage::VectorStore;

/// Leading characters of the text fed to the embedding model.
pub const EMBEDDING_INPUT_CHARS: usize = 1000;

/// Leading characters stored as a preview snippet.
pub const SNIPPET_CHARS: usize = 200;

/// Primary topic used when no topic can be resolved.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Extensions picked up by directory ingestion.
pub const PDF_EXTENSIONS: [&str; 1] = ["pdf"];

/// What happened to a single paper.
#[derive(Debug, Clone)]
pub struct PaperOutcome {
    /// Record id (the original filename)
    pub id: String,

    /// Path stored in the metadata: the new location, or the original one if
    /// the move failed
    pub path: PathBuf,

    /// Resolved topics, possibly empty
    pub topics: Vec<String>,

    /// Sanitized primary topic (directory name)
    pub primary_topic: String,

    /// Whether the file was moved into its topic folder
    pub relocated: bool,

    /// Whether a new record was inserted (false if the id was already indexed)
    pub inserted: bool,
}

/// Split a user-supplied, comma-separated topic list.
pub fn split_topics(topics: &str) -> Vec<String> {
    topics
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve the topics of a paper.
///
/// Explicit topics win when present and non-blank; otherwise the keyword
/// section of the document text is used.
pub fn resolve_topics(explicit: Option<&str>, text: &str) -> Vec<String> {
    match explicit.filter(|topics| !topics.trim().is_empty()) {
        Some(topics) => split_topics(topics),
        None => extract_keywords(text),
    }
}

/// Make a topic safe to use as a single directory name.
///
/// Keeps alphanumerics, spaces, underscores and hyphens, then trims. Falls back
/// to `UNCATEGORIZED` when nothing is left.
pub fn sanitize_topic(topic: &str) -> String {
    let kept: String = topic
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();

    match kept.trim() {
        "" => UNCATEGORIZED.to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Directory name for a paper with the given topics.
pub fn primary_topic(topics: &[String]) -> String {
    sanitize_topic(topics.first().map(String::as_str).unwrap_or(UNCATEGORIZED))
}

/// Move `source` into `target_dir` under `file_name`.
///
/// Tries a rename first and falls back to copy + remove (e.g. across devices).
/// On failure the source is left where it was.
fn relocate(source: &Path, target_dir: &Path, file_name: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(target_dir)?;
    let target = target_dir.join(file_name);

    if let Err(rename_err) = fs::rename(source, &target) {
        debug!("Rename failed ({}), falling back to copy", rename_err);
        fs::copy(source, &target)?;
        if let Err(remove_err) = fs::remove_file(source) {
            let _ = fs::remove_file(&target);
            return Err(remove_err);
        }
    }

    Ok(target)
}

/// Paper ingestion pipeline.
///
/// Holds shared handles to the text embedding provider and the store, plus the
/// extractor and the root folder papers are filed under.
pub struct PaperIngestion<E, X, S>
where
    E: EmbeddingProvider,
    X: TextExtractor,
    S: VectorStore,
{
    /// Text embedding provider
    embedding_provider: Arc<E>,

    /// Full-text extractor
    extractor: X,

    /// Store holding the "papers" collection
    store: Arc<S>,

    /// Root of the topic folders
    papers_root: PathBuf,
}

impl<E, X, S> PaperIngestion<E, X, S>
where
    E: EmbeddingProvider,
    X: TextExtractor,
    S: VectorStore,
{
    /// Connect to the store and prepare for ingestion.
    ///
    /// Creates the "papers" collection on first use, or validates that the
    /// provider matches the model and dimension it was created with.
    ///
    /// # Errors
    /// Returns `IngestionError::StorageError` if the collection cannot be created
    /// or was built with a different embedding configuration
    pub async fn connect(
        embedding_provider: Arc<E>,
        extractor: X,
        store: Arc<S>,
        papers_root: impl Into<PathBuf>,
    ) -> IngestionResult<Self> {
        store
            .ensure_collection(Collection::Papers, &embedding_provider.config())
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?;

        Ok(Self {
            embedding_provider,
            extractor,
            store,
            papers_root: papers_root.into(),
        })
    }

    /// Ingest a single paper.
    ///
    /// # Arguments
    /// * `path` - The PDF to ingest
    /// * `explicit_topics` - Optional comma-separated topics overriding keyword extraction
    ///
    /// # Errors
    /// - `MissingInput` if `path` does not exist (nothing is touched)
    /// - `Decode` if no text can be extracted
    /// - `EmbeddingError` / `StorageError` for infrastructure failures
    ///
    /// A failed move is not an error: the record keeps the original path.
    pub async fn process_paper(&self, path: &Path, explicit_topics: Option<&str>) -> IngestionResult<PaperOutcome> {
        if !path.exists() {
            return Err(IngestionError::MissingInput(path.to_path_buf()));
        }

        let id = file_id(path)?;
        info!("Processing {}", id);

        let full_text = self
            .extractor
            .extract_text(path)
            .map_err(|e| IngestionError::Decode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let text_for_embedding = take_chars(&full_text, EMBEDDING_INPUT_CHARS);
        let embedding = self
            .embedding_provider
            .embed(text_for_embedding)
            .await
            .map_err(|e| IngestionError::EmbeddingError(e.to_string()))?;

        let topics = resolve_topics(explicit_topics, &full_text);
        if topics.is_empty() {
            info!("No keywords found for {}, filing under '{}'", id, UNCATEGORIZED);
        } else {
            info!("Topics for {}: {:?}", id, topics);
        }

        let primary_topic = primary_topic(&topics);
        let target_dir = self.papers_root.join(&primary_topic);

        let (final_path, relocated) = match relocate(path, &target_dir, &id) {
            Ok(target) => {
                info!("Moved {} to {}", id, target_dir.display());
                (target, true)
            }
            Err(e) => {
                warn!(
                    "Could not move {} into {}: {}; keeping original path",
                    path.display(),
                    target_dir.display(),
                    e
                );
                (path.to_path_buf(), false)
            }
        };

        let record = Record {
            id: id.clone(),
            embedding,
            document: Some(text_for_embedding.to_string()),
            metadata: RecordMetadata {
                filename: id.clone(),
                path: final_path.display().to_string(),
                topics: Some(topics.join(",")),
                snippet: Some(take_chars(&full_text, SNIPPET_CHARS).to_string()),
            },
        };

        let inserted = self
            .store
            .add(Collection::Papers, &record)
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?;

        if inserted {
            info!("Successfully indexed {}", id);
        } else {
            warn!("A paper with id '{}' is already indexed; the existing record was kept", id);
        }

        Ok(PaperOutcome {
            id,
            path: final_path,
            topics,
            primary_topic,
            relocated,
            inserted,
        })
    }

    /// Ingest every PDF under `dir`, recursively.
    ///
    /// Per-file failures are logged and counted; they never abort the run.
    ///
    /// # Errors
    /// Returns `MissingInput` if `dir` is not a directory
    pub async fn process_directory(&self, dir: &Path) -> IngestionResult<IngestionStats> {
        let files = collect_files(dir, &PDF_EXTENSIONS)?;
        info!("Found {} PDF files under {}", files.len(), dir.display());

        let mut stats = IngestionStats::new();
        for file in files {
            debug!("Found PDF: {}", file.display());
            match self.process_paper(&file, None).await {
                Ok(outcome) if outcome.inserted => stats.record_inserted(),
                Ok(_) => stats.record_duplicate(),
                Err(e) => {
                    warn!("Failed to ingest {}: {}", file.display(), e);
                    stats.record_failed();
                }
            }
        }

        info!(
            "Batch processing complete. Processed {} files ({} inserted, {} failed)",
            stats.total_processed, stats.inserted, stats.failed
        );
        Ok(stats)
    }
}
