//! Image ingestion pipeline.
//!
//! Images are decoded (to reject unreadable files early), embedded with the
//! image side of a joint text/image model and stored in the "images"
//! collection. Unlike papers, images are never moved: batch indexing works in
//! place, and `import_image` copies into the images root first.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{collect_files, file_id, IngestionError, IngestionResult, IngestionStats};
use crate::embedding::ImageEmbeddingProvider;
use crate::models::{Collection, Record, RecordMetadata};
use crate::storage::VectorStore;

/// Extensions picked up by directory ingestion.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

/// What happened to a single image.
#[derive(Debug, Clone)]
pub struct ImageOutcome {
    pub id: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// False if an image with the same id was already indexed
    pub inserted: bool,
}

/// First free path for `file_name` inside `dir`: `name.ext`, then `name_1.ext`,
/// `name_2.ext`, ...
fn unique_target(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let extension = as_path.extension().map(|e| e.to_string_lossy().into_owned());

    (1..)
        .map(|n| match &extension {
            Some(ext) => dir.join(format!("{}_{}.{}", stem, n, ext)),
            None => dir.join(format!("{}_{}", stem, n)),
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or(candidate)
}

/// Image ingestion pipeline.
pub struct ImageIngestion<I, S>
where
    I: ImageEmbeddingProvider,
    S: VectorStore,
{
    embedding_provider: Arc<I>,
    store: Arc<S>,
    /// Destination of `import_image`
    images_root: PathBuf,
}

impl<I, S> ImageIngestion<I, S>
where
    I: ImageEmbeddingProvider,
    S: VectorStore,
{
    /// Connect to the store, creating or validating the "images" collection.
    ///
    /// # Errors
    /// Returns `IngestionError::StorageError` if the collection was created with
    /// a different model or dimension
    pub async fn connect(
        embedding_provider: Arc<I>,
        store: Arc<S>,
        images_root: impl Into<PathBuf>,
    ) -> IngestionResult<Self> {
        store
            .ensure_collection(Collection::Images, &embedding_provider.config())
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?;

        Ok(Self {
            embedding_provider,
            store,
            images_root: images_root.into(),
        })
    }

    /// Index a single image where it lies.
    ///
    /// # Errors
    /// - `MissingInput` if `path` does not exist
    /// - `Decode` if the file is not a decodable image
    /// - `EmbeddingError` / `StorageError` for infrastructure failures
    pub async fn process_image(&self, path: &Path) -> IngestionResult<ImageOutcome> {
        if !path.exists() {
            return Err(IngestionError::MissingInput(path.to_path_buf()));
        }

        let id = file_id(path)?;
        info!("Processing image {}", id);

        let decoded = ::image::open(path).map_err(|e| IngestionError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let (width, height) = (decoded.width(), decoded.height());
        debug!("Decoded {} ({}x{})", id, width, height);
        // fastembed's image model reads from a path and decodes the file itself;
        // this decode only validates the file and records its size.
        drop(decoded);

        let embedding = self
            .embedding_provider
            .embed_image(path)
            .await
            .map_err(|e| IngestionError::EmbeddingError(e.to_string()))?;

        let record = Record {
            id: id.clone(),
            embedding,
            document: None,
            metadata: RecordMetadata::new(id.clone(), path.display().to_string()),
        };

        let inserted = self
            .store
            .add(Collection::Images, &record)
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?;

        if inserted {
            info!("Indexed image {}", id);
        } else {
            warn!("An image with id '{}' is already indexed; the existing record was kept", id);
        }

        Ok(ImageOutcome {
            id,
            path: path.to_path_buf(),
            width,
            height,
            inserted,
        })
    }

    /// Copy an image into the images root under a free name, then index the copy.
    ///
    /// The copy is removed again if indexing fails.
    pub async fn import_image(&self, path: &Path) -> IngestionResult<ImageOutcome> {
        if !path.exists() {
            return Err(IngestionError::MissingInput(path.to_path_buf()));
        }

        let file_name = file_id(path)?;
        fs::create_dir_all(&self.images_root)?;
        let target = unique_target(&self.images_root, &file_name);
        fs::copy(path, &target)?;
        info!("Copied {} to {}", path.display(), target.display());

        match self.process_image(&target).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(remove_err) = fs::remove_file(&target) {
                    warn!("Could not remove {}: {}", target.display(), remove_err);
                }
                Err(e)
            }
        }
    }

    /// Index every image under `dir`, recursively and in place.
    ///
    /// # Errors
    /// Returns `MissingInput` if `dir` is not a directory
    pub async fn process_directory(&self, dir: &Path) -> IngestionResult<IngestionStats> {
        let files = collect_files(dir, &IMAGE_EXTENSIONS)?;
        info!("Found {} images under {}", files.len(), dir.display());

        let mut stats = IngestionStats::new();
        for file in files {
            match self.process_image(&file).await {
                Ok(outcome) if outcome.inserted => stats.record_inserted(),
                Ok(_) => stats.record_duplicate(),
                Err(e) => {
                    warn!("Failed to index {}: {}", file.display(), e);
                    stats.record_failed();
                }
            }
        }

        info!(
            "Image batch complete. Processed {} files ({} inserted, {} failed)",
            stats.total_processed, stats.inserted, stats.failed
        );
        Ok(stats)
    }
}
