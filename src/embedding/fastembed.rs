//! FastEmbed embedding provider implementations.
//!
//! This module provides local embedding generation with the fastembed library:
//!
//! - `FastEmbedProvider`: a sentence-transformer text model used for papers
//! - `ClipProvider`: CLIP ViT-B/32, with the vision tower used for images and the
//!   text tower used for free-text image queries
//!
//! Models are downloaded into the cache directory on first use.

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult, ImageEmbeddingProvider};
use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions,
    TextEmbedding,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Default text model name as accepted by `parse_text_model`.
pub const DEFAULT_TEXT_MODEL: &str = "all-MiniLM-L6-v2";

/// Embedding dimension of CLIP ViT-B/32 (both towers).
pub const CLIP_DIMENSION: usize = 512;

/// Model identifier recorded for the image collection.
pub const CLIP_MODEL_NAME: &str = "ClipVitB32";

/// Resolve a user-facing model name to a fastembed text model.
///
/// Accepts the sentence-transformers style names as well as the fastembed enum
/// variant names.
pub fn parse_text_model(name: &str) -> EmbeddingResult<EmbeddingModel> {
    match name.trim().to_lowercase().as_str() {
        "all-minilm-l6-v2" | "allminilml6v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" | "bgesmallenv15" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" | "bgebaseenv15" => Ok(EmbeddingModel::BGEBaseENV15),
        "paraphrase-multilingual-mpnet-base-v2" | "paraphrasemlmpnetbasev2" => {
            Ok(EmbeddingModel::ParaphraseMLMpnetBaseV2)
        }
        other => Err(EmbeddingError::ConfigError(format!(
            "Unsupported text embedding model: {}",
            other
        ))),
    }
}

/// Dimension of the vectors produced by a text model.
fn text_dimension(model: &EmbeddingModel) -> usize {
    match model {
        EmbeddingModel::AllMiniLML6V2 => 384,
        EmbeddingModel::BGESmallENV15 => 384,
        EmbeddingModel::BGEBaseENV15 => 768,
        EmbeddingModel::ParaphraseMLMpnetBaseV2 => 768,
        EmbeddingModel::ClipVitB32 => CLIP_DIMENSION,
        _ => 384,
    }
}

fn load_text_model(model: EmbeddingModel, cache_dir: Option<&Path>) -> EmbeddingResult<TextEmbedding> {
    let mut init_options = InitOptions::new(model);
    if let Some(dir) = cache_dir {
        init_options = init_options.with_cache_dir(PathBuf::from(dir));
    }

    TextEmbedding::try_new(init_options).map_err(|e| {
        EmbeddingError::ConfigError(format!("Failed to initialize FastEmbed model: {}", e))
    })
}

async fn embed_text(model: &Mutex<TextEmbedding>, text: &str) -> EmbeddingResult<Vec<f32>> {
    let mut model = model.lock().await;
    model
        .embed(vec![text.to_string()], None)
        .map_err(|e| EmbeddingError::Other(format!("Embedding generation failed: {}", e)))?
        .into_iter()
        .next()
        .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))
}

/// FastEmbed text embedding provider.
#[derive(Clone)]
pub struct FastEmbedProvider {
    /// The embedding model instance
    model: Arc<Mutex<TextEmbedding>>,

    /// Model identifier
    model_name: String,

    /// Expected dimension of the embedding vectors
    embedding_dimension: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed text provider.
    ///
    /// # Arguments
    /// * `model` - Optional model to use (defaults to AllMiniLML6V2)
    /// * `cache_dir` - Optional cache directory for model files
    ///
    /// # Errors
    /// Returns `EmbeddingError` if model initialization fails
    pub fn new(model: Option<EmbeddingModel>, cache_dir: Option<&Path>) -> EmbeddingResult<Self> {
        let model_type = model.unwrap_or(EmbeddingModel::AllMiniLML6V2);
        let model_name = format!("{:?}", model_type);
        let embedding_dimension = text_dimension(&model_type);

        debug!("Loading text model {} from {:?}", model_name, cache_dir);
        let text_embedding = load_text_model(model_type, cache_dir)?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name,
            embedding_dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        embed_text(&self.model, text).await
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("embedding_dimension", &self.embedding_dimension)
            .finish()
    }
}

/// Joint image/text provider backed by CLIP ViT-B/32.
///
/// Both towers are loaded eagerly. Text queries go through the text tower via
/// `EmbeddingProvider`; images go through the vision tower via
/// `ImageEmbeddingProvider`.
#[derive(Clone)]
pub struct ClipProvider {
    text_model: Arc<Mutex<TextEmbedding>>,
    vision_model: Arc<Mutex<ImageEmbedding>>,
}

impl ClipProvider {
    /// Load both CLIP towers.
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` if either model fails to load
    pub fn new(cache_dir: Option<&Path>) -> EmbeddingResult<Self> {
        debug!("Loading CLIP text and vision models from {:?}", cache_dir);
        let text_embedding = load_text_model(EmbeddingModel::ClipVitB32, cache_dir)?;

        let mut init_options = ImageInitOptions::new(ImageEmbeddingModel::ClipVitB32);
        if let Some(dir) = cache_dir {
            init_options = init_options.with_cache_dir(PathBuf::from(dir));
        }
        let image_embedding = ImageEmbedding::try_new(init_options).map_err(|e| {
            EmbeddingError::ConfigError(format!("Failed to initialize CLIP vision model: {}", e))
        })?;

        Ok(Self {
            text_model: Arc::new(Mutex::new(text_embedding)),
            vision_model: Arc::new(Mutex::new(image_embedding)),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for ClipProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        embed_text(&self.text_model, text).await
    }

    fn dimension(&self) -> usize {
        CLIP_DIMENSION
    }

    fn model_name(&self) -> &str {
        CLIP_MODEL_NAME
    }
}

#[async_trait]
impl ImageEmbeddingProvider for ClipProvider {
    async fn embed_image(&self, path: &Path) -> EmbeddingResult<Vec<f32>> {
        let mut model = self.vision_model.lock().await;
        model
            .embed(vec![path.to_path_buf()], None)
            .map_err(|e| {
                EmbeddingError::InvalidInput(format!(
                    "Image embedding failed for {}: {}",
                    path.display(),
                    e
                ))
            })?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))
    }

    fn dimension(&self) -> usize {
        CLIP_DIMENSION
    }

    fn model_name(&self) -> &str {
        CLIP_MODEL_NAME
    }
}

impl std::fmt::Debug for ClipProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipProvider")
            .field("model_name", &CLIP_MODEL_NAME)
            .field("embedding_dimension", &CLIP_DIMENSION)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_model_names() {
        assert!(matches!(
            parse_text_model("all-MiniLM-L6-v2"),
            Ok(EmbeddingModel::AllMiniLML6V2)
        ));
        assert!(matches!(
            parse_text_model("AllMiniLML6V2"),
            Ok(EmbeddingModel::AllMiniLML6V2)
        ));
        assert!(matches!(
            parse_text_model(" bge-base-en-v1.5 "),
            Ok(EmbeddingModel::BGEBaseENV15)
        ));
    }

    #[test]
    fn test_parse_text_model_rejects_unknown() {
        match parse_text_model("word2vec") {
            Err(EmbeddingError::ConfigError(msg)) => assert!(msg.contains("word2vec")),
            other => panic!("Expected ConfigError, got {:?}", other.map(|m| format!("{:?}", m))),
        }
    }

    #[test]
    fn test_text_dimensions() {
        assert_eq!(text_dimension(&EmbeddingModel::AllMiniLML6V2), 384);
        assert_eq!(text_dimension(&EmbeddingModel::BGEBaseENV15), 768);
        assert_eq!(text_dimension(&EmbeddingModel::ClipVitB32), CLIP_DIMENSION);
    }

    #[tokio::test]
    #[ignore = "downloads model weights"]
    async fn test_text_provider_embeds() {
        let provider = FastEmbedProvider::new(None, None).unwrap();
        assert_eq!(provider.dimension(), 384);
        assert!(provider.model_name().contains("AllMiniLML6V2"));

        let first = provider.embed("Consistency test text").await.unwrap();
        let second = provider.embed("Consistency test text").await.unwrap();
        assert_eq!(first.len(), 384);
        assert_eq!(first, second, "Same text should produce identical embeddings");

        // Scanned PDFs extract to blank text and must still be indexable
        let blank = provider.embed("\n\n  \n").await.unwrap();
        assert_eq!(blank.len(), 384);
    }

    #[tokio::test]
    #[ignore = "downloads model weights"]
    async fn test_clip_text_side_dimension() {
        let provider = ClipProvider::new(None).unwrap();
        let embedding = EmbeddingProvider::embed(&provider, "a photo of a cat").await.unwrap();
        assert_eq!(embedding.len(), CLIP_DIMENSION);
    }
}
