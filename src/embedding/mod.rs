//! Embedding provider abstraction and implementations.
//!
//! This module defines the interfaces for text and image embedding generation and
//! provides local implementations backed by fastembed.
//!
//! Two providers are used per process: a text model for papers and a joint
//! image/text (CLIP) model for images. The CLIP provider implements both traits, so
//! a free-text description lands in the same space as the indexed images.

pub mod fastembed;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

use crate::models::EmbeddingConfig;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Invalid input (e.g., empty text, unreadable image)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model configuration or loading error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Other unexpected errors
    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// # Example Usage
/// ```ignore
/// let provider = FastEmbedProvider::new(None, None)?;
/// let embedding = provider.embed("attention is all you need").await?;
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    ///
    /// Blank text is embedded like any other input; callers that must reject
    /// it (such as the query layer) check before calling.
    ///
    /// # Errors
    /// Returns `EmbeddingError` if the embedding generation fails
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Get the dimension of embeddings produced by this provider.
    fn dimension(&self) -> usize;

    /// Get the model name/identifier for this provider.
    fn model_name(&self) -> &str;

    /// Configuration to persist with the collection this provider feeds.
    fn config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: self.model_name().to_string(),
            dimension: self.dimension(),
        }
    }
}

/// Trait for image embedding providers.
///
/// Implementations must embed into the same space as the text side of the model
/// used to query the image collection.
#[async_trait]
pub trait ImageEmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the image stored at `path`.
    ///
    /// # Errors
    /// Returns `EmbeddingError` if the image cannot be read or embedded
    async fn embed_image(&self, path: &Path) -> EmbeddingResult<Vec<f32>>;

    /// Get the dimension of embeddings produced by this provider.
    fn dimension(&self) -> usize;

    /// Get the model name/identifier for this provider.
    fn model_name(&self) -> &str;

    /// Configuration to persist with the image collection.
    fn config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: self.model_name().to_string(),
            dimension: self.dimension(),
        }
    }
}
