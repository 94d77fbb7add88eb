//! Runtime configuration.
//!
//! Every field has a default; the binary overrides them from command-line flags
//! or `INDEXER_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::embedding::fastembed::DEFAULT_TEXT_MODEL;

/// Default directory holding the vector store.
pub const DEFAULT_STORE_DIR: &str = "embeddings";

/// Default root of the paper topic folders.
pub const DEFAULT_PAPERS_ROOT: &str = "docs";

/// Default destination of imported images.
pub const DEFAULT_IMAGES_ROOT: &str = "images";

/// Locations and model selection for one indexer process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerConfig {
    pub store_dir: PathBuf,
    pub papers_root: PathBuf,
    pub images_root: PathBuf,
    /// Where model weights are downloaded; `None` lets fastembed pick
    pub cache_dir: Option<PathBuf>,
    pub text_model: String,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            papers_root: PathBuf::from(DEFAULT_PAPERS_ROOT),
            images_root: PathBuf::from(DEFAULT_IMAGES_ROOT),
            cache_dir: default_cache_dir(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
        }
    }
}

/// `<user cache dir>/fastembed`, if the platform has a cache directory.
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("fastembed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexerConfig::default();
        assert_eq!(config.store_dir, PathBuf::from("embeddings"));
        assert_eq!(config.papers_root, PathBuf::from("docs"));
        assert_eq!(config.images_root, PathBuf::from("images"));
        assert_eq!(config.text_model, DEFAULT_TEXT_MODEL);
        if let Some(cache) = config.cache_dir {
            assert!(cache.ends_with("fastembed"));
        }
    }

    #[test]
    fn test_serializes_to_json() {
        let config = IndexerConfig {
            cache_dir: None,
            ..IndexerConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: IndexerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
