//! Multimodal Indexer - a personal semantic index for PDF papers and images.
//!
//! Papers and images are embedded with local models and stored in two cosine
//! collections, "papers" and "images", which can then be searched with free
//! text.
//!
//! # Architecture
//!
//! - **models**: Records, collections, search hits
//! - **embedding**: Text and image embedding providers (fastembed)
//! - **extraction**: PDF text extraction
//! - **keywords**: Detection of "Keywords:"-style sections in paper text
//! - **storage**: Vector store over SQLite
//! - **ingestion**: Paper and image pipelines
//! - **query**: Nearest-neighbor search over one collection
//! - **config**: Paths and model selection
//!
//! # Workflow
//!
//! ## Papers
//!
//! 1. Extract the full text of the PDF
//! 2. Embed the first 1000 characters
//! 3. Resolve topics from explicit input or the keyword section
//! 4. Move the file into `<papers-root>/<primary-topic>/`
//! 5. Store the record in "papers"
//!
//! ## Images
//!
//! 1. Decode the image
//! 2. Embed it with CLIP
//! 3. Store the record in "images"
//!
//! ## Search
//!
//! The query is embedded with the model that fed the collection (the CLIP text
//! tower for images) and the nearest records are returned by cosine distance.
//!
//! # Example
//!
//! ```ignore
//! use multimodal_indexer::{
//!     embedding::fastembed::FastEmbedProvider,
//!     models::Collection,
//!     query::{CollectionSearchEngine, SearchEngine, SearchQuery},
//!     storage::sqlite::SqliteVectorStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteVectorStore::open("embeddings")?);
//!     let text = Arc::new(FastEmbedProvider::new(None, None)?);
//!     let engine = CollectionSearchEngine::new(text, store, Collection::Papers);
//!
//!     let hits = engine.search(&SearchQuery::new("deep learning".to_string(), Some(5))).await?;
//!     for hit in hits {
//!         println!("{}: {:.4}", hit.metadata.filename, hit.distance);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod embedding;
pub mod extraction;
pub mod ingestion;
pub mod keywords;
pub mod models;
pub mod query;
pub mod storage;

// Re-export commonly used types at the crate root
pub use config::IndexerConfig;
pub use embedding::{EmbeddingProvider, ImageEmbeddingProvider};
pub use extraction::TextExtractor;
pub use ingestion::{ImageIngestion, IngestionStats, PaperIngestion};
pub use models::{Collection, EmbeddingConfig, Record, RecordMetadata, RelevanceLevel, SearchHit};
pub use query::{SearchEngine, SearchQuery};
pub use storage::VectorStore;
