//! Vector store abstraction and implementations.
//!
//! This module defines the interface for persisting records and answering
//! nearest-neighbor queries over named collections. The abstraction keeps the
//! pipelines and the query layer independent of the backend, so tests can run
//! against an in-memory store.

pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Collection, EmbeddingConfig, Record, SearchHit};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error
    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// Data serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Schema or migration error
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Collection does not exist
    #[error("Collection not found: {0}")]
    NotFound(String),

    /// A provider does not match the configuration stored with a collection
    #[error("Configuration mismatch for collection '{collection}': {reason}")]
    ConfigMismatch { collection: String, reason: String },

    /// Vector length does not match the collection dimension
    #[error("Dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for vector store backends.
///
/// All methods take `&self`: one store handle is created per process and shared
/// between the pipelines and the search engines.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create `collection` with the given configuration, or validate that an
    /// existing collection was created with the same model and dimension.
    ///
    /// This is idempotent and safe to call on every start.
    ///
    /// # Errors
    /// Returns `StorageError::ConfigMismatch` if the stored configuration differs
    async fn ensure_collection(&self, collection: Collection, config: &EmbeddingConfig) -> StorageResult<()>;

    /// Retrieve the configuration stored with `collection`, if it exists.
    async fn get_config(&self, collection: Collection) -> StorageResult<Option<EmbeddingConfig>>;

    /// Insert a record.
    ///
    /// # Returns
    /// `true` if the record was inserted, `false` if a record with the same id
    /// already exists in the collection (the stored record is left untouched)
    ///
    /// # Errors
    /// Returns `StorageError::DimensionMismatch` if the embedding length differs
    /// from the collection dimension
    async fn add(&self, collection: Collection, record: &Record) -> StorageResult<bool>;

    /// Return up to `top_k` records nearest to `embedding` by cosine distance,
    /// in non-decreasing distance order.
    ///
    /// An empty collection yields an empty vector, not an error.
    async fn query(&self, collection: Collection, embedding: &[f32], top_k: usize) -> StorageResult<Vec<SearchHit>>;

    /// Fetch a record by id.
    async fn get(&self, collection: Collection, id: &str) -> StorageResult<Option<Record>>;

    /// Number of records in `collection`.
    async fn count(&self, collection: Collection) -> StorageResult<usize>;
}
