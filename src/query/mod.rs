//! Query processing module.
//!
//! This module turns free-text queries into nearest-neighbor lookups. A search
//! engine is bound to one collection and to the embedding provider that fed that
//! collection at ingestion time: the text model for papers, the CLIP text tower
//! for images.
//!
//! # Usage
//!
//! ```ignore
//! let engine = CollectionSearchEngine::new(text_provider, store, Collection::Papers);
//! let hits = engine.search(&SearchQuery::new("graph neural networks".to_string(), None)).await?;
//!
//! // Hits are sorted by ascending cosine distance
//! for hit in hits {
//!     println!("{} - {:.4}", hit.metadata.filename, hit.distance);
//! }
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::models::{Collection, SearchHit};
use crate::storage::VectorStore;

/// Number of hits returned when the caller does not ask for a specific count.
pub const DEFAULT_TOP_K: usize = 3;

/// Errors that can occur during query processing.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Storage access failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Invalid query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Search query parameters.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// The search query text
    pub query: String,

    /// Maximum number of results to return
    pub top_k: usize,
}

impl SearchQuery {
    /// Create a new search query.
    ///
    /// # Arguments
    /// * `query` - The search query text
    /// * `top_k` - Maximum number of results to return (default: 3)
    pub fn new(query: String, top_k: Option<usize>) -> Self {
        Self {
            query,
            top_k: top_k.unwrap_or(DEFAULT_TOP_K),
        }
    }
}

/// Trait for search engines.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Execute a search query and return ranked hits.
    ///
    /// # Returns
    /// Hits sorted by ascending distance; an empty vector when nothing matches
    ///
    /// # Errors
    /// Returns `QueryError` for invalid queries and infrastructure failures,
    /// never for an empty result
    async fn search(&self, query: &SearchQuery) -> QueryResult<Vec<SearchHit>>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero magnitude. Vectors of different
/// lengths are compared over their common prefix.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Cosine distance (`1 - similarity`), in `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Search engine over a single collection.
pub struct CollectionSearchEngine<E, S>
where
    E: EmbeddingProvider,
    S: VectorStore,
{
    /// Provider used to embed query text
    embedding_provider: Arc<E>,

    /// Store holding the collection
    store: Arc<S>,

    collection: Collection,
}

impl<E, S> CollectionSearchEngine<E, S>
where
    E: EmbeddingProvider,
    S: VectorStore,
{
    /// Create a search engine for `collection`.
    ///
    /// `embedding_provider` must be the provider whose space the collection was
    /// built in.
    pub fn new(embedding_provider: Arc<E>, store: Arc<S>, collection: Collection) -> Self {
        Self {
            embedding_provider,
            store,
            collection,
        }
    }

    /// Collection this engine searches.
    pub fn collection(&self) -> Collection {
        self.collection
    }
}

#[async_trait]
impl<E, S> SearchEngine for CollectionSearchEngine<E, S>
where
    E: EmbeddingProvider,
    S: VectorStore,
{
    async fn search(&self, query: &SearchQuery) -> QueryResult<Vec<SearchHit>> {
        if query.query.trim().is_empty() {
            return Err(QueryError::InvalidQuery("Query text cannot be empty".to_string()));
        }
        if query.top_k == 0 {
            return Err(QueryError::InvalidQuery("top_k must be at least 1".to_string()));
        }

        let query_embedding = self
            .embedding_provider
            .embed(&query.query)
            .await
            .map_err(|e| QueryError::EmbeddingError(e.to_string()))?;

        let hits = self
            .store
            .query(self.collection, &query_embedding, query.top_k)
            .await
            .map_err(|e| QueryError::StorageError(e.to_string()))?;

        debug!(
            "Query '{}' on '{}' returned {} hits",
            query.query,
            self.collection,
            hits.len()
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingError, EmbeddingResult};
    use crate::models::{EmbeddingConfig, Record, RecordMetadata};
    use crate::storage::sqlite::SqliteVectorStore;
    use crate::storage::{StorageError, StorageResult};
    use std::sync::Mutex;

    // Mock EmbeddingProvider returning a fixed vector per query text
    struct MockEmbeddingProvider {
        dimension: usize,
        vectors: Vec<(String, Vec<f32>)>,
        calls: Mutex<Vec<String>>,
        should_fail: bool,
    }

    impl MockEmbeddingProvider {
        fn new(dimension: usize) -> Self {
            Self {
                dimension,
                vectors: Vec::new(),
                calls: Mutex::new(Vec::new()),
                should_fail: false,
            }
        }

        fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
            self.vectors.push((text.to_string(), vector));
            self
        }

        fn with_failure() -> Self {
            Self {
                should_fail: true,
                ..Self::new(3)
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbeddingProvider {
        async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
            self.calls.lock().unwrap().push(text.to_string());
            if self.should_fail {
                return Err(EmbeddingError::Other("Mock embedding failure".to_string()));
            }
            Ok(self
                .vectors
                .iter()
                .find(|(t, _)| t == text)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| vec![1.0; self.dimension]))
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "mock-model"
        }
    }

    // Mock store that is unavailable
    struct UnavailableStore;

    #[async_trait]
    impl VectorStore for UnavailableStore {
        async fn ensure_collection(&self, _: Collection, _: &EmbeddingConfig) -> StorageResult<()> {
            Err(StorageError::ConnectionError("store offline".to_string()))
        }

        async fn get_config(&self, _: Collection) -> StorageResult<Option<EmbeddingConfig>> {
            Err(StorageError::ConnectionError("store offline".to_string()))
        }

        async fn add(&self, _: Collection, _: &Record) -> StorageResult<bool> {
            Err(StorageError::ConnectionError("store offline".to_string()))
        }

        async fn query(&self, _: Collection, _: &[f32], _: usize) -> StorageResult<Vec<SearchHit>> {
            Err(StorageError::ConnectionError("store offline".to_string()))
        }

        async fn get(&self, _: Collection, _: &str) -> StorageResult<Option<Record>> {
            Err(StorageError::ConnectionError("store offline".to_string()))
        }

        async fn count(&self, _: Collection) -> StorageResult<usize> {
            Err(StorageError::ConnectionError("store offline".to_string()))
        }
    }

    async fn populated_store() -> Arc<SqliteVectorStore> {
        let store = SqliteVectorStore::open_in_memory().unwrap();
        let config = EmbeddingConfig {
            model_name: "mock-model".to_string(),
            dimension: 3,
        };
        store.ensure_collection(Collection::Images, &config).await.unwrap();

        let entries = [
            ("cat.png", vec![1.0, 0.0, 0.0]),
            ("dog.png", vec![0.8, 0.6, 0.0]),
            ("car.png", vec![0.0, 1.0, 0.0]),
            ("sky.png", vec![0.0, 0.0, 1.0]),
            ("sea.png", vec![0.1, 0.1, 0.9]),
        ];
        for (id, embedding) in entries {
            let record = Record {
                id: id.to_string(),
                embedding,
                document: None,
                metadata: RecordMetadata::new(id, format!("images/{}", id)),
            };
            store.add(Collection::Images, &record).await.unwrap();
        }
        Arc::new(store)
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);

        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_similarity(&a, &b) - 0.0).abs() < 1e-6);

        let a = vec![1.0, 1.0];
        let b = vec![-1.0, -1.0];
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_distance(&[0.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_query_defaults() {
        let query = SearchQuery::new("test query".to_string(), None);
        assert_eq!(query.top_k, 3);
    }

    #[tokio::test]
    async fn test_search_returns_top_k_in_distance_order() {
        let provider = MockEmbeddingProvider::new(3).with_vector("a cat", vec![1.0, 0.1, 0.0]);
        let engine = CollectionSearchEngine::new(Arc::new(provider), populated_store().await, Collection::Images);

        let hits = engine
            .search(&SearchQuery::new("a cat".to_string(), Some(3)))
            .await
            .unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "cat.png");
        assert_eq!(hits[1].id, "dog.png");
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[tokio::test]
    async fn test_search_is_idempotent() {
        let provider = MockEmbeddingProvider::new(3).with_vector("water", vec![0.0, 0.2, 1.0]);
        let engine = CollectionSearchEngine::new(Arc::new(provider), populated_store().await, Collection::Images);
        let query = SearchQuery::new("water".to_string(), Some(5));

        let first = engine.search(&query).await.unwrap();
        let second = engine.search(&query).await.unwrap();

        let summarize = |hits: &[SearchHit]| {
            hits.iter()
                .map(|h| (h.id.clone(), h.distance.to_bits()))
                .collect::<Vec<_>>()
        };
        assert_eq!(summarize(&first), summarize(&second));
        assert_eq!(first.len(), 5);
    }

    #[tokio::test]
    async fn test_search_empty_collection() {
        let store = SqliteVectorStore::open_in_memory().unwrap();
        let config = EmbeddingConfig {
            model_name: "mock-model".to_string(),
            dimension: 3,
        };
        store.ensure_collection(Collection::Papers, &config).await.unwrap();

        let engine = CollectionSearchEngine::new(
            Arc::new(MockEmbeddingProvider::new(3)),
            Arc::new(store),
            Collection::Papers,
        );
        let hits = engine
            .search(&SearchQuery::new("anything".to_string(), None))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected_before_embedding() {
        let provider = Arc::new(MockEmbeddingProvider::new(3));
        let engine = CollectionSearchEngine::new(provider.clone(), populated_store().await, Collection::Images);

        let result = engine.search(&SearchQuery::new("   ".to_string(), None)).await;
        assert!(matches!(result, Err(QueryError::InvalidQuery(_))));

        let result = engine.search(&SearchQuery::new("cat".to_string(), Some(0))).await;
        assert!(matches!(result, Err(QueryError::InvalidQuery(_))));

        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_error_propagation() {
        let engine = CollectionSearchEngine::new(
            Arc::new(MockEmbeddingProvider::with_failure()),
            populated_store().await,
            Collection::Images,
        );

        let result = engine.search(&SearchQuery::new("test".to_string(), None)).await;
        match result {
            Err(QueryError::EmbeddingError(_)) => {}
            other => panic!("Expected EmbeddingError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_storage_error_propagation() {
        let engine = CollectionSearchEngine::new(
            Arc::new(MockEmbeddingProvider::new(3)),
            Arc::new(UnavailableStore),
            Collection::Papers,
        );

        let result = engine.search(&SearchQuery::new("test".to_string(), None)).await;
        match result {
            Err(QueryError::StorageError(msg)) => assert!(msg.contains("store offline")),
            other => panic!("Expected StorageError, got {:?}", other),
        }
    }
}
