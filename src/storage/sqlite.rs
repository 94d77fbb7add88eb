//! SQLite vector store implementation.
//!
//! This module provides a SQLite-based implementation of the `VectorStore` trait.
//! The store lives in a single database file inside the configured store
//! directory. Embeddings are stored as little-endian float32 BLOBs and ranked by
//! brute-force cosine distance at query time.
//!
//! # Schema
//! - `collections`: (name TEXT PRIMARY KEY, space TEXT, model_name TEXT, dimension INTEGER)
//! - `records`: (collection TEXT, id TEXT, embedding BLOB, document TEXT, metadata TEXT),
//!   primary key (collection, id)

use super::{StorageError, StorageResult, VectorStore};
use crate::models::{Collection, EmbeddingConfig, Record, RecordMetadata, SearchHit, COSINE_SPACE};
use crate::query::cosine_distance;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// File name of the database inside the store directory.
pub const DATABASE_FILE: &str = "index.sqlite3";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS collections (
        name TEXT PRIMARY KEY,
        space TEXT NOT NULL,
        model_name TEXT NOT NULL,
        dimension INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS records (
        collection TEXT NOT NULL REFERENCES collections(name),
        id TEXT NOT NULL,
        embedding BLOB NOT NULL,
        document TEXT,
        metadata TEXT NOT NULL,
        PRIMARY KEY (collection, id)
    );
";

/// Directory-backed vector store on top of SQLite.
///
/// The connection sits behind a mutex so the store can be shared by reference
/// across pipelines; calls are expected to be sequential.
pub struct SqliteVectorStore {
    connection: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Open (or create) the store inside `store_dir`.
    ///
    /// # Errors
    /// Returns `StorageError::ConnectionError` if the directory or database
    /// cannot be created, or `StorageError::SchemaError` if schema setup fails
    pub fn open(store_dir: impl AsRef<Path>) -> StorageResult<Self> {
        let store_dir = store_dir.as_ref();
        std::fs::create_dir_all(store_dir).map_err(|e| {
            StorageError::ConnectionError(format!(
                "Failed to create store directory {}: {}",
                store_dir.display(),
                e
            ))
        })?;

        let db_path = store_dir.join(DATABASE_FILE);
        let connection = Connection::open(&db_path)
            .map_err(|e| StorageError::ConnectionError(format!("{}: {}", db_path.display(), e)))?;

        info!("Opened vector store at {}", db_path.display());
        Self::with_connection(connection)
    }

    /// Open a throwaway in-memory store.
    pub fn open_in_memory() -> StorageResult<Self> {
        let connection =
            Connection::open_in_memory().map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Self::with_connection(connection)
    }

    fn with_connection(connection: Connection) -> StorageResult<Self> {
        connection
            .execute_batch(SCHEMA)
            .map_err(|e| StorageError::SchemaError(e.to_string()))?;

        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| StorageError::ConnectionError("Connection mutex poisoned".to_string()))
    }

    /// Serialize an embedding vector to bytes for BLOB storage.
    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|value| value.to_le_bytes()).collect()
    }

    /// Deserialize an embedding vector from BLOB bytes.
    ///
    /// # Errors
    /// Returns `StorageError::SerializationError` if the byte length is not a
    /// multiple of four
    fn deserialize_embedding(bytes: &[u8]) -> StorageResult<Vec<f32>> {
        if bytes.len() % 4 != 0 {
            return Err(StorageError::SerializationError(format!(
                "Embedding blob has invalid length {}",
                bytes.len()
            )));
        }

        Ok(bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }

    fn parse_metadata(json: &str) -> StorageResult<RecordMetadata> {
        serde_json::from_str(json).map_err(|e| StorageError::SerializationError(e.to_string()))
    }

    fn read_config(conn: &Connection, collection: Collection) -> StorageResult<Option<(EmbeddingConfig, String)>> {
        conn.query_row(
            "SELECT model_name, dimension, space FROM collections WHERE name = ?1",
            params![collection.name()],
            |row| {
                Ok((
                    EmbeddingConfig {
                        model_name: row.get(0)?,
                        dimension: row.get::<_, i64>(1)? as usize,
                    },
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()
        .map_err(|e| StorageError::QueryError(e.to_string()))
    }

    /// Stored configuration of `collection`, or `NotFound` if it was never created.
    fn require_config(conn: &Connection, collection: Collection) -> StorageResult<EmbeddingConfig> {
        Self::read_config(conn, collection)?
            .map(|(config, _)| config)
            .ok_or_else(|| StorageError::NotFound(collection.name().to_string()))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn ensure_collection(&self, collection: Collection, config: &EmbeddingConfig) -> StorageResult<()> {
        let conn = self.lock()?;

        match Self::read_config(&conn, collection)? {
            Some((stored, space)) => {
                if space != COSINE_SPACE {
                    return Err(StorageError::SchemaError(format!(
                        "Collection '{}' uses unsupported distance space '{}'",
                        collection, space
                    )));
                }
                if stored.model_name != config.model_name {
                    return Err(StorageError::ConfigMismatch {
                        collection: collection.to_string(),
                        reason: format!(
                            "provider uses model '{}' but collection was built with '{}'",
                            config.model_name, stored.model_name
                        ),
                    });
                }
                if stored.dimension != config.dimension {
                    return Err(StorageError::ConfigMismatch {
                        collection: collection.to_string(),
                        reason: format!(
                            "provider has dimension {} but collection has {}",
                            config.dimension, stored.dimension
                        ),
                    });
                }
                debug!("Collection '{}' matches {:?}", collection, config);
            }
            None => {
                conn.execute(
                    "INSERT INTO collections (name, space, model_name, dimension) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        collection.name(),
                        COSINE_SPACE,
                        config.model_name,
                        config.dimension as i64
                    ],
                )
                .map_err(|e| StorageError::QueryError(e.to_string()))?;
                info!(
                    "Created collection '{}' (model={}, dimension={})",
                    collection, config.model_name, config.dimension
                );
            }
        }

        Ok(())
    }

    async fn get_config(&self, collection: Collection) -> StorageResult<Option<EmbeddingConfig>> {
        let conn = self.lock()?;
        Ok(Self::read_config(&conn, collection)?.map(|(config, _)| config))
    }

    async fn add(&self, collection: Collection, record: &Record) -> StorageResult<bool> {
        let conn = self.lock()?;
        let config = Self::require_config(&conn, collection)?;

        if record.embedding.len() != config.dimension {
            return Err(StorageError::DimensionMismatch {
                expected: config.dimension,
                actual: record.embedding.len(),
            });
        }

        let metadata = serde_json::to_string(&record.metadata)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO records (collection, id, embedding, document, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    collection.name(),
                    record.id,
                    Self::serialize_embedding(&record.embedding),
                    record.document,
                    metadata
                ],
            )
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(changed > 0)
    }

    async fn query(&self, collection: Collection, embedding: &[f32], top_k: usize) -> StorageResult<Vec<SearchHit>> {
        let conn = self.lock()?;
        let config = Self::require_config(&conn, collection)?;

        if embedding.len() != config.dimension {
            return Err(StorageError::DimensionMismatch {
                expected: config.dimension,
                actual: embedding.len(),
            });
        }

        let mut stmt = conn
            .prepare("SELECT id, embedding, document, metadata FROM records WHERE collection = ?1")
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        let rows = stmt
            .query_map(params![collection.name()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        let mut hits = Vec::new();
        for row in rows {
            let (id, blob, document, metadata) = row.map_err(|e| StorageError::QueryError(e.to_string()))?;
            let stored = Self::deserialize_embedding(&blob)?;
            let distance = cosine_distance(embedding, &stored);
            hits.push(SearchHit::new(id, Self::parse_metadata(&metadata)?, document, distance));
        }

        // Ties broken by id so identical queries give identical rankings.
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(top_k);

        Ok(hits)
    }

    async fn get(&self, collection: Collection, id: &str) -> StorageResult<Option<Record>> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                "SELECT embedding, document, metadata FROM records WHERE collection = ?1 AND id = ?2",
                params![collection.name(), id],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        row.map(|(blob, document, metadata)| {
            Ok(Record {
                id: id.to_string(),
                embedding: Self::deserialize_embedding(&blob)?,
                document,
                metadata: Self::parse_metadata(&metadata)?,
            })
        })
        .transpose()
    }

    async fn count(&self, collection: Collection) -> StorageResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM records WHERE collection = ?1",
                params![collection.name()],
                |row| row.get(0),
            )
            .map_err(|e| StorageError::QueryError(e.to_string()))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(model: &str, dimension: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: model.to_string(),
            dimension,
        }
    }

    fn record(id: &str, embedding: Vec<f32>) -> Record {
        Record {
            id: id.to_string(),
            embedding,
            document: Some(format!("document of {}", id)),
            metadata: RecordMetadata::new(id, format!("docs/{}", id)),
        }
    }

    async fn store_with_papers(dimension: usize) -> SqliteVectorStore {
        let store = SqliteVectorStore::open_in_memory().unwrap();
        store
            .ensure_collection(Collection::Papers, &config("test-model", dimension))
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_embedding_blob_layout() {
        let bytes = SqliteVectorStore::serialize_embedding(&[1.0, -2.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(
            SqliteVectorStore::deserialize_embedding(&bytes).unwrap(),
            vec![1.0, -2.5]
        );
    }

    #[test]
    fn test_deserialize_rejects_truncated_blob() {
        let result = SqliteVectorStore::deserialize_embedding(&[0, 0, 128]);
        assert!(matches!(result, Err(StorageError::SerializationError(_))));
    }

    #[tokio::test]
    async fn test_ensure_collection_is_idempotent() {
        let store = store_with_papers(3).await;
        store
            .ensure_collection(Collection::Papers, &config("test-model", 3))
            .await
            .unwrap();

        let stored = store.get_config(Collection::Papers).await.unwrap();
        assert_eq!(stored, Some(config("test-model", 3)));
        assert_eq!(store.get_config(Collection::Images).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ensure_collection_rejects_model_mismatch() {
        let store = store_with_papers(3).await;
        let result = store
            .ensure_collection(Collection::Papers, &config("other-model", 3))
            .await;

        match result {
            Err(StorageError::ConfigMismatch { collection, reason }) => {
                assert_eq!(collection, "papers");
                assert!(reason.contains("other-model"));
                assert!(reason.contains("test-model"));
            }
            other => panic!("Expected ConfigMismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ensure_collection_rejects_dimension_mismatch() {
        let store = store_with_papers(3).await;
        let result = store
            .ensure_collection(Collection::Papers, &config("test-model", 384))
            .await;
        assert!(matches!(result, Err(StorageError::ConfigMismatch { .. })));
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let store = store_with_papers(3).await;
        let inserted = store
            .add(Collection::Papers, &record("a.pdf", vec![1.0, 0.0, 0.0]))
            .await
            .unwrap();
        assert!(inserted);

        let fetched = store.get(Collection::Papers, "a.pdf").await.unwrap().unwrap();
        assert_eq!(fetched.embedding, vec![1.0, 0.0, 0.0]);
        assert_eq!(fetched.metadata.path, "docs/a.pdf");
        assert_eq!(fetched.document.as_deref(), Some("document of a.pdf"));

        assert!(store.get(Collection::Papers, "missing.pdf").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_keeps_first_record() {
        let store = store_with_papers(3).await;
        store
            .add(Collection::Papers, &record("a.pdf", vec![1.0, 0.0, 0.0]))
            .await
            .unwrap();

        let inserted = store
            .add(Collection::Papers, &record("a.pdf", vec![0.0, 1.0, 0.0]))
            .await
            .unwrap();
        assert!(!inserted);
        assert_eq!(store.count(Collection::Papers).await.unwrap(), 1);

        let fetched = store.get(Collection::Papers, "a.pdf").await.unwrap().unwrap();
        assert_eq!(fetched.embedding, vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_add_rejects_wrong_dimension() {
        let store = store_with_papers(3).await;
        let result = store.add(Collection::Papers, &record("a.pdf", vec![1.0, 0.0])).await;
        assert!(matches!(
            result,
            Err(StorageError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[tokio::test]
    async fn test_add_to_unknown_collection() {
        let store = store_with_papers(3).await;
        let result = store.add(Collection::Images, &record("a.png", vec![1.0, 0.0, 0.0])).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_query_orders_by_distance_and_truncates() {
        let store = store_with_papers(3).await;
        let entries = [
            ("p1.pdf", vec![0.0, 1.0, 0.0]),
            ("p2.pdf", vec![1.0, 0.0, 0.0]),
            ("p3.pdf", vec![0.6, 0.8, 0.0]),
            ("p4.pdf", vec![0.9, 0.1, 0.0]),
            ("p5.pdf", vec![-1.0, 0.0, 0.0]),
        ];
        for (id, embedding) in entries {
            store.add(Collection::Papers, &record(id, embedding)).await.unwrap();
        }

        let hits = store.query(Collection::Papers, &[1.0, 0.0, 0.0], 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "p2.pdf");
        assert_eq!(hits[1].id, "p4.pdf");
        assert_eq!(hits[2].id, "p3.pdf");
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_query_empty_collection() {
        let store = store_with_papers(3).await;
        let hits = store.query(Collection::Papers, &[1.0, 0.0, 0.0], 3).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_query_rejects_wrong_dimension() {
        let store = store_with_papers(3).await;
        let result = store.query(Collection::Papers, &[1.0, 0.0], 3).await;
        assert!(matches!(result, Err(StorageError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = store_with_papers(3).await;
        store
            .ensure_collection(Collection::Images, &config("clip", 3))
            .await
            .unwrap();
        store
            .add(Collection::Papers, &record("same-name", vec![1.0, 0.0, 0.0]))
            .await
            .unwrap();

        assert!(store
            .add(Collection::Images, &record("same-name", vec![0.0, 1.0, 0.0]))
            .await
            .unwrap());
        assert_eq!(store.count(Collection::Papers).await.unwrap(), 1);
        assert_eq!(store.count(Collection::Images).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SqliteVectorStore::open(dir.path()).unwrap();
            store
                .ensure_collection(Collection::Papers, &config("test-model", 3))
                .await
                .unwrap();
            store
                .add(Collection::Papers, &record("a.pdf", vec![1.0, 0.0, 0.0]))
                .await
                .unwrap();
        }

        let reopened = SqliteVectorStore::open(dir.path()).unwrap();
        assert!(dir.path().join(DATABASE_FILE).is_file());
        assert_eq!(reopened.count(Collection::Papers).await.unwrap(), 1);
        assert_eq!(
            reopened.get_config(Collection::Papers).await.unwrap(),
            Some(config("test-model", 3))
        );
    }
}
