//! Core data models for the multimodal indexer.
//!
//! This module contains the fundamental data structures shared by the ingestion
//! pipelines, the vector store and the query layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Distance space used by every collection.
pub const COSINE_SPACE: &str = "cosine";

/// A named partition of the vector store sharing one embedding space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// PDF papers, embedded with the text model
    Papers,

    /// Images, embedded with the joint image/text model
    Images,
}

impl Collection {
    /// Name under which the collection is persisted.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Papers => "papers",
            Collection::Images => "images",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Display metadata stored alongside each embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordMetadata {
    /// Original filename of the ingested file
    pub filename: String,

    /// Where the file lives after ingestion
    pub path: String,

    /// Comma-joined topics (papers only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<String>,

    /// Leading text of the document (papers only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl RecordMetadata {
    /// Metadata for a record without topics or snippet.
    pub fn new(filename: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            path: path.into(),
            topics: None,
            snippet: None,
        }
    }
}

/// A single entry of a collection.
///
/// Records are identified by the original filename. They are created once at
/// ingestion time and never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Identifier, unique within a collection
    pub id: String,

    /// Embedding vector; its length must match the collection dimension
    pub embedding: Vec<f32>,

    /// Searchable text stored with the record (papers only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,

    /// Display metadata
    pub metadata: RecordMetadata,
}

/// Relevance classification for search hits.
///
/// Hits are categorized by their cosine similarity (`1 - distance`) to the query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelevanceLevel {
    /// Cosine similarity > 0.95
    Identical,

    /// Cosine similarity > 0.85
    HighlySimilar,

    /// Cosine similarity > 0.70
    Similar,

    /// Anything else that made it into the top-k
    Relevant,
}

impl RelevanceLevel {
    /// Determine relevance level from a cosine distance.
    pub fn from_distance(distance: f32) -> Self {
        let score = 1.0 - distance;
        if score > 0.95 {
            RelevanceLevel::Identical
        } else if score > 0.85 {
            RelevanceLevel::HighlySimilar
        } else if score > 0.70 {
            RelevanceLevel::Similar
        } else {
            RelevanceLevel::Relevant
        }
    }

    /// Upper-case label used in tabular output.
    pub fn label(&self) -> &'static str {
        match self {
            RelevanceLevel::Identical => "IDENTICAL",
            RelevanceLevel::HighlySimilar => "HIGHLY_SIMILAR",
            RelevanceLevel::Similar => "SIMILAR",
            RelevanceLevel::Relevant => "RELEVANT",
        }
    }
}

/// A single nearest-neighbor hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Record identifier
    pub id: String,

    /// Record metadata
    pub metadata: RecordMetadata,

    /// Stored document text, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,

    /// Cosine distance to the query (0.0 is identical, lower is better)
    pub distance: f32,

    /// Categorical relevance derived from the distance
    pub relevance: RelevanceLevel,
}

impl SearchHit {
    /// Build a hit from a stored record and its distance to the query.
    pub fn new(id: String, metadata: RecordMetadata, document: Option<String>, distance: f32) -> Self {
        Self {
            id,
            metadata,
            document,
            distance,
            relevance: RelevanceLevel::from_distance(distance),
        }
    }
}

/// Configuration persisted with each collection.
///
/// Stored at collection creation so that ingestion and query-time embeddings
/// always come from the same model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingConfig {
    /// Name/identifier of the embedding model (e.g., "AllMiniLML6V2")
    pub model_name: String,

    /// Dimension of the embedding vectors
    pub dimension: usize,
}
