//! Storage interface for the chunk index.
//!
//! The index holds every ingested chunk with its embedding, plus the
//! documents that own uploaded chunks. The primary implementation is
//! `SqliteIndexStore` in the `sqlite` module.

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::identifier::ChunkId;
use crate::core::errors::RagError;

/// An uploaded source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: i64,
    /// Display name; also the source locator of its chunks.
    pub name: String,
    /// Where the uploaded bytes are stored.
    pub file_path: String,
    pub uploaded_at: String,
}

/// A stored chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: ChunkId,
    pub content: String,
    /// Owning document, or `None` for chunks ingested from a raw source path.
    pub document_id: Option<i64>,
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: StoredChunk,
    /// Cosine distance (lower = closer).
    pub distance: f32,
}

#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn exists(&self, chunk_id: &ChunkId) -> Result<bool, RagError>;

    /// Subset of `ids` already present, as canonical id strings.
    async fn existing_ids(&self, ids: &[ChunkId]) -> Result<HashSet<String>, RagError>;

    /// Insert chunks whose id is not yet stored, all-or-nothing.
    ///
    /// Returns the number of rows actually added; already present ids are
    /// skipped silently.
    async fn insert_many(&self, items: Vec<(StoredChunk, Vec<f32>)>) -> Result<usize, RagError>;

    /// The `k` nearest chunks by ascending cosine distance. Ties keep the
    /// store's insertion order. Returns fewer than `k` when the index is smaller.
    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchHit>, RagError>;

    async fn count(&self) -> Result<usize, RagError>;

    /// Distinct sources, taken from the stored chunk ids.
    async fn list_sources(&self) -> Result<BTreeSet<String>, RagError>;

    /// Remove every chunk of `source` and the document of that name, together
    /// with its stored bytes. Returns the number of chunks removed.
    async fn delete_by_source(&self, source: &str) -> Result<usize, RagError>;

    /// Register an uploaded document, or return the existing record of that name.
    async fn upsert_document(&self, name: &str, file_path: &str) -> Result<DocumentRecord, RagError>;

    async fn get_document(&self, name: &str) -> Result<Option<DocumentRecord>, RagError>;

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>, RagError>;

    /// Drop every chunk and document.
    async fn clear(&self) -> Result<(), RagError>;

    /// Embedding model the stored vectors were produced with, if recorded.
    async fn embedding_model(&self) -> Result<Option<String>, RagError>;

    async fn set_embedding_model(&self, model: &str) -> Result<(), RagError>;
}
