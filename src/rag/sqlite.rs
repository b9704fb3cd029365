//! SQLite-backed index store.
//!
//! Chunks and documents live in SQLite; similarity search is a brute-force
//! cosine scan over the stored embeddings. Multi-row writes run inside a
//! transaction, so readers never see a partial batch.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::identifier::ChunkId;
use super::store::{DocumentRecord, IndexStore, SearchHit, StoredChunk};
use crate::core::config::AppPaths;
use crate::core::errors::RagError;
use crate::vector_math::{deserialize_embedding, rank_ascending_by_distance, serialize_embedding};

const EXISTS_BATCH: usize = 500;

pub struct SqliteIndexStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteIndexStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, RagError> {
        Self::with_path(paths.db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, RagError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(RagError::store)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                file_path TEXT NOT NULL DEFAULT '',
                uploaded_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::store)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                document_id INTEGER REFERENCES documents(id) ON DELETE CASCADE,
                source TEXT NOT NULL,
                page INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::store)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
            .execute(&self.pool)
            .await
            .map_err(RagError::store)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)")
            .execute(&self.pool)
            .await
            .map_err(RagError::store)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::store)?;

        Ok(())
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> StoredChunk {
        let page: i64 = row.get("page");
        let chunk_index: i64 = row.get("chunk_index");
        StoredChunk {
            id: ChunkId::new(
                row.get::<String, _>("source"),
                page as u32,
                chunk_index as u32,
            ),
            content: row.get("content"),
            document_id: row.get("document_id"),
        }
    }

    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> DocumentRecord {
        DocumentRecord {
            id: row.get("id"),
            name: row.get("name"),
            file_path: row.get("file_path"),
            uploaded_at: row.get("uploaded_at"),
        }
    }

    async fn remove_stored_file(file_path: &str) {
        if file_path.is_empty() {
            return;
        }
        match tokio::fs::remove_file(file_path).await {
            Ok(()) => tracing::debug!("Removed stored file {}", file_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove stored file {}: {}", file_path, e),
        }
    }
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn exists(&self, chunk_id: &ChunkId) -> Result<bool, RagError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM chunks WHERE chunk_id = ?1")
            .bind(chunk_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(RagError::store)?;
        Ok(found.is_some())
    }

    async fn existing_ids(&self, ids: &[ChunkId]) -> Result<HashSet<String>, RagError> {
        let mut existing = HashSet::new();

        for batch in ids.chunks(EXISTS_BATCH) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT chunk_id FROM chunks WHERE chunk_id IN (");
            let mut separated = builder.separated(", ");
            for id in batch {
                separated.push_bind(id.to_string());
            }
            separated.push_unseparated(")");

            let rows = builder
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(RagError::store)?;
            existing.extend(rows.iter().map(|row| row.get::<String, _>("chunk_id")));
        }

        Ok(existing)
    }

    async fn insert_many(&self, items: Vec<(StoredChunk, Vec<f32>)>) -> Result<usize, RagError> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(RagError::store)?;
        let mut inserted = 0usize;

        for (chunk, embedding) in &items {
            let blob = serialize_embedding(embedding);
            let result = sqlx::query(
                "INSERT OR IGNORE INTO chunks
                    (chunk_id, document_id, source, page, chunk_index, content, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(chunk.id.to_string())
            .bind(chunk.document_id)
            .bind(&chunk.id.source)
            .bind(chunk.id.page as i64)
            .bind(chunk.id.chunk_index as i64)
            .bind(&chunk.content)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(RagError::store)?;

            inserted += result.rows_affected() as usize;
        }

        tx.commit().await.map_err(RagError::store)?;
        Ok(inserted)
    }

    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchHit>, RagError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT chunk_id, document_id, source, page, chunk_index, content, embedding
             FROM chunks
             ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::store)?;

        let mut chunks = Vec::with_capacity(rows.len());
        let mut embeddings = Vec::with_capacity(rows.len());
        for row in &rows {
            let embedding_bytes: Vec<u8> = row.get("embedding");
            let stored = deserialize_embedding(&embedding_bytes);
            if stored.len() != query_embedding.len() {
                tracing::warn!(
                    "Embedding dimension mismatch for {}: {} != {}",
                    row.get::<String, _>("chunk_id"),
                    stored.len(),
                    query_embedding.len()
                );
            }
            embeddings.push(stored);
            chunks.push(Self::row_to_chunk(row));
        }

        // stable: equal distances keep rowid order
        let hits = rank_ascending_by_distance(query_embedding, &embeddings)
            .into_iter()
            .take(k)
            .map(|(idx, distance)| SearchHit {
                chunk: chunks[idx].clone(),
                distance,
            })
            .collect();

        Ok(hits)
    }

    async fn count(&self) -> Result<usize, RagError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(RagError::store)?;
        Ok(count as usize)
    }

    async fn list_sources(&self) -> Result<BTreeSet<String>, RagError> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT chunk_id FROM chunks")
            .fetch_all(&self.pool)
            .await
            .map_err(RagError::store)?;

        let mut sources = BTreeSet::new();
        for raw in ids {
            match raw.parse::<ChunkId>() {
                Ok(id) => {
                    sources.insert(id.source);
                }
                Err(e) => tracing::warn!("Skipping stored chunk: {}", e),
            }
        }
        Ok(sources)
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize, RagError> {
        let mut tx = self.pool.begin().await.map_err(RagError::store)?;

        let document = sqlx::query("SELECT id, name, file_path, uploaded_at FROM documents WHERE name = ?1")
            .bind(source)
            .fetch_optional(&mut *tx)
            .await
            .map_err(RagError::store)?
            .as_ref()
            .map(Self::row_to_document);

        let mut removed = sqlx::query("DELETE FROM chunks WHERE source = ?1")
            .bind(source)
            .execute(&mut *tx)
            .await
            .map_err(RagError::store)?
            .rows_affected() as usize;

        if let Some(document) = &document {
            // chunks still attached under another source name go with the document
            removed += sqlx::query("DELETE FROM chunks WHERE document_id = ?1")
                .bind(document.id)
                .execute(&mut *tx)
                .await
                .map_err(RagError::store)?
                .rows_affected() as usize;

            sqlx::query("DELETE FROM documents WHERE id = ?1")
                .bind(document.id)
                .execute(&mut *tx)
                .await
                .map_err(RagError::store)?;
        }

        if document.is_none() && removed == 0 {
            return Err(RagError::NotFound(source.to_string()));
        }

        tx.commit().await.map_err(RagError::store)?;

        // bytes go only once no row references them
        if let Some(document) = document {
            Self::remove_stored_file(&document.file_path).await;
        }

        tracing::info!("Deleted {} chunks for source {}", removed, source);
        Ok(removed)
    }

    async fn upsert_document(&self, name: &str, file_path: &str) -> Result<DocumentRecord, RagError> {
        sqlx::query(
            "INSERT INTO documents (name, file_path, uploaded_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET file_path = excluded.file_path",
        )
        .bind(name)
        .bind(file_path)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(RagError::store)?;

        self.get_document(name)
            .await?
            .ok_or_else(|| RagError::IndexStore(format!("document '{}' vanished after upsert", name)))
    }

    async fn get_document(&self, name: &str) -> Result<Option<DocumentRecord>, RagError> {
        let row = sqlx::query("SELECT id, name, file_path, uploaded_at FROM documents WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(RagError::store)?;

        Ok(row.as_ref().map(Self::row_to_document))
    }

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>, RagError> {
        let rows = sqlx::query("SELECT id, name, file_path, uploaded_at FROM documents ORDER BY uploaded_at, id")
            .fetch_all(&self.pool)
            .await
            .map_err(RagError::store)?;

        Ok(rows.iter().map(Self::row_to_document).collect())
    }

    async fn clear(&self) -> Result<(), RagError> {
        let file_paths: Vec<String> = sqlx::query_scalar("SELECT file_path FROM documents")
            .fetch_all(&self.pool)
            .await
            .map_err(RagError::store)?;

        let mut tx = self.pool.begin().await.map_err(RagError::store)?;
        sqlx::query("DELETE FROM chunks")
            .execute(&mut *tx)
            .await
            .map_err(RagError::store)?;
        sqlx::query("DELETE FROM documents")
            .execute(&mut *tx)
            .await
            .map_err(RagError::store)?;
        tx.commit().await.map_err(RagError::store)?;

        for path in file_paths {
            Self::remove_stored_file(&path).await;
        }
        Ok(())
    }

    async fn embedding_model(&self) -> Result<Option<String>, RagError> {
        sqlx::query_scalar("SELECT value FROM rag_meta WHERE key = 'embedding_model'")
            .fetch_optional(&self.pool)
            .await
            .map_err(RagError::store)
    }

    async fn set_embedding_model(&self, model: &str) -> Result<(), RagError> {
        sqlx::query(
            "INSERT OR REPLACE INTO rag_meta (key, value, updated_at)
             VALUES ('embedding_model', ?1, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        )
        .bind(model)
        .execute(&self.pool)
        .await
        .map_err(RagError::store)?;
        Ok(())
    }
}
