//! Ingestion service: loader, splitter, identifier, dedup, embed, store.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::identifier::{assign_chunk_ids, ChunkId};
use super::loader::{is_supported, DocumentLoader, PageText};
use super::splitter::TextSplitter;
use super::store::{DocumentRecord, IndexStore, StoredChunk};
use crate::core::config::RagSettings;
use crate::core::errors::RagError;
use crate::llm::Embedder;

const EMBED_BATCH_SIZE: usize = 32;

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Chunks derived from the input.
    pub chunks: usize,
    /// Chunks actually added; the rest were already stored.
    pub added: usize,
}

pub struct Ingestor {
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn Embedder>,
    loader: DocumentLoader,
    splitter: TextSplitter,
    documents_dir: PathBuf,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn Embedder>,
        settings: &RagSettings,
        documents_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            embedder,
            loader: DocumentLoader::new(),
            splitter: TextSplitter::new(settings.chunk_size, settings.chunk_overlap),
            documents_dir,
        }
    }

    /// Store an uploaded document and index its new chunks.
    ///
    /// Returns the number of chunks added, 0 when all were already indexed.
    pub async fn ingest(&self, bytes: &[u8], display_name: &str) -> Result<usize, RagError> {
        let name = Path::new(display_name.trim())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.is_empty() {
            return Err(RagError::MissingParameter("display_name".to_string()));
        }
        if bytes.is_empty() {
            return Err(RagError::MissingParameter("document".to_string()));
        }
        if !is_supported(Path::new(&name)) {
            return Err(RagError::UnsupportedDocument(name));
        }

        self.ensure_embedding_model().await?;

        // parsed before anything touches disk, so bad bytes never replace a stored file
        let pages = self.loader.load_upload(bytes.to_vec(), &name).await?;

        let existed = self.store.get_document(&name).await?.is_some();
        tokio::fs::create_dir_all(&self.documents_dir).await?;
        let file_path = self.documents_dir.join(&name);
        let staged_path = self.documents_dir.join(format!(".{}.partial", name));
        tokio::fs::write(&staged_path, bytes).await?;

        let indexed = match self
            .store
            .upsert_document(&name, &file_path.to_string_lossy())
            .await
        {
            Ok(document) => self.add_pages(pages, Some(document.id)).await,
            Err(e) => Err(e),
        };
        let report = match indexed {
            Ok(report) => report,
            Err(e) => {
                self.discard_upload(&name, &staged_path, existed).await;
                return Err(e);
            }
        };

        // rename replaces an older upload of the same name in one step
        if let Err(e) = tokio::fs::rename(&staged_path, &file_path).await {
            self.discard_upload(&name, &staged_path, existed).await;
            return Err(e.into());
        }

        tracing::info!(
            "Ingested {}: {} chunks, {} new",
            name,
            report.chunks,
            report.added
        );
        Ok(report.added)
    }

    /// Index every supported document under `dir` as raw-source chunks.
    pub async fn populate(&self, dir: &Path) -> Result<IngestReport, RagError> {
        self.ensure_embedding_model().await?;
        let pages = self.loader.load_dir(dir).await?;
        self.add_pages(pages, None).await
    }

    /// Drop every chunk and document.
    pub async fn reset(&self) -> Result<(), RagError> {
        tracing::info!("Clearing index");
        self.store.clear().await
    }

    pub async fn list_sources(&self) -> Result<BTreeSet<String>, RagError> {
        self.store.list_sources().await
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentRecord>, RagError> {
        self.store.list_documents().await
    }

    /// Remove a source's chunks and stored bytes. Returns the chunks removed.
    pub async fn delete(&self, source_name: &str) -> Result<usize, RagError> {
        let source_name = source_name.trim();
        if source_name.is_empty() {
            return Err(RagError::MissingParameter("source".to_string()));
        }
        self.store.delete_by_source(source_name).await
    }

    /// Undo a failed upload: the staged bytes always, the document row only
    /// when this upload created it.
    async fn discard_upload(&self, name: &str, staged_path: &Path, existed: bool) {
        if let Err(e) = tokio::fs::remove_file(staged_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove staged upload {}: {}", staged_path.display(), e);
            }
        }
        if existed {
            return;
        }
        match self.store.delete_by_source(name).await {
            Ok(_) | Err(RagError::NotFound(_)) => {}
            Err(e) => tracing::warn!("Failed to roll back document {}: {}", name, e),
        }
    }

    /// Clear the index when it was built with a different embedding model.
    async fn ensure_embedding_model(&self) -> Result<(), RagError> {
        let current = self.embedder.model_name();
        match self.store.embedding_model().await? {
            Some(recorded) if recorded == current => return Ok(()),
            Some(recorded) => {
                tracing::warn!(
                    "Embedding model changed from {} to {}, clearing index",
                    recorded,
                    current
                );
                self.store.clear().await?;
            }
            None => {}
        }
        self.store.set_embedding_model(current).await
    }

    async fn add_pages(
        &self,
        pages: Vec<PageText>,
        document_id: Option<i64>,
    ) -> Result<IngestReport, RagError> {
        let candidates = self.splitter.split(&pages);
        let chunks = assign_chunk_ids(candidates)?;

        let existing_count = self.store.count().await?;
        tracing::info!("Number of existing chunks in index: {}", existing_count);

        let ids: Vec<ChunkId> = chunks.iter().map(|c| c.id.clone()).collect();
        let existing = self.store.existing_ids(&ids).await?;
        let new_chunks: Vec<_> = chunks
            .iter()
            .filter(|c| !existing.contains(&c.id.to_string()))
            .collect();

        let mut report = IngestReport {
            chunks: chunks.len(),
            added: 0,
        };
        if new_chunks.is_empty() {
            tracing::info!("No new chunks to add");
            return Ok(report);
        }
        tracing::info!("Adding new chunks: {}", new_chunks.len());

        let mut items = Vec::with_capacity(new_chunks.len());
        for batch in new_chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(RagError::EmbeddingServiceUnavailable(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                items.push((
                    StoredChunk {
                        id: chunk.id.clone(),
                        content: chunk.text.clone(),
                        document_id,
                    },
                    vector,
                ));
            }
        }

        // one batch per document keeps the insert atomic
        report.added = self.store.insert_many(items).await?;
        Ok(report)
    }
}
