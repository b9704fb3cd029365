//! Ingestion and retrieval pipeline.
//!
//! Ingestion: `DocumentLoader` → `TextSplitter` → `assign_chunk_ids` →
//! `IndexStore`, driven by `Ingestor`. Querying: `QueryEngine` embeds the
//! question, searches the same store and streams the model's answer.

mod engine;
mod identifier;
mod ingest;
mod loader;
mod prompt;
mod splitter;
mod sqlite;
mod store;

#[cfg(test)]
pub(crate) mod fakes;

pub use engine::{Answer, AnswerStream, QueryEngine};
pub use identifier::{assign_chunk_ids, page_id, ChunkId, IdentifiedChunk};
pub use ingest::{IngestReport, Ingestor};
pub use loader::{is_supported, DocumentLoader, PageText};
pub use prompt::{build_context, PromptTemplate};
pub use splitter::{ChunkCandidate, TextSplitter};
pub use sqlite::SqliteIndexStore;
pub use store::{DocumentRecord, IndexStore, SearchHit, StoredChunk};
