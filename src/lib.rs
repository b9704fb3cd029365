//! Document question answering over a local index.
//!
//! Documents are split into overlapping chunks, embedded and stored in
//! SQLite; questions are answered by a language model from the nearest
//! chunks, streamed back with the sources they came from.

pub mod core;
pub mod events;
pub mod llm;
pub mod rag;
pub mod state;
pub mod vector_math;

pub use crate::core::config::{AppConfig, AppPaths, ConfigService};
pub use crate::core::errors::RagError;
pub use crate::events::{ChannelEvent, EventHub};
pub use crate::rag::{Answer, AnswerStream, Ingestor, QueryEngine};
pub use crate::state::AppState;
