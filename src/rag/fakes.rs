//! In-crate stand-ins for the model services.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::errors::RagError;
use crate::llm::{Embedder, FragmentReceiver, LanguageModel};
use crate::rag::SqliteIndexStore;

const VOCABULARY: [&str; 8] = [
    "paris", "france", "capital", "raclette", "cheese", "mountain", "rust", "ship",
];

/// Embeds text as keyword counts over a fixed vocabulary.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
    pub unavailable: bool,
}

impl KeywordEmbedder {
    pub fn unavailable() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            unavailable: true,
        }
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        VOCABULARY
            .iter()
            .map(|term| words.iter().filter(|w| *w == term).count() as f32)
            .collect()
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(RagError::EmbeddingServiceUnavailable(
                "connection refused".to_string(),
            ));
        }
        Ok(Self::vector(text))
    }
}

/// Streams the prompt back word by word and records every call.
#[derive(Default)]
pub struct EchoModel {
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl LanguageModel for EchoModel {
    fn model_name(&self) -> &str {
        "echo-test"
    }

    async fn stream_generate(&self, prompt: &str) -> Result<FragmentReceiver, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        let fragments: Vec<String> = prompt.split_inclusive(' ').map(str::to_string).collect();
        let (tx, rx) = mpsc::channel(fragments.len().max(1));
        for fragment in fragments {
            tx.send(Ok(fragment)).await.unwrap();
        }
        Ok(rx)
    }

    async fn pull_model(&self) -> Result<(), RagError> {
        Ok(())
    }
}

pub async fn temp_store() -> Arc<SqliteIndexStore> {
    let path = std::env::temp_dir().join(format!("docqa-test-{}.db", uuid::Uuid::new_v4()));
    Arc::new(SqliteIndexStore::with_path(path).await.unwrap())
}
