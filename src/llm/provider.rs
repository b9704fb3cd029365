use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::errors::RagError;

/// Receiving end of a streamed generation. Dropping it cancels the request.
pub type FragmentReceiver = mpsc::Receiver<Result<String, RagError>>;

/// Text to fixed-length vector. The same model must embed chunks and queries.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// name of the embedding model, recorded alongside the index
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Start a streaming completion. Fails with `ModelNotFound` before any
    /// fragment is produced when the model is not installed.
    async fn stream_generate(&self, prompt: &str) -> Result<FragmentReceiver, RagError>;

    /// Fetch the model onto the server, blocking until it is available.
    async fn pull_model(&self) -> Result<(), RagError>;
}
