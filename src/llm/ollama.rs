use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Response, StatusCode};
use tokio::sync::mpsc;

use super::provider::{Embedder, FragmentReceiver, LanguageModel};
use super::types::{
    EmbedRequest, EmbedResponse, ErrorBody, GenerateChunk, GenerateRequest, PullRequest,
    PullResponse, TagModel, TagsResponse,
};
use crate::core::config::OllamaConfig;
use crate::core::errors::RagError;

const STREAM_CHANNEL_CAPACITY: usize = 32;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared HTTP connection to an Ollama server.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: Client,
    request_timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, RagError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(RagError::llm)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            request_timeout,
        })
    }

    pub fn from_config(config: &OllamaConfig) -> Result<Self, RagError> {
        Self::new(
            &config.base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).timeout(self.request_timeout).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    pub async fn list_models(&self) -> Result<Vec<TagModel>, RagError> {
        let url = format!("{}/api/tags", self.base_url);
        let res = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(RagError::llm)?;

        if !res.status().is_success() {
            return Err(RagError::LanguageModel(format!(
                "Failed to list models: {}",
                res.status()
            )));
        }

        let tags: TagsResponse = res.json().await.map_err(RagError::llm)?;
        Ok(tags.models)
    }

    pub async fn embed_many(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let res = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(&EmbedRequest { model, input: inputs })
            .send()
            .await
            .map_err(RagError::embedding)?;

        if !res.status().is_success() {
            return Err(error_from_response(res, model, RagError::EmbeddingServiceUnavailable).await);
        }

        let payload: EmbedResponse = res.json().await.map_err(RagError::embedding)?;
        if payload.embeddings.len() != inputs.len() {
            return Err(RagError::EmbeddingServiceUnavailable(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                payload.embeddings.len()
            )));
        }

        Ok(payload.embeddings)
    }

    pub async fn generate_stream(&self, model: &str, prompt: &str) -> Result<FragmentReceiver, RagError> {
        let url = format!("{}/api/generate", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model,
                prompt,
                stream: true,
            })
            .send()
            .await
            .map_err(RagError::llm)?;

        if !res.status().is_success() {
            return Err(error_from_response(res, model, RagError::LanguageModel).await);
        }

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            // bytes, so a multi-byte character split across reads survives
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(item) = stream.next().await {
                let bytes = match item {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(Err(RagError::llm(e))).await;
                        return;
                    }
                };
                buffer.extend_from_slice(&bytes);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match parse_generate_line(&String::from_utf8_lossy(&line)) {
                        LineOutcome::Skip => {}
                        LineOutcome::Fragment(text) => {
                            if tx.send(Ok(text)).await.is_err() {
                                // receiver dropped; abandon the response
                                return;
                            }
                        }
                        LineOutcome::Done => return,
                        LineOutcome::Failed(err) => {
                            let _ = tx.send(Err(err)).await;
                            return;
                        }
                    }
                }
            }

            // trailing line without newline
            match parse_generate_line(&String::from_utf8_lossy(&buffer)) {
                LineOutcome::Fragment(text) => {
                    let _ = tx.send(Ok(text)).await;
                }
                LineOutcome::Failed(err) => {
                    let _ = tx.send(Err(err)).await;
                }
                LineOutcome::Skip | LineOutcome::Done => {}
            }
        });

        Ok(rx)
    }

    pub async fn pull(&self, model: &str) -> Result<(), RagError> {
        tracing::info!("Pulling model {} from {}", model, self.base_url);
        let url = format!("{}/api/pull", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&PullRequest {
                model,
                stream: false,
            })
            .send()
            .await
            .map_err(RagError::llm)?;

        if !res.status().is_success() {
            return Err(error_from_response(res, model, RagError::LanguageModel).await);
        }

        let payload: PullResponse = res.json().await.map_err(RagError::llm)?;
        if let Some(error) = payload.error {
            return Err(RagError::LanguageModel(format!("pull failed: {}", error)));
        }
        if payload.status != "success" {
            return Err(RagError::LanguageModel(format!(
                "pull finished with status '{}'",
                payload.status
            )));
        }
        Ok(())
    }
}

enum LineOutcome {
    Skip,
    Fragment(String),
    Done,
    Failed(RagError),
}

fn parse_generate_line(line: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Skip;
    }

    match serde_json::from_str::<GenerateChunk>(line) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                return LineOutcome::Failed(RagError::LanguageModel(error));
            }
            if chunk.done {
                // the final line may still carry text
                if chunk.response.is_empty() {
                    return LineOutcome::Done;
                }
                return LineOutcome::Fragment(chunk.response);
            }
            if chunk.response.is_empty() {
                LineOutcome::Skip
            } else {
                LineOutcome::Fragment(chunk.response)
            }
        }
        Err(e) => {
            tracing::debug!("Skipping unparsable generate line: {}", e);
            LineOutcome::Skip
        }
    }
}

/// Map a non-success response to `ModelNotFound` when the server says so,
/// otherwise to the caller's error class.
async fn error_from_response(
    res: Response,
    model: &str,
    otherwise: fn(String) -> RagError,
) -> RagError {
    let status = res.status();
    let text = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);

    if is_model_not_found(status, &message) {
        return RagError::ModelNotFound(model.to_string());
    }
    otherwise(format!("{}: {}", status, message))
}

fn is_model_not_found(status: StatusCode, message: &str) -> bool {
    let message = message.to_lowercase();
    (status == StatusCode::NOT_FOUND && message.contains("not found"))
        || (message.contains("model") && message.contains("not found"))
}

/// Embedding adapter bound to one embedding model.
#[derive(Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.client.embed_many(&self.model, &[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::EmbeddingServiceUnavailable("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        self.client.embed_many(&self.model, texts).await
    }
}

/// Generation adapter bound to one language model.
#[derive(Clone)]
pub struct OllamaLanguageModel {
    client: OllamaClient,
    model: String,
}

impl OllamaLanguageModel {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaLanguageModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream_generate(&self, prompt: &str) -> Result<FragmentReceiver, RagError> {
        self.client.generate_stream(&self.model, prompt).await
    }

    async fn pull_model(&self) -> Result<(), RagError> {
        self.client.pull(&self.model).await
    }
}
