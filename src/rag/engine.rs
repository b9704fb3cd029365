//! Retrieval-augmented query engine.
//!
//! Embeds the question, pulls the nearest chunks from the index, renders
//! them into the prompt and hands back the model's answer as a stream
//! together with the chunks it was grounded on.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};

use super::prompt::{build_context, PromptTemplate};
use super::store::{IndexStore, SearchHit};
use crate::core::config::RagSettings;
use crate::core::errors::RagError;
use crate::llm::{Embedder, FragmentReceiver, LanguageModel};

enum StreamInner {
    /// Single pre-rendered fragment, yielded once.
    Fixed(Option<String>),
    Live(FragmentReceiver),
}

/// Forward-only sequence of answer fragments.
///
/// A live stream reads from the model as it generates; dropping it before
/// the end releases the underlying request. Reading it again requires a new
/// query.
pub struct AnswerStream {
    inner: StreamInner,
}

impl AnswerStream {
    pub fn fixed(text: impl Into<String>) -> Self {
        Self {
            inner: StreamInner::Fixed(Some(text.into())),
        }
    }

    pub fn live(receiver: FragmentReceiver) -> Self {
        Self {
            inner: StreamInner::Live(receiver),
        }
    }

    /// Drain the remaining fragments into one string.
    pub async fn collect_text(mut self) -> Result<String, RagError> {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

impl Stream for AnswerStream {
    type Item = Result<String, RagError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match &mut self.inner {
            StreamInner::Fixed(text) => Poll::Ready(text.take().map(Ok)),
            StreamInner::Live(receiver) => receiver.poll_recv(cx),
        }
    }
}

pub struct Answer {
    pub stream: AnswerStream,
    /// Full ids of the retrieved chunks, nearest first.
    pub chunk_ids: Vec<String>,
    /// Source components of `chunk_ids`, first occurrence order, no repeats.
    pub sources: Vec<String>,
    fallback: bool,
}

impl Answer {
    fn fallback(message: &str) -> Self {
        Self {
            stream: AnswerStream::fixed(message),
            chunk_ids: Vec::new(),
            sources: Vec::new(),
            fallback: true,
        }
    }

    /// True when the index held nothing to answer from.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

pub struct QueryEngine {
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    template: PromptTemplate,
    top_k: usize,
    separator: String,
    empty_index_message: String,
}

impl QueryEngine {
    pub fn new(
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        settings: &RagSettings,
    ) -> Result<Self, RagError> {
        Ok(Self {
            store,
            embedder,
            model,
            template: PromptTemplate::new(settings.prompt_template.clone())?,
            top_k: settings.top_k,
            separator: settings.context_separator.clone(),
            empty_index_message: settings.empty_index_message.clone(),
        })
    }

    pub async fn answer(&self, query: &str) -> Result<Answer, RagError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::MissingParameter("query".to_string()));
        }

        let count = self.store.count().await?;
        if count == 0 {
            tracing::info!("Index is empty, answering with the fallback message");
            return Ok(Answer::fallback(&self.empty_index_message));
        }

        let k = self.top_k.min(count);
        let query_embedding = self.embedder.embed(query).await?;
        let hits = self.store.search(&query_embedding, k).await?;
        if hits.is_empty() {
            // rows vanished between count and search
            return Ok(Answer::fallback(&self.empty_index_message));
        }

        let context = build_context(hits.iter().map(|hit| hit.chunk.content.as_str()), &self.separator);
        let prompt = self.template.render(&context, query);

        let chunk_ids: Vec<String> = hits.iter().map(|hit| hit.chunk.id.to_string()).collect();
        let sources = distinct_sources(&hits);
        tracing::debug!("Retrieved {} of {} chunks (k={}): {:?}", hits.len(), count, k, chunk_ids);

        let receiver = self.model.stream_generate(&prompt).await?;

        Ok(Answer {
            stream: AnswerStream::live(receiver),
            chunk_ids,
            sources,
            fallback: false,
        })
    }
}

fn distinct_sources(hits: &[SearchHit]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for hit in hits {
        if !sources.iter().any(|s| s == &hit.chunk.id.source) {
            sources.push(hit.chunk.id.source.clone());
        }
    }
    sources
}
