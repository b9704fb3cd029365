//! Live delivery of answer fragments to named channels.
//!
//! Each channel is a `tokio::sync::broadcast` sender created on first use.
//! Fanning events out to actual listeners (server push, sockets) is up to
//! whoever subscribes.

use std::collections::HashMap;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::core::errors::RagError;
use crate::rag::AnswerStream;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    Message { text: String },
    Done,
    Error { message: String },
}

#[derive(Debug, Default)]
pub struct EventHub {
    channels: RwLock<HashMap<String, broadcast::Sender<ChannelEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, channel: &str) -> broadcast::Receiver<ChannelEvent> {
        if let Some(tx) = self.channels.read().await.get(channel) {
            return tx.subscribe();
        }
        let mut channels = self.channels.write().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send to every current subscriber. Returns how many received it;
    /// a channel nobody listens to is not an error.
    pub async fn publish(&self, channel: &str, event: ChannelEvent) -> usize {
        let channels = self.channels.read().await;
        match channels.get(channel) {
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Forward an answer to `channel` one fragment at a time and return the
    /// full text. Ends with `Done`, or `Error` if the stream fails.
    pub async fn relay(&self, channel: &str, mut stream: AnswerStream) -> Result<String, RagError> {
        let mut text = String::new();
        while let Some(fragment) = stream.next().await {
            match fragment {
                Ok(fragment) => {
                    self.publish(
                        channel,
                        ChannelEvent::Message {
                            text: fragment.clone(),
                        },
                    )
                    .await;
                    text.push_str(&fragment);
                }
                Err(e) => {
                    tracing::warn!("Answer stream failed on channel {}: {}", channel, e);
                    self.publish(
                        channel,
                        ChannelEvent::Error {
                            message: e.user_message(),
                        },
                    )
                    .await;
                    return Err(e);
                }
            }
        }
        self.publish(channel, ChannelEvent::Done).await;
        Ok(text)
    }
}
