//! In-process pub/sub bus on top of `tokio::sync::broadcast`.
//!
//! Single-node deployments and tests. Each topic gets its own broadcast
//! channel, created on first subscription and dropped once the last
//! subscriber is gone.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::{PayloadStream, PubSub};
use crate::shared::error::ChatResult;

pub struct LocalPubSub {
    topics: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
}

impl LocalPubSub {
    /// `capacity` is the per-topic backlog a slow subscriber may fall behind by.
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of live subscribers on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for LocalPubSub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl PubSub for LocalPubSub {
    async fn publish(&self, topic: &str, payload: String) -> ChatResult<()> {
        let delivered = match self.topics.get(topic) {
            Some(tx) => tx.send(payload).unwrap_or(0),
            None => 0,
        };

        if delivered == 0 {
            self.topics.remove_if(topic, |_, tx| tx.receiver_count() == 0);
        }
        debug!(topic = %topic, receivers = delivered, "Published payload");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> ChatResult<PayloadStream> {
        let rx = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        let topic = topic.to_string();
        let stream = futures::stream::unfold(rx, move |mut rx| {
            let topic = topic.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(payload) => return Some((payload, rx)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(topic = %topic, skipped, "Subscriber lagged, payloads dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}
