//! Redis pub/sub bus.
//!
//! Publishing goes through the shared `ConnectionManager`; every subscriber
//! opens its own pub/sub connection, closed when its stream is dropped.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, instrument, warn};

use crate::domain::{PayloadStream, PubSub};
use crate::shared::error::ChatResult;

#[derive(Clone)]
pub struct RedisPubSub {
    client: Client,
    publisher: ConnectionManager,
}

impl RedisPubSub {
    pub fn new(client: Client, publisher: ConnectionManager) -> Self {
        Self { client, publisher }
    }
}

#[async_trait]
impl PubSub for RedisPubSub {
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn publish(&self, topic: &str, payload: String) -> ChatResult<()> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn.publish(topic, payload).await?;
        debug!(receivers, "Published payload");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn subscribe(&self, topic: &str) -> ChatResult<PayloadStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(topic).await?;
        debug!("Subscribed");

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(channel = %msg.get_channel_name(), error = %e, "Dropping non-text payload");
                    None
                }
            }
        });

        Ok(stream.boxed())
    }
}
