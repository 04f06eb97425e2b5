//! Notifier implementations.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, instrument};

use crate::domain::{Notification, Notifier};
use crate::shared::error::ChatResult;

/// Hands notifications to the push service through a Redis channel.
#[derive(Clone)]
pub struct RedisNotifier {
    conn: ConnectionManager,
    topic: String,
}

impl RedisNotifier {
    pub fn new(conn: ConnectionManager, topic: impl Into<String>) -> Self {
        Self {
            conn,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    #[instrument(skip(self, notification), fields(kind = ?notification.kind, recipients = notification.recipients.len()))]
    async fn send(&self, notification: Notification) -> ChatResult<()> {
        if notification.recipients.is_empty() {
            return Ok(());
        }
        let payload = serde_json::to_string(&notification)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.publish(&self.topic, payload).await?;
        Ok(())
    }
}

/// Writes notifications to the log only. For local development.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> ChatResult<()> {
        info!(
            kind = ?notification.kind,
            recipients = ?notification.recipients,
            title = %notification.title,
            "Notification"
        );
        Ok(())
    }
}
