//! Real-time message subscription.
//!
//! Each subscriber gets its own bounded queue fed by a forwarding task. The
//! task decodes bus payloads, drops messages for other channels, and
//! re-reads the subscriber's block list for every authored message, so a
//! block takes effect on the next delivery.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::{BlockListProvider, ChannelId, MessageLike, PayloadStream, UserId};
use crate::infrastructure::metrics::SubscriptionGauge;

/// Live stream of new messages in one channel, as seen by one user.
///
/// Delivery is best effort. Dropping the subscription stops the forwarding
/// task and releases the bus subscription.
pub struct MessageSubscription<M> {
    rx: mpsc::Receiver<M>,
    task: JoinHandle<()>,
    _gauge: SubscriptionGauge,
}

impl<M: MessageLike> MessageSubscription<M> {
    pub(crate) fn spawn(
        payloads: PayloadStream,
        channel_id: ChannelId,
        user_id: UserId,
        block_list: Arc<dyn BlockListProvider>,
        buffer: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let task = tokio::spawn(forward(payloads, channel_id, user_id, block_list, tx));
        Self {
            rx,
            task,
            _gauge: SubscriptionGauge::acquire(),
        }
    }

    /// Next delivered message; `None` once the bus stream has ended.
    pub async fn next(&mut self) -> Option<M> {
        self.rx.recv().await
    }
}

impl<M> Stream for MessageSubscription<M> {
    type Item = M;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<M>> {
        self.rx.poll_recv(cx)
    }
}

impl<M> Drop for MessageSubscription<M> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn forward<M: MessageLike>(
    mut payloads: PayloadStream,
    channel_id: ChannelId,
    user_id: UserId,
    block_list: Arc<dyn BlockListProvider>,
    tx: mpsc::Sender<M>,
) {
    while let Some(payload) = payloads.next().await {
        let message: M = match serde_json::from_str(&payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(channel_id, error = %e, "Dropping undecodable payload");
                continue;
            }
        };
        if message.channel_id() != channel_id {
            continue;
        }

        if let Some(author_id) = message.author_id() {
            match block_list.blocked_author_ids(user_id).await {
                Ok(blocked) if blocked.contains(&author_id) => continue,
                Ok(_) => {}
                Err(e) => {
                    // fail closed
                    warn!(channel_id, user_id, error = %e, "Block list lookup failed, dropping message");
                    continue;
                }
            }
        }

        if tx.send(message).await.is_err() {
            break;
        }
    }
    debug!(channel_id, user_id, "Subscription closed");
}
