//! Topic-based publish/subscribe bus.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::shared::error::ChatResult;

/// Stream of raw payloads published on a topic after the subscription started.
pub type PayloadStream = BoxStream<'static, String>;

/// Broadcast bus used for real-time message delivery.
///
/// Delivery is best effort: payloads published while nobody listens are
/// lost, and a slow subscriber may miss payloads. Dropping the returned
/// stream releases the subscription.
#[async_trait]
pub trait PubSub: Send + Sync {
    async fn publish(&self, topic: &str, payload: String) -> ChatResult<()>;

    /// Subscribe to a topic. The subscription is live once this returns.
    async fn subscribe(&self, topic: &str) -> ChatResult<PayloadStream>;
}
