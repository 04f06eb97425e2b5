//! Push notification hand-off.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::UserId;
use crate::shared::error::ChatResult;

/// What triggered a notification; lets the push service pick a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// New chat message for the other participants
    ChatMessage,
    /// Someone applied to a matching target
    MatchProposal,
    /// The target owner picked this channel
    MatchSelected,
    /// The target owner picked another channel
    MatchEliminated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipients: Vec<UserId>,
    pub title: String,
    pub body: String,
    /// Channel or target id the client should open
    pub relation_id: Option<String>,
}

/// Delivery of notifications to an external push service.
///
/// Sends are fire-and-forget from the chat logic's point of view: failures
/// are logged and never fail the originating operation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> ChatResult<()>;
}
