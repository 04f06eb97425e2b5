//! Message entity and store trait.
//!
//! Maps to the `b_chat_messages` table. Messages are immutable apart from the
//! soft-delete marker and are ordered by `(created_at, id)` within a channel.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::services::UnitOfWork;
use crate::domain::value_objects::{ChannelId, Keyset, MessageId, UserId};
use crate::shared::error::ChatResult;

/// Message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    #[default]
    Text,
    /// Carries file metadata in `payload`
    File,
    /// Authored by the system, `author_id` is None
    System,
}

impl MessageKind {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "file" => Self::File,
            "system" => Self::System,
            _ => Self::Text,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::File => "file",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read access the chat logic needs from a message record.
///
/// Messages travel over the pub/sub bus as JSON, hence the serde bounds.
pub trait MessageLike: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    fn id(&self) -> MessageId;
    fn channel_id(&self) -> ChannelId;
    fn author_id(&self) -> Option<UserId>;
    fn kind(&self) -> MessageKind;
    fn content(&self) -> &str;
    fn payload(&self) -> Option<&serde_json::Value>;
    fn created_at(&self) -> DateTime<Utc>;
    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}

/// Chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Snowflake ID (primary key)
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author_id: Option<UserId>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl MessageLike for Message {
    fn id(&self) -> MessageId {
        self.id
    }

    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    fn author_id(&self) -> Option<UserId> {
        self.author_id
    }

    fn kind(&self) -> MessageKind {
        self.kind
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn payload(&self) -> Option<&serde_json::Value> {
        self.payload.as_ref()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

/// Insert payload for a message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author_id: Option<UserId>,
    pub kind: MessageKind,
    pub content: String,
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// List order of messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageOrder {
    /// Oldest first
    #[default]
    Chronological,
    /// Newest first
    ReverseChronological,
}

impl MessageOrder {
    pub fn is_descending(&self) -> bool {
        *self == Self::ReverseChronological
    }
}

/// Caller-facing message filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFilter {
    pub kinds: Option<Vec<MessageKind>>,
    pub author_id: Option<UserId>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

/// Store-level listing query.
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    /// None lists across all channels (admin listing)
    pub channel_id: Option<ChannelId>,
    pub filter: MessageFilter,
    /// Authors filtered out before the page is sliced
    pub excluded_authors: Vec<UserId>,
    pub include_deleted: bool,
    pub order: MessageOrder,
}

impl MessageQuery {
    pub fn matches<M: MessageLike>(&self, message: &M) -> bool {
        let filter = &self.filter;
        self.channel_id.map_or(true, |c| message.channel_id() == c)
            && (self.include_deleted || !message.is_deleted())
            && message
                .author_id()
                .map_or(true, |a| !self.excluded_authors.contains(&a))
            && filter
                .kinds
                .as_ref()
                .map_or(true, |kinds| kinds.contains(&message.kind()))
            && filter.author_id.map_or(true, |a| message.author_id() == Some(a))
            && filter.created_after.map_or(true, |t| message.created_at() > t)
            && filter.created_before.map_or(true, |t| message.created_at() < t)
    }
}

/// Sort key of a message list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageSortKey {
    #[serde(rename = "c")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "i")]
    pub id: MessageId,
}

impl MessageSortKey {
    pub fn of<M: MessageLike>(message: &M) -> Self {
        Self {
            created_at: message.created_at(),
            id: message.id(),
        }
    }
}

/// Persistence contract for messages.
#[async_trait]
pub trait MessageStore: UnitOfWork {
    type Message: MessageLike;

    /// Find a message, including soft-deleted ones.
    async fn find_message(&self, id: MessageId) -> ChatResult<Option<Self::Message>>;

    async fn find_messages_by_ids(&self, ids: &[MessageId]) -> ChatResult<Vec<Self::Message>>;

    /// One page of messages in scan order (see [`Keyset::scans_ascending`]).
    async fn find_message_page(
        &self,
        query: &MessageQuery,
        keyset: &Keyset<MessageSortKey>,
    ) -> ChatResult<Vec<Self::Message>>;

    async fn count_messages(&self, query: &MessageQuery) -> ChatResult<i64>;

    /// Non-deleted messages created strictly after `since`, ignoring `excluded_authors`.
    async fn count_unread(
        &self,
        channel_id: ChannelId,
        since: DateTime<Utc>,
        excluded_authors: &[UserId],
    ) -> ChatResult<i64>;

    async fn find_last_message(&self, channel_id: ChannelId) -> ChatResult<Option<Self::Message>>;

    async fn insert_message(&self, tx: &mut Self::Tx, message: NewMessage) -> ChatResult<Self::Message>;

    /// Soft-delete the given messages, returning those that were not deleted before.
    async fn soft_delete_messages(
        &self,
        tx: &mut Self::Tx,
        ids: &[MessageId],
        at: DateTime<Utc>,
    ) -> ChatResult<Vec<Self::Message>>;
}
