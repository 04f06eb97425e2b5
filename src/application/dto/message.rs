//! Message inputs.

use serde::Deserialize;
use validator::Validate;

use crate::domain::{ChannelId, MessageFilter, MessageKind, MessageOrder, PageRequest};

/// Send message request
///
/// The upper content bound comes from `chat.max_message_length` and is
/// checked by the logic.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageInput {
    pub channel_id: ChannelId,

    #[serde(rename = "type", default)]
    pub kind: MessageKind,

    #[validate(length(min = 1, message = "Message content must not be empty"))]
    pub content: String,

    /// File metadata for FILE messages
    pub payload: Option<serde_json::Value>,
}

impl SendMessageInput {
    pub fn text(channel_id: ChannelId, content: impl Into<String>) -> Self {
        Self {
            channel_id,
            kind: MessageKind::Text,
            content: content.into(),
            payload: None,
        }
    }

    pub fn file(channel_id: ChannelId, content: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            channel_id,
            kind: MessageKind::File,
            content: content.into(),
            payload: Some(payload),
        }
    }
}

/// Message listing arguments for a channel
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessageListArgs {
    pub filter: MessageFilter,
    pub order: MessageOrder,
    pub page: PageRequest,
}

impl MessageListArgs {
    pub fn page(page: PageRequest) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }
}

/// Admin message listing arguments, across channels
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdminMessageListArgs {
    pub channel_id: Option<ChannelId>,
    pub filter: MessageFilter,
    pub include_deleted: bool,
    pub order: MessageOrder,
    pub page: PageRequest,
}
