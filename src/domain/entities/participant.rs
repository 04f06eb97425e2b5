//! Channel participant entity.
//!
//! Maps to the `b_chat_channel_participants` table. One row per user per
//! channel; `last_read_at` is the user's read cursor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{ChannelId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    pub last_read_at: Option<DateTime<Utc>>,
}

impl Participant {
    /// Messages created strictly after this instant are unread.
    ///
    /// A participant that never marked the channel read has read up to the
    /// moment they joined.
    pub fn read_cursor(&self) -> DateTime<Utc> {
        self.last_read_at.unwrap_or(self.joined_at)
    }
}
