//! Channel entity and store trait.
//!
//! Maps to the `b_chat_channels` table. Channels are never deleted; they move
//! between ACTIVE and INACTIVE.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::participant::Participant;
use crate::domain::services::UnitOfWork;
use crate::domain::value_objects::{ChannelId, Keyset, UserId};
use crate::shared::error::ChatResult;

/// Channel lifecycle state.
///
/// Database definition: `state TEXT NOT NULL CHECK (state IN ('active', 'inactive'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelState {
    #[default]
    Active,
    Inactive,
}

impl ChannelState {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "inactive" => Self::Inactive,
            _ => Self::Active,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The two parties of a direct channel, stored in ascending id order.
///
/// Recorded when the channel is created, so the pair survives either party
/// leaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectPair {
    pub low: UserId,
    pub high: UserId,
}

impl DirectPair {
    pub fn new(a: UserId, b: UserId) -> Self {
        Self {
            low: a.min(b),
            high: a.max(b),
        }
    }

    pub fn members(&self) -> [UserId; 2] {
        [self.low, self.high]
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.low == user_id || self.high == user_id
    }
}

/// Read access the chat logic needs from a channel record.
///
/// Products embedding the chat core may persist richer channel rows; the
/// logic only relies on these accessors.
pub trait ChannelLike: Clone + Debug + Send + Sync + Serialize + 'static {
    fn id(&self) -> ChannelId;
    fn state(&self) -> ChannelState;
    fn is_visible(&self) -> bool;
    /// External resource this channel competes for, e.g. a matching post.
    fn target_id(&self) -> Option<&str>;
    fn creator_id(&self) -> Option<UserId>;
    /// Parties of a two-party DM; `None` for group and admin channels.
    fn direct_pair(&self) -> Option<DirectPair>;
    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;

    fn is_active(&self) -> bool {
        self.state() == ChannelState::Active
    }
}

/// Chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Snowflake ID (primary key)
    pub id: ChannelId,
    pub state: ChannelState,
    pub is_visible: bool,
    pub target_id: Option<String>,
    /// None for channels created by the system
    pub creator_id: Option<UserId>,
    pub direct_pair: Option<DirectPair>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChannelLike for Channel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    fn is_visible(&self) -> bool {
        self.is_visible
    }

    fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }

    fn creator_id(&self) -> Option<UserId> {
        self.creator_id
    }

    fn direct_pair(&self) -> Option<DirectPair> {
        self.direct_pair
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Insert payload for a new ACTIVE channel.
#[derive(Debug, Clone)]
pub struct NewChannel {
    pub id: ChannelId,
    pub creator_id: Option<UserId>,
    pub target_id: Option<String>,
    pub direct_pair: Option<DirectPair>,
    pub is_visible: bool,
    pub created_at: DateTime<Utc>,
}

/// Partial channel update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ChannelPatch {
    pub state: Option<ChannelState>,
    pub target_id: Option<String>,
    pub is_visible: Option<bool>,
}

impl ChannelPatch {
    pub fn state(state: ChannelState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }
}

/// Caller-facing channel filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelFilter {
    pub state: Option<ChannelState>,
    pub target_id: Option<String>,
    pub is_visible: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl ChannelFilter {
    pub fn matches<C: ChannelLike>(&self, channel: &C) -> bool {
        self.state.map_or(true, |s| channel.state() == s)
            && self
                .target_id
                .as_deref()
                .map_or(true, |t| channel.target_id() == Some(t))
            && self.is_visible.map_or(true, |v| channel.is_visible() == v)
            && self.created_after.map_or(true, |t| channel.created_at() > t)
            && self.created_before.map_or(true, |t| channel.created_at() < t)
    }
}

/// Store-level listing query.
#[derive(Debug, Clone, Default)]
pub struct ChannelQuery {
    /// Restrict to channels this user participates in, ordering by their pins.
    pub member_id: Option<UserId>,
    pub filter: ChannelFilter,
}

/// Sort key of a channel list: pinned first by pin time, then newest first.
///
/// Lists are ordered by this key descending. `None` sorts below every pin.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelSortKey {
    #[serde(rename = "p")]
    pub pinned_at: Option<DateTime<Utc>>,
    #[serde(rename = "c")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "i")]
    pub id: ChannelId,
}

/// A channel as seen in a user's list, with that user's pin.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedChannel<C> {
    pub channel: C,
    pub pinned_at: Option<DateTime<Utc>>,
}

impl<C: ChannelLike> ListedChannel<C> {
    pub fn sort_key(&self) -> ChannelSortKey {
        ChannelSortKey {
            pinned_at: self.pinned_at,
            created_at: self.channel.created_at(),
            id: self.channel.id(),
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned_at.is_some()
    }
}

/// A channel together with its participant rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelWithParticipants<C> {
    pub channel: C,
    pub participants: Vec<Participant>,
}

impl<C> ChannelWithParticipants<C> {
    pub fn participant_ids(&self) -> Vec<UserId> {
        self.participants.iter().map(|p| p.user_id).collect()
    }
}

/// Persistence contract for channels, participants, pins and read cursors.
///
/// Methods taking `tx` run inside the caller's unit of work; the others read
/// or write committed state directly.
#[async_trait]
pub trait ChannelStore: UnitOfWork {
    type Channel: ChannelLike;

    async fn find_channel(&self, id: ChannelId) -> ChatResult<Option<Self::Channel>>;

    async fn find_participant(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
    ) -> ChatResult<Option<Participant>>;

    /// Participants ordered by join time.
    async fn find_participants(&self, channel_id: ChannelId) -> ChatResult<Vec<Participant>>;

    /// One page of channels in scan order (see [`Keyset::scans_ascending`]),
    /// the list itself being ordered by [`ChannelSortKey`] descending.
    async fn find_channel_page(
        &self,
        query: &ChannelQuery,
        keyset: &Keyset<ChannelSortKey>,
    ) -> ChatResult<Vec<ListedChannel<Self::Channel>>>;

    async fn count_channels(&self, query: &ChannelQuery) -> ChatResult<i64>;

    /// Channels pinned by `user_id` that they still participate in, latest pin first.
    async fn find_pinned_channels(&self, user_id: UserId) -> ChatResult<Vec<ListedChannel<Self::Channel>>>;

    /// Set or clear (`None`) a user's pin on a channel. Returns the stored pin
    /// time, which is the original one when the channel was already pinned.
    async fn set_pin(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
        pinned_at: Option<DateTime<Utc>>,
    ) -> ChatResult<Option<DateTime<Utc>>>;

    /// Load a channel and hold a write lock on it until the transaction ends.
    async fn lock_channel(&self, tx: &mut Self::Tx, id: ChannelId) -> ChatResult<Option<Self::Channel>>;

    async fn find_participants_in(&self, tx: &mut Self::Tx, channel_id: ChannelId) -> ChatResult<Vec<Participant>>;

    /// Move a participant's read cursor. Returns false if there is no such participant.
    async fn mark_read(
        &self,
        tx: &mut Self::Tx,
        channel_id: ChannelId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> ChatResult<bool>;

    /// Serialize DM requests for one target between one pair of users,
    /// whichever of the two asks.
    async fn lock_target_pair(&self, tx: &mut Self::Tx, target_id: &str, pair: DirectPair) -> ChatResult<()>;

    /// Direct channels of `pair` bound to `target_id`, oldest first, whether
    /// or not both parties still participate.
    async fn find_target_channels_for_pair(
        &self,
        tx: &mut Self::Tx,
        target_id: &str,
        pair: DirectPair,
    ) -> ChatResult<Vec<Self::Channel>>;

    async fn insert_channel(&self, tx: &mut Self::Tx, channel: NewChannel) -> ChatResult<Self::Channel>;

    async fn update_channel(
        &self,
        tx: &mut Self::Tx,
        id: ChannelId,
        patch: ChannelPatch,
        at: DateTime<Utc>,
    ) -> ChatResult<Option<Self::Channel>>;

    /// Set every ACTIVE channel bound to `target_id` except `keep` INACTIVE,
    /// returning the channels it changed.
    async fn deactivate_target_channels(
        &self,
        tx: &mut Self::Tx,
        target_id: &str,
        keep: ChannelId,
        at: DateTime<Utc>,
    ) -> ChatResult<Vec<Self::Channel>>;

    /// Add participants, ignoring users that already participate.
    /// Returns only the rows actually inserted.
    async fn add_participants(
        &self,
        tx: &mut Self::Tx,
        channel_id: ChannelId,
        user_ids: &[UserId],
        joined_at: DateTime<Utc>,
    ) -> ChatResult<Vec<Participant>>;

    /// Returns false if the user was not a participant.
    async fn remove_participant(&self, tx: &mut Self::Tx, channel_id: ChannelId, user_id: UserId) -> ChatResult<bool>;
}
