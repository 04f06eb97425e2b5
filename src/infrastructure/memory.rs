//! In-memory chat store and block list.
//!
//! Backs the integration tests and single-process embeddings. A transaction
//! holds the store lock for its whole lifetime and works on a staged copy of
//! the state, written back on commit. Transactions are therefore serialized,
//! and dropping one discards its writes.
//!
//! Code holding a [`MemoryTx`] must only use the transactional store methods;
//! the plain read methods wait for the lock and would never return.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::{
    BlockListProvider, Channel, ChannelId, ChannelPatch, ChannelQuery, ChannelSortKey, ChannelState,
    ChannelStore, ChatReport, DirectPair, Keyset, ListedChannel, Message, MessageId, MessageQuery,
    MessageSortKey, MessageStore, NewChannel, NewMessage, NewReport, Participant, ReportId,
    ReportPatch, ReportQuery, ReportSortKey, ReportState, ReportStore, UnitOfWork, UserId,
};
use crate::shared::error::{ChatError, ChatResult};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    channels: BTreeMap<ChannelId, Channel>,
    participants: BTreeMap<(ChannelId, UserId), Participant>,
    pins: BTreeMap<(ChannelId, UserId), DateTime<Utc>>,
    messages: BTreeMap<MessageId, Message>,
    reports: BTreeMap<ReportId, ChatReport>,
}

impl MemoryState {
    fn participants_of(&self, channel_id: ChannelId) -> Vec<Participant> {
        let mut rows: Vec<Participant> = self
            .participants
            .range((channel_id, UserId::MIN)..=(channel_id, UserId::MAX))
            .map(|(_, p)| p.clone())
            .collect();
        rows.sort_by_key(|p| (p.joined_at, p.user_id));
        rows
    }

    fn listed(&self, channel: &Channel, member_id: Option<UserId>) -> Option<ListedChannel<Channel>> {
        match member_id {
            Some(member) => {
                if !self.participants.contains_key(&(channel.id, member)) {
                    return None;
                }
                Some(ListedChannel {
                    channel: channel.clone(),
                    pinned_at: self.pins.get(&(channel.id, member)).copied(),
                })
            }
            None => Some(ListedChannel {
                channel: channel.clone(),
                pinned_at: None,
            }),
        }
    }

    fn channel_listing(&self, query: &ChannelQuery) -> Vec<ListedChannel<Channel>> {
        self.channels
            .values()
            .filter(|c| query.filter.matches(*c))
            .filter_map(|c| self.listed(c, query.member_id))
            .collect()
    }
}

/// Rows strictly beyond the cursor, in scan order, at most `fetch_limit`.
fn scan<T, K, F>(mut rows: Vec<T>, keyset: &Keyset<K>, list_descending: bool, key: F) -> Vec<T>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    rows.sort_by(|a, b| key(a).cmp(&key(b)));
    let ascending = keyset.scans_ascending(list_descending);
    if !ascending {
        rows.reverse();
    }

    rows.into_iter()
        .filter(|row| match &keyset.cursor {
            None => true,
            Some(cursor) if ascending => key(row) > *cursor,
            Some(cursor) => key(row) < *cursor,
        })
        .take(keyset.fetch_limit() as usize)
        .collect()
}

/// Open transaction on a [`MemoryChatStore`].
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

/// In-memory implementation of `ChannelStore`, `MessageStore` and `ReportStore`.
#[derive(Clone, Default)]
pub struct MemoryChatStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted messages, deleted ones included.
    pub async fn message_count(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    /// Number of persisted channels.
    pub async fn channel_count(&self) -> usize {
        self.state.lock().await.channels.len()
    }
}

#[async_trait]
impl UnitOfWork for MemoryChatStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> ChatResult<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryTx { guard, staged })
    }

    async fn commit(&self, tx: MemoryTx) -> ChatResult<()> {
        let MemoryTx { mut guard, staged } = tx;
        *guard = staged;
        Ok(())
    }
}

#[async_trait]
impl ChannelStore for MemoryChatStore {
    type Channel = Channel;

    async fn find_channel(&self, id: ChannelId) -> ChatResult<Option<Channel>> {
        Ok(self.state.lock().await.channels.get(&id).cloned())
    }

    async fn find_participant(&self, channel_id: ChannelId, user_id: UserId) -> ChatResult<Option<Participant>> {
        Ok(self
            .state
            .lock()
            .await
            .participants
            .get(&(channel_id, user_id))
            .cloned())
    }

    async fn find_participants(&self, channel_id: ChannelId) -> ChatResult<Vec<Participant>> {
        Ok(self.state.lock().await.participants_of(channel_id))
    }

    async fn find_channel_page(
        &self,
        query: &ChannelQuery,
        keyset: &Keyset<ChannelSortKey>,
    ) -> ChatResult<Vec<ListedChannel<Channel>>> {
        let rows = self.state.lock().await.channel_listing(query);
        Ok(scan(rows, keyset, true, |row| row.sort_key()))
    }

    async fn count_channels(&self, query: &ChannelQuery) -> ChatResult<i64> {
        Ok(self.state.lock().await.channel_listing(query).len() as i64)
    }

    async fn find_pinned_channels(&self, user_id: UserId) -> ChatResult<Vec<ListedChannel<Channel>>> {
        let state = self.state.lock().await;
        let mut rows: Vec<ListedChannel<Channel>> = state
            .pins
            .iter()
            .filter(|((channel_id, pinned_by), _)| {
                *pinned_by == user_id && state.participants.contains_key(&(*channel_id, user_id))
            })
            .filter_map(|((channel_id, _), pinned_at)| {
                state.channels.get(channel_id).map(|c| ListedChannel {
                    channel: c.clone(),
                    pinned_at: Some(*pinned_at),
                })
            })
            .collect();
        rows.sort_by(|a, b| (b.pinned_at, b.channel.id).cmp(&(a.pinned_at, a.channel.id)));
        Ok(rows)
    }

    async fn set_pin(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
        pinned_at: Option<DateTime<Utc>>,
    ) -> ChatResult<Option<DateTime<Utc>>> {
        let mut state = self.state.lock().await;
        match pinned_at {
            Some(at) => Ok(Some(*state.pins.entry((channel_id, user_id)).or_insert(at))),
            None => {
                state.pins.remove(&(channel_id, user_id));
                Ok(None)
            }
        }
    }

    async fn lock_channel(&self, tx: &mut MemoryTx, id: ChannelId) -> ChatResult<Option<Channel>> {
        Ok(tx.staged.channels.get(&id).cloned())
    }

    async fn find_participants_in(&self, tx: &mut MemoryTx, channel_id: ChannelId) -> ChatResult<Vec<Participant>> {
        Ok(tx.staged.participants_of(channel_id))
    }

    async fn mark_read(
        &self,
        tx: &mut MemoryTx,
        channel_id: ChannelId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> ChatResult<bool> {
        match tx.staged.participants.get_mut(&(channel_id, user_id)) {
            Some(participant) => {
                participant.last_read_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn lock_target_pair(&self, _tx: &mut MemoryTx, _target_id: &str, _pair: DirectPair) -> ChatResult<()> {
        // the transaction already holds the whole store
        Ok(())
    }

    async fn find_target_channels_for_pair(
        &self,
        tx: &mut MemoryTx,
        target_id: &str,
        pair: DirectPair,
    ) -> ChatResult<Vec<Channel>> {
        let mut rows: Vec<Channel> = tx
            .staged
            .channels
            .values()
            .filter(|c| c.target_id.as_deref() == Some(target_id) && c.direct_pair == Some(pair))
            .cloned()
            .collect();
        rows.sort_by_key(|c| (c.created_at, c.id));
        Ok(rows)
    }

    async fn insert_channel(&self, tx: &mut MemoryTx, channel: NewChannel) -> ChatResult<Channel> {
        let row = Channel {
            id: channel.id,
            state: ChannelState::Active,
            is_visible: channel.is_visible,
            target_id: channel.target_id,
            creator_id: channel.creator_id,
            direct_pair: channel.direct_pair,
            created_at: channel.created_at,
            updated_at: channel.created_at,
        };
        tx.staged.channels.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_channel(
        &self,
        tx: &mut MemoryTx,
        id: ChannelId,
        patch: ChannelPatch,
        at: DateTime<Utc>,
    ) -> ChatResult<Option<Channel>> {
        let Some(current) = tx.staged.channels.get(&id) else {
            return Ok(None);
        };
        if patch.state == Some(ChannelState::Active) {
            let target = patch.target_id.as_deref().or(current.target_id.as_deref());
            let pair = current.direct_pair;
            let taken = target.is_some()
                && pair.is_some()
                && tx.staged.channels.values().any(|c| {
                    c.id != id
                        && c.state == ChannelState::Active
                        && c.target_id.as_deref() == target
                        && c.direct_pair == pair
                });
            if taken {
                return Err(ChatError::bad_input("An active channel already exists for this target"));
            }
        }

        let Some(channel) = tx.staged.channels.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(state) = patch.state {
            channel.state = state;
        }
        if let Some(target_id) = patch.target_id {
            channel.target_id = Some(target_id);
        }
        if let Some(is_visible) = patch.is_visible {
            channel.is_visible = is_visible;
        }
        channel.updated_at = at;
        Ok(Some(channel.clone()))
    }

    async fn deactivate_target_channels(
        &self,
        tx: &mut MemoryTx,
        target_id: &str,
        keep: ChannelId,
        at: DateTime<Utc>,
    ) -> ChatResult<Vec<Channel>> {
        let mut rows: Vec<Channel> = tx
            .staged
            .channels
            .values_mut()
            .filter(|c| {
                c.target_id.as_deref() == Some(target_id)
                    && c.id != keep
                    && c.state == ChannelState::Active
            })
            .map(|c| {
                c.state = ChannelState::Inactive;
                c.updated_at = at;
                c.clone()
            })
            .collect();
        rows.sort_by_key(|c| (c.created_at, c.id));
        Ok(rows)
    }

    async fn add_participants(
        &self,
        tx: &mut MemoryTx,
        channel_id: ChannelId,
        user_ids: &[UserId],
        joined_at: DateTime<Utc>,
    ) -> ChatResult<Vec<Participant>> {
        let mut inserted = Vec::new();
        for &user_id in user_ids {
            let key = (channel_id, user_id);
            if tx.staged.participants.contains_key(&key) {
                continue;
            }
            let participant = Participant {
                channel_id,
                user_id,
                joined_at,
                last_read_at: None,
            };
            tx.staged.participants.insert(key, participant.clone());
            inserted.push(participant);
        }
        Ok(inserted)
    }

    async fn remove_participant(&self, tx: &mut MemoryTx, channel_id: ChannelId, user_id: UserId) -> ChatResult<bool> {
        Ok(tx.staged.participants.remove(&(channel_id, user_id)).is_some())
    }
}

#[async_trait]
impl MessageStore for MemoryChatStore {
    type Message = Message;

    async fn find_message(&self, id: MessageId) -> ChatResult<Option<Message>> {
        Ok(self.state.lock().await.messages.get(&id).cloned())
    }

    async fn find_messages_by_ids(&self, ids: &[MessageId]) -> ChatResult<Vec<Message>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Message> = ids
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter_map(|id| state.messages.get(id).cloned())
            .collect();
        rows.sort_by_key(|m| (m.created_at, m.id));
        Ok(rows)
    }

    async fn find_message_page(
        &self,
        query: &MessageQuery,
        keyset: &Keyset<MessageSortKey>,
    ) -> ChatResult<Vec<Message>> {
        let rows: Vec<Message> = self
            .state
            .lock()
            .await
            .messages
            .values()
            .filter(|m| query.matches(*m))
            .cloned()
            .collect();
        Ok(scan(rows, keyset, query.order.is_descending(), MessageSortKey::of))
    }

    async fn count_messages(&self, query: &MessageQuery) -> ChatResult<i64> {
        let state = self.state.lock().await;
        Ok(state.messages.values().filter(|m| query.matches(*m)).count() as i64)
    }

    async fn count_unread(
        &self,
        channel_id: ChannelId,
        since: DateTime<Utc>,
        excluded_authors: &[UserId],
    ) -> ChatResult<i64> {
        let state = self.state.lock().await;
        let count = state
            .messages
            .values()
            .filter(|m| m.channel_id == channel_id && m.deleted_at.is_none() && m.created_at > since)
            .filter(|m| m.author_id.map_or(true, |a| !excluded_authors.contains(&a)))
            .count();
        Ok(count as i64)
    }

    async fn find_last_message(&self, channel_id: ChannelId) -> ChatResult<Option<Message>> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .values()
            .filter(|m| m.channel_id == channel_id && m.deleted_at.is_none())
            .max_by_key(|m| (m.created_at, m.id))
            .cloned())
    }

    async fn insert_message(&self, tx: &mut MemoryTx, message: NewMessage) -> ChatResult<Message> {
        let row = Message {
            id: message.id,
            channel_id: message.channel_id,
            author_id: message.author_id,
            kind: message.kind,
            content: message.content,
            payload: message.payload,
            created_at: message.created_at,
            deleted_at: None,
        };
        tx.staged.messages.insert(row.id, row.clone());
        Ok(row)
    }

    async fn soft_delete_messages(
        &self,
        tx: &mut MemoryTx,
        ids: &[MessageId],
        at: DateTime<Utc>,
    ) -> ChatResult<Vec<Message>> {
        let mut deleted = Vec::new();
        for id in ids {
            if let Some(message) = tx.staged.messages.get_mut(id) {
                if message.deleted_at.is_none() {
                    message.deleted_at = Some(at);
                    deleted.push(message.clone());
                }
            }
        }
        Ok(deleted)
    }
}

#[async_trait]
impl ReportStore for MemoryChatStore {
    async fn find_report(&self, id: ReportId) -> ChatResult<Option<ChatReport>> {
        Ok(self.state.lock().await.reports.get(&id).cloned())
    }

    async fn find_report_page(
        &self,
        query: &ReportQuery,
        keyset: &Keyset<ReportSortKey>,
    ) -> ChatResult<Vec<ChatReport>> {
        let rows: Vec<ChatReport> = self
            .state
            .lock()
            .await
            .reports
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        Ok(scan(rows, keyset, true, ReportSortKey::of))
    }

    async fn count_reports(&self, query: &ReportQuery) -> ChatResult<i64> {
        let state = self.state.lock().await;
        Ok(state.reports.values().filter(|r| query.matches(r)).count() as i64)
    }

    async fn insert_report(&self, report: NewReport) -> ChatResult<ChatReport> {
        let row = ChatReport {
            id: report.id,
            author_id: report.author_id,
            target_kind: report.target_kind,
            target_id: report.target_id,
            category: report.category,
            content: report.content,
            etc: report.etc,
            admin_memo: None,
            state: ReportState::Pending,
            created_at: report.created_at,
            updated_at: report.created_at,
        };
        self.state.lock().await.reports.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_report(
        &self,
        id: ReportId,
        patch: ReportPatch,
        at: DateTime<Utc>,
    ) -> ChatResult<Option<ChatReport>> {
        let mut state = self.state.lock().await;
        Ok(state.reports.get_mut(&id).map(|report| {
            patch.apply(report, at);
            report.clone()
        }))
    }

    async fn delete_report(&self, id: ReportId, state: ReportState) -> ChatResult<Option<ChatReport>> {
        let mut guard = self.state.lock().await;
        if guard.reports.get(&id).map(|r| r.state) != Some(state) {
            return Ok(None);
        }
        Ok(guard.reports.remove(&id))
    }
}

/// In-memory block list.
#[derive(Default)]
pub struct MemoryBlockList {
    blocks: parking_lot::RwLock<HashMap<UserId, HashSet<UserId>>>,
    lookups: AtomicUsize,
}

impl MemoryBlockList {
    pub fn new() -> Self {
        Self::default()
    }

    /// `source` stops seeing messages from `blocked`.
    pub fn block(&self, source: UserId, blocked: UserId) {
        self.blocks.write().entry(source).or_default().insert(blocked);
    }

    pub fn unblock(&self, source: UserId, blocked: UserId) {
        if let Some(set) = self.blocks.write().get_mut(&source) {
            set.remove(&blocked);
        }
    }

    /// How many times the block list was queried.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BlockListProvider for MemoryBlockList {
    async fn blocked_author_ids(&self, user_id: UserId) -> ChatResult<HashSet<UserId>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self.blocks.read().get(&user_id).cloned().unwrap_or_default())
    }
}
