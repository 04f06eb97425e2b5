//! Per-request channel field loader.
//!
//! Memoizes the per-channel lookups a list view repeats for every row:
//! participants, last message and unread count. Entries expire after a
//! short TTL and each map holds a bounded number of entries, evicting the
//! oldest. A loader belongs to one request and is dropped with it.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::trace;

use super::message_logic::MessageLogic;
use crate::config::ChatSettings;
use crate::domain::{ChannelId, ChannelStore, MessageStore, Participant, UserId};
use crate::shared::error::ChatResult;

struct Entry<V> {
    value: V,
    loaded_at: Instant,
}

/// TTL map with a capacity bound.
pub struct RequestCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
    capacity: usize,
}

impl<K, V> RequestCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let fresh = self
            .entries
            .get(key)
            .filter(|e| e.loaded_at.elapsed() < self.ttl)
            .map(|e| e.value.clone());
        if fresh.is_none() {
            self.entries.remove(key);
        }
        fresh
    }

    pub fn insert(&self, key: K, value: V) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.loaded_at)
                .map(|e| e.key().clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key,
            Entry {
                value,
                loaded_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// Memoized channel lookups for one request.
pub struct ChannelLoader<S: MessageStore> {
    store: Arc<S>,
    messages: MessageLogic<S>,
    participants: RequestCache<ChannelId, Vec<Participant>>,
    last_messages: RequestCache<ChannelId, Option<S::Message>>,
    unread: RequestCache<(ChannelId, UserId), i64>,
}

impl<S> ChannelLoader<S>
where
    S: ChannelStore + MessageStore,
{
    pub fn new(store: Arc<S>, messages: MessageLogic<S>, settings: &ChatSettings) -> Self {
        let ttl = Duration::from_secs(settings.loader_ttl_secs);
        Self::with_limits(store, messages, ttl, settings.loader_capacity)
    }

    pub fn with_limits(store: Arc<S>, messages: MessageLogic<S>, ttl: Duration, capacity: usize) -> Self {
        Self {
            store,
            messages,
            participants: RequestCache::new(ttl, capacity),
            last_messages: RequestCache::new(ttl, capacity),
            unread: RequestCache::new(ttl, capacity),
        }
    }

    pub async fn participants(&self, channel_id: ChannelId) -> ChatResult<Vec<Participant>> {
        if let Some(hit) = self.participants.get(&channel_id) {
            trace!(channel_id, "participants cache hit");
            return Ok(hit);
        }
        let participants = self.store.find_participants(channel_id).await?;
        self.participants.insert(channel_id, participants.clone());
        Ok(participants)
    }

    pub async fn last_message(&self, channel_id: ChannelId) -> ChatResult<Option<S::Message>> {
        if let Some(hit) = self.last_messages.get(&channel_id) {
            trace!(channel_id, "last message cache hit");
            return Ok(hit);
        }
        let message = self.store.find_last_message(channel_id).await?;
        self.last_messages.insert(channel_id, message.clone());
        Ok(message)
    }

    pub async fn unread_count(&self, channel_id: ChannelId, user_id: UserId) -> ChatResult<i64> {
        let key = (channel_id, user_id);
        if let Some(hit) = self.unread.get(&key) {
            trace!(channel_id, user_id, "unread count cache hit");
            return Ok(hit);
        }
        let count = self.messages.unread_count(channel_id, user_id).await?;
        self.unread.insert(key, count);
        Ok(count)
    }

    /// Drop everything cached, e.g. after the request wrote to a channel.
    pub fn clear(&self) {
        self.participants.clear();
        self.last_messages.clear();
        self.unread.clear();
    }
}
