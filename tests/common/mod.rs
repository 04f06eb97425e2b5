//! Common Test Utilities
//!
//! An in-memory chat core with a local bus, an in-memory block list and a
//! notifier that records what it was asked to send.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fake::faker::lorem::en::Sentence;
use fake::Fake;
use parking_lot::Mutex;

use business_chat::application::dto::{CreateChannelInput, SendMessageInput};
use business_chat::config::{ChatSettings, PubSubBackend};
use business_chat::domain::{
    Actor, Channel, ChannelId, Message, Notification, Notifier, UserId,
};
use business_chat::infrastructure::memory::{MemoryBlockList, MemoryChatStore};
use business_chat::infrastructure::pubsub::LocalPubSub;
use business_chat::shared::error::{ChatError, ChatResult, ErrorKind};
use business_chat::shared::snowflake::SnowflakeGenerator;
use business_chat::startup::ChatCore;

pub const ADMIN_ID: UserId = 9_000;

/// Notifier that keeps every notification in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    /// Wait until at least `count` notifications arrived; they are sent from
    /// background tasks.
    pub async fn wait_for(&self, count: usize) -> Vec<Notification> {
        for _ in 0..100 {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> ChatResult<()> {
        self.sent.lock().push(notification);
        Ok(())
    }
}

/// Chat core over in-memory collaborators.
pub struct TestChat {
    pub core: ChatCore<MemoryChatStore>,
    pub store: Arc<MemoryChatStore>,
    pub bus: Arc<LocalPubSub>,
    pub blocks: Arc<MemoryBlockList>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestChat {
    pub fn new() -> Self {
        Self::with_settings(ChatSettings {
            pubsub_backend: PubSubBackend::Local,
            ..ChatSettings::default()
        })
    }

    pub fn with_settings(settings: ChatSettings) -> Self {
        let store = Arc::new(MemoryChatStore::new());
        let bus = Arc::new(LocalPubSub::new(settings.local_bus_capacity));
        let blocks = Arc::new(MemoryBlockList::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let ids = Arc::new(SnowflakeGenerator::default());

        let core = ChatCore::new(
            store.clone(),
            blocks.clone(),
            bus.clone(),
            notifier.clone(),
            ids,
            settings,
        );

        Self {
            core,
            store,
            bus,
            blocks,
            notifier,
        }
    }

    pub fn admin() -> Actor {
        Actor::admin(ADMIN_ID)
    }

    /// Untargeted two-party channel.
    pub async fn dm(&self, a: UserId, b: UserId) -> Channel {
        self.core
            .channels
            .create_dm_channel(b, Actor::user(a), None, None)
            .await
            .unwrap()
            .channel
    }

    /// DM bound to a target, requested by `applicant`.
    pub async fn target_dm(&self, applicant: UserId, owner: UserId, target: &str) -> ChatResult<Channel> {
        self.core
            .channels
            .create_dm_channel(owner, Actor::user(applicant), Some(target), None)
            .await
            .map(|c| c.channel)
    }

    /// Admin-created channel with the given participants.
    pub async fn group(&self, participants: &[UserId]) -> Channel {
        let input = CreateChannelInput {
            participant_ids: participants.to_vec(),
            target_id: None,
            is_visible: true,
        };
        self.core
            .channels
            .create_channel_for_admin(input, Self::admin())
            .await
            .unwrap()
            .channel
    }

    pub async fn send(&self, channel_id: ChannelId, author: UserId, content: &str) -> Message {
        self.core
            .messages
            .send_message(SendMessageInput::text(channel_id, content), Actor::user(author))
            .await
            .unwrap()
    }

    pub async fn send_random(&self, channel_id: ChannelId, author: UserId) -> Message {
        let content: String = Sentence(3..8).fake();
        self.send(channel_id, author, &content).await
    }
}

/// Let the clock move past the previous write.
pub async fn tick() {
    tokio::time::sleep(Duration::from_millis(2)).await;
}

pub fn assert_kind<T: std::fmt::Debug>(result: Result<T, ChatError>, expected: ErrorKind) {
    match result {
        Ok(value) => panic!("expected {:?} error, got Ok({:?})", expected, value),
        Err(e) => assert_eq!(e.kind(), expected, "unexpected error: {}", e),
    }
}
