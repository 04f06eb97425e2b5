//! Message Logic
//!
//! Message lifecycle: send, delete, listing, read tracking and real-time
//! delivery. Membership checks go through [`ChannelLogic`].
//!
//! Messages are published to a per-channel topic after the write commits;
//! a failed publish is logged and counted but never fails the send.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use super::channel_logic::ChannelLogic;
use super::dispatch;
use super::subscription::MessageSubscription;
use crate::application::dto::{AdminMessageListArgs, MessageListArgs, SendMessageInput};
use crate::config::ChatSettings;
use crate::domain::value_objects::pagination::build_connection;
use crate::domain::{
    Actor, BlockListProvider, ChannelId, ChannelLike, ChannelStore, Connection, MessageId,
    MessageKind, MessageLike, MessageQuery, MessageSortKey, MessageStore, NewMessage,
    Notification, NotificationKind, Notifier, PageRequest, PubSub, UserId,
};
use crate::infrastructure::metrics;
use crate::shared::clock;
use crate::shared::error::{ChatError, ChatResult};
use crate::shared::snowflake::SnowflakeGenerator;
use crate::shared::validation::validation_error;

const PREVIEW_CHARS: usize = 100;

/// Message operations, generic over a store holding both channels and messages.
pub struct MessageLogic<S> {
    store: Arc<S>,
    channels: ChannelLogic<S>,
    block_list: Arc<dyn BlockListProvider>,
    bus: Arc<dyn PubSub>,
    notifier: Arc<dyn Notifier>,
    ids: Arc<SnowflakeGenerator>,
    settings: Arc<ChatSettings>,
}

impl<S> Clone for MessageLogic<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            channels: self.channels.clone(),
            block_list: self.block_list.clone(),
            bus: self.bus.clone(),
            notifier: self.notifier.clone(),
            ids: self.ids.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S> MessageLogic<S>
where
    S: ChannelStore + MessageStore,
{
    pub fn new(
        store: Arc<S>,
        channels: ChannelLogic<S>,
        block_list: Arc<dyn BlockListProvider>,
        bus: Arc<dyn PubSub>,
        notifier: Arc<dyn Notifier>,
        ids: Arc<SnowflakeGenerator>,
        settings: Arc<ChatSettings>,
    ) -> Self {
        Self {
            store,
            channels,
            block_list,
            bus,
            notifier,
            ids,
            settings,
        }
    }

    /// Delivery topic of a channel.
    pub fn topic_for(&self, channel_id: ChannelId) -> String {
        format!("{}.{}", self.settings.delivery_topic, channel_id)
    }

    async fn blocked_for(&self, user_id: UserId) -> ChatResult<Vec<UserId>> {
        let blocked = self.block_list.blocked_author_ids(user_id).await?;
        Ok(blocked.into_iter().collect())
    }

    #[instrument(skip(self))]
    pub async fn get_message(&self, id: MessageId, actor: Actor) -> ChatResult<S::Message> {
        let message = self
            .store
            .find_message(id)
            .await?
            .filter(|m| !m.is_deleted())
            .ok_or_else(|| ChatError::not_found("Message"))?;

        self.channels.get_channel(message.channel_id(), actor).await?;

        if let Some(author_id) = message.author_id() {
            let blocked = self.block_list.blocked_author_ids(actor.id).await?;
            if blocked.contains(&author_id) {
                return Err(ChatError::bad_input("Message author is blocked"));
            }
        }
        Ok(message)
    }

    /// Messages of a channel the actor can see, oldest first unless
    /// `args.order` says otherwise. Blocked authors are left out before
    /// paging so cursors stay stable.
    #[instrument(skip(self))]
    pub async fn list_messages_for_channel(
        &self,
        channel_id: ChannelId,
        actor: Actor,
        args: MessageListArgs,
    ) -> ChatResult<Connection<S::Message>> {
        self.channels.get_channel(channel_id, actor).await?;

        let query = MessageQuery {
            channel_id: Some(channel_id),
            filter: args.filter,
            excluded_authors: self.blocked_for(actor.id).await?,
            include_deleted: false,
            order: args.order,
        };
        self.list_page(query, &args.page).await
    }

    /// FILE messages of a channel; same visibility rules as the full listing.
    #[instrument(skip(self))]
    pub async fn list_file_payloads(
        &self,
        channel_id: ChannelId,
        actor: Actor,
        mut args: MessageListArgs,
    ) -> ChatResult<Connection<S::Message>> {
        args.filter.kinds = Some(vec![MessageKind::File]);
        self.list_messages_for_channel(channel_id, actor, args).await
    }

    /// Messages across channels. Admin only; may include deleted ones.
    #[instrument(skip(self))]
    pub async fn list_all_for_admin(
        &self,
        actor: Actor,
        args: AdminMessageListArgs,
    ) -> ChatResult<Connection<S::Message>> {
        actor.require_admin()?;

        let query = MessageQuery {
            channel_id: args.channel_id,
            filter: args.filter,
            excluded_authors: Vec::new(),
            include_deleted: args.include_deleted,
            order: args.order,
        };
        self.list_page(query, &args.page).await
    }

    async fn list_page(&self, query: MessageQuery, page: &PageRequest) -> ChatResult<Connection<S::Message>> {
        let keyset = page.validate::<MessageSortKey>(self.settings.default_page_size)?;
        let rows = self.store.find_message_page(&query, &keyset).await?;
        let mut connection = build_connection(rows, &keyset, MessageSortKey::of)?;
        if page.include_total_count {
            connection.total_count = Some(self.store.count_messages(&query).await?);
        }
        Ok(connection)
    }

    fn check_content(&self, content: &str) -> ChatResult<()> {
        let length = content.chars().count();
        if length == 0 {
            return Err(ChatError::bad_input("content: Message content must not be empty"));
        }
        if length > self.settings.max_message_length {
            return Err(ChatError::bad_input(format!(
                "content: Message must be at most {} characters",
                self.settings.max_message_length
            )));
        }
        Ok(())
    }

    /// Send a user message to an ACTIVE channel the actor participates in.
    ///
    /// The message is published after commit and the other participants
    /// are notified in the background.
    #[instrument(skip(self, input), fields(channel_id = input.channel_id, kind = %input.kind))]
    pub async fn send_message(&self, input: SendMessageInput, actor: Actor) -> ChatResult<S::Message> {
        input.validate().map_err(validation_error)?;
        self.check_content(&input.content)?;
        match input.kind {
            MessageKind::System => {
                return Err(ChatError::bad_input("System messages cannot be sent by users"))
            }
            MessageKind::File if input.payload.is_none() => {
                return Err(ChatError::bad_input("payload: File messages require a payload"))
            }
            _ => {}
        }

        let mut tx = self.store.begin().await?;
        let channel = self
            .store
            .lock_channel(&mut tx, input.channel_id)
            .await?
            .ok_or_else(|| ChatError::not_found("Channel"))?;

        let participants = self.store.find_participants_in(&mut tx, channel.id()).await?;
        if !participants.iter().any(|p| p.user_id == actor.id) {
            return Err(match actor.is_admin() {
                true => ChatError::forbidden("Only participants can send messages"),
                false => ChatError::not_found("Channel"),
            });
        }
        if !channel.is_active() {
            return Err(ChatError::bad_input("Channel is inactive"));
        }

        let message = self
            .store
            .insert_message(
                &mut tx,
                NewMessage {
                    id: self.ids.generate(),
                    channel_id: channel.id(),
                    author_id: Some(actor.id),
                    kind: input.kind,
                    content: input.content,
                    payload: input.payload,
                    created_at: clock::now(),
                },
            )
            .await?;
        self.store.commit(tx).await?;

        metrics::record_message_sent(message.kind().as_str());
        info!(message_id = message.id(), "Message sent");

        self.publish_message(&message).await;

        let recipients: Vec<UserId> = participants
            .iter()
            .map(|p| p.user_id)
            .filter(|id| *id != actor.id)
            .collect();
        if !recipients.is_empty() {
            dispatch(
                self.notifier.clone(),
                Notification {
                    kind: NotificationKind::ChatMessage,
                    recipients,
                    title: "New message".into(),
                    body: preview(&message),
                    relation_id: Some(channel.id().to_string()),
                },
            );
        }

        Ok(message)
    }

    /// Soft-delete one message.
    ///
    /// The author and admins may delete. Other participants get
    /// `Forbidden`; everyone else sees the message as missing.
    #[instrument(skip(self))]
    pub async fn delete_message(&self, id: MessageId, actor: Actor) -> ChatResult<S::Message> {
        let message = self
            .store
            .find_message(id)
            .await?
            .filter(|m| !m.is_deleted())
            .ok_or_else(|| ChatError::not_found("Message"))?;

        if message.author_id() != Some(actor.id) && !actor.is_admin() {
            let participant = self.store.find_participant(message.channel_id(), actor.id).await?;
            return Err(match participant {
                Some(_) => ChatError::forbidden("Only the author can delete this message"),
                None => ChatError::not_found("Message"),
            });
        }

        let mut tx = self.store.begin().await?;
        let deleted = self
            .store
            .soft_delete_messages(&mut tx, &[id], clock::now())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::not_found("Message"))?;
        self.store.commit(tx).await?;

        metrics::record_messages_deleted(1);
        info!(message_id = id, "Message deleted");
        Ok(deleted)
    }

    /// Soft-delete every message the actor may delete; the rest are skipped.
    #[instrument(skip(self))]
    pub async fn delete_messages(&self, ids: Vec<MessageId>, actor: Actor) -> ChatResult<Vec<S::Message>> {
        let deletable: Vec<MessageId> = self
            .store
            .find_messages_by_ids(&ids)
            .await?
            .into_iter()
            .filter(|m| !m.is_deleted())
            .filter(|m| actor.is_admin() || m.author_id() == Some(actor.id))
            .map(|m| m.id())
            .collect();
        if deletable.is_empty() {
            debug!("Nothing to delete");
            return Ok(Vec::new());
        }

        let mut tx = self.store.begin().await?;
        let deleted = self
            .store
            .soft_delete_messages(&mut tx, &deletable, clock::now())
            .await?;
        self.store.commit(tx).await?;

        metrics::record_messages_deleted(deleted.len());
        info!(requested = ids.len(), deleted = deleted.len(), "Messages deleted");
        Ok(deleted)
    }

    /// Write a SYSTEM message.
    ///
    /// With `tx` the message is only written; the caller publishes it with
    /// [`Self::publish_message`] once its transaction commits. Without one
    /// it is committed and published here. The channel state is not checked.
    #[instrument(skip(self, content, tx))]
    pub async fn send_system_message(
        &self,
        content: &str,
        channel_id: ChannelId,
        tx: Option<&mut S::Tx>,
    ) -> ChatResult<S::Message> {
        self.check_content(content)?;

        match tx {
            Some(tx) => self.insert_system(tx, content, channel_id).await,
            None => {
                let mut tx = self.store.begin().await?;
                let message = self.insert_system(&mut tx, content, channel_id).await?;
                self.store.commit(tx).await?;
                self.publish_message(&message).await;
                Ok(message)
            }
        }
    }

    async fn insert_system(&self, tx: &mut S::Tx, content: &str, channel_id: ChannelId) -> ChatResult<S::Message> {
        if self.store.lock_channel(tx, channel_id).await?.is_none() {
            return Err(ChatError::not_found("Channel"));
        }
        let message = self
            .store
            .insert_message(
                tx,
                NewMessage {
                    id: self.ids.generate(),
                    channel_id,
                    author_id: None,
                    kind: MessageKind::System,
                    content: content.to_string(),
                    payload: None,
                    created_at: clock::now(),
                },
            )
            .await?;

        metrics::record_message_sent(MessageKind::System.as_str());
        debug!(message_id = message.id(), "System message written");
        Ok(message)
    }

    /// Publish a committed message to its channel topic. Failures are logged.
    pub async fn publish_message(&self, message: &S::Message) {
        let topic = self.topic_for(message.channel_id());
        let result = match serde_json::to_string(message) {
            Ok(payload) => self.bus.publish(&topic, payload).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            metrics::record_publish_failure();
            warn!(message_id = message.id(), topic = %topic, error = %e, "Failed to publish message");
        }
    }

    /// Subscribe to new messages of a channel the actor can see.
    ///
    /// The subscription is live when this returns; earlier messages are
    /// read with [`Self::list_messages_for_channel`].
    #[instrument(skip(self))]
    pub async fn subscribe_to_channel(
        &self,
        channel_id: ChannelId,
        actor: Actor,
    ) -> ChatResult<MessageSubscription<S::Message>> {
        self.channels.get_channel(channel_id, actor).await?;

        let payloads = self.bus.subscribe(&self.topic_for(channel_id)).await?;
        debug!("Subscription opened");
        Ok(MessageSubscription::spawn(
            payloads,
            channel_id,
            actor.id,
            self.block_list.clone(),
            self.settings.subscription_buffer,
        ))
    }

    /// Move the actor's read cursor to now.
    ///
    /// Runs under the channel lock, the same one sends hold while stamping
    /// and committing, so the cursor never passes an uncommitted message.
    #[instrument(skip(self))]
    pub async fn mark_channel_read(&self, channel_id: ChannelId, actor: Actor) -> ChatResult<DateTime<Utc>> {
        let mut tx = self.store.begin().await?;
        if self.store.lock_channel(&mut tx, channel_id).await?.is_none() {
            return Err(ChatError::not_found("Channel"));
        }
        let at = clock::now();
        if !self.store.mark_read(&mut tx, channel_id, actor.id, at).await? {
            return Err(ChatError::not_found("Channel"));
        }
        self.store.commit(tx).await?;
        Ok(at)
    }

    /// Non-deleted messages after the user's read cursor, without blocked
    /// authors. Zero for non-participants.
    #[instrument(skip(self))]
    pub async fn unread_count(&self, channel_id: ChannelId, user_id: UserId) -> ChatResult<i64> {
        let Some(participant) = self.store.find_participant(channel_id, user_id).await? else {
            return Ok(0);
        };
        let blocked = self.blocked_for(user_id).await?;
        self.store
            .count_unread(channel_id, participant.read_cursor(), &blocked)
            .await
    }
}

fn preview<M: MessageLike>(message: &M) -> String {
    match message.kind() {
        MessageKind::File => "Sent a file".into(),
        _ => message.content().chars().take(PREVIEW_CHARS).collect(),
    }
}
