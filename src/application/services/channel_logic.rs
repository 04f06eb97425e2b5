//! Channel Logic
//!
//! Channel lifecycle and membership: listing, leaving, pins, admin
//! operations, invitations and the direct-message dedup rule used by the
//! matching flow.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument};
use validator::Validate;

use crate::application::dto::{ChannelListArgs, CreateChannelInput};
use crate::config::ChatSettings;
use crate::domain::{
    Actor, ChannelId, ChannelLike, ChannelPatch, ChannelQuery, ChannelSortKey, ChannelState,
    ChannelStore, ChannelWithParticipants, Connection, DirectPair, Keyset, ListedChannel, NewChannel,
    Participant, UserId,
};
use crate::domain::value_objects::pagination::build_connection;
use crate::infrastructure::metrics;
use crate::shared::clock;
use crate::shared::error::{ChatError, ChatResult};
use crate::shared::snowflake::SnowflakeGenerator;
use crate::shared::validation::validation_error;

/// Result of removing one user from one channel.
enum LeaveOutcome<C> {
    Missing,
    NotParticipant,
    Left(C),
}

/// Channel operations, generic over the channel store.
pub struct ChannelLogic<S> {
    store: Arc<S>,
    ids: Arc<SnowflakeGenerator>,
    default_page_size: i32,
}

impl<S> Clone for ChannelLogic<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ids: self.ids.clone(),
            default_page_size: self.default_page_size,
        }
    }
}

impl<S: ChannelStore> ChannelLogic<S> {
    pub fn new(store: Arc<S>, ids: Arc<SnowflakeGenerator>, settings: &ChatSettings) -> Self {
        Self {
            store,
            ids,
            default_page_size: settings.default_page_size,
        }
    }

    /// Channel visible to the actor: a participant, or any channel for admins.
    #[instrument(skip(self))]
    pub async fn get_channel(&self, id: ChannelId, actor: Actor) -> ChatResult<S::Channel> {
        let channel = self
            .store
            .find_channel(id)
            .await?
            .ok_or_else(|| ChatError::not_found("Channel"))?;

        if !actor.is_admin() && self.store.find_participant(id, actor.id).await?.is_none() {
            return Err(ChatError::not_found("Channel"));
        }
        Ok(channel)
    }

    /// The actor's channels, pinned first, then newest first.
    #[instrument(skip(self))]
    pub async fn list_channels_for_actor(
        &self,
        actor: Actor,
        args: ChannelListArgs,
    ) -> ChatResult<Connection<ListedChannel<S::Channel>>> {
        let query = ChannelQuery {
            member_id: Some(actor.id),
            filter: args.filter,
        };
        let keyset = args.page.validate::<ChannelSortKey>(self.default_page_size)?;
        self.list_page(query, keyset, args.page.include_total_count).await
    }

    /// Every channel, newest first. Admin only.
    #[instrument(skip(self))]
    pub async fn list_all_channels(
        &self,
        actor: Actor,
        args: ChannelListArgs,
    ) -> ChatResult<Connection<ListedChannel<S::Channel>>> {
        actor.require_admin()?;
        let query = ChannelQuery {
            member_id: None,
            filter: args.filter,
        };
        let keyset = args.page.validate::<ChannelSortKey>(self.default_page_size)?;
        self.list_page(query, keyset, args.page.include_total_count).await
    }

    async fn list_page(
        &self,
        query: ChannelQuery,
        keyset: Keyset<ChannelSortKey>,
        include_total_count: bool,
    ) -> ChatResult<Connection<ListedChannel<S::Channel>>> {
        let rows = self.store.find_channel_page(&query, &keyset).await?;
        let mut connection = build_connection(rows, &keyset, |row| row.sort_key())?;
        if include_total_count {
            connection.total_count = Some(self.store.count_channels(&query).await?);
        }
        Ok(connection)
    }

    /// Channels the actor pinned and still participates in, latest pin first.
    #[instrument(skip(self))]
    pub async fn list_pinned_channels(&self, actor: Actor) -> ChatResult<Vec<ListedChannel<S::Channel>>> {
        self.store.find_pinned_channels(actor.id).await
    }

    /// Remove the actor from a channel.
    ///
    /// A channel bound to a target goes INACTIVE as soon as anyone leaves;
    /// other channels only once nobody is left.
    #[instrument(skip(self))]
    pub async fn leave_channel(&self, id: ChannelId, actor: Actor) -> ChatResult<S::Channel> {
        let mut tx = self.store.begin().await?;
        let channel = match self.leave_in(&mut tx, id, actor.id).await? {
            LeaveOutcome::Missing => return Err(ChatError::not_found("Channel")),
            LeaveOutcome::NotParticipant => {
                return Err(ChatError::bad_input("Not a participant of this channel"))
            }
            LeaveOutcome::Left(channel) => channel,
        };
        self.store.commit(tx).await?;

        info!(channel_id = id, state = %channel.state(), "Participant left channel");
        Ok(channel)
    }

    /// Leave several channels at once. Channels that are missing or that
    /// the actor is not in are skipped.
    #[instrument(skip(self))]
    pub async fn leave_channels(&self, ids: Vec<ChannelId>, actor: Actor) -> ChatResult<Vec<S::Channel>> {
        let mut seen = HashSet::new();
        let mut left = Vec::new();

        let mut tx = self.store.begin().await?;
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            match self.leave_in(&mut tx, id, actor.id).await? {
                LeaveOutcome::Left(channel) => left.push(channel),
                LeaveOutcome::Missing | LeaveOutcome::NotParticipant => {
                    debug!(channel_id = id, "Skipping channel");
                }
            }
        }
        self.store.commit(tx).await?;

        info!(count = left.len(), "Participant left channels");
        Ok(left)
    }

    async fn leave_in(
        &self,
        tx: &mut S::Tx,
        id: ChannelId,
        user_id: UserId,
    ) -> ChatResult<LeaveOutcome<S::Channel>> {
        let Some(channel) = self.store.lock_channel(tx, id).await? else {
            return Ok(LeaveOutcome::Missing);
        };
        if !self.store.remove_participant(tx, id, user_id).await? {
            return Ok(LeaveOutcome::NotParticipant);
        }

        let deactivate = channel.is_active()
            && (channel.target_id().is_some()
                || self.store.find_participants_in(tx, id).await?.is_empty());
        if !deactivate {
            return Ok(LeaveOutcome::Left(channel));
        }

        let channel = self
            .store
            .update_channel(tx, id, ChannelPatch::state(ChannelState::Inactive), clock::now())
            .await?
            .ok_or_else(|| ChatError::not_found("Channel"))?;
        Ok(LeaveOutcome::Left(channel))
    }

    /// Force a channel state. Admin only; no other rule is checked.
    #[instrument(skip(self))]
    pub async fn set_state(&self, id: ChannelId, state: ChannelState, actor: Actor) -> ChatResult<S::Channel> {
        actor.require_admin()?;

        let mut tx = self.store.begin().await?;
        let channel = self
            .store
            .update_channel(&mut tx, id, ChannelPatch::state(state), clock::now())
            .await?
            .ok_or_else(|| ChatError::not_found("Channel"))?;
        self.store.commit(tx).await?;

        info!(channel_id = id, state = %state, "Channel state set by admin");
        Ok(channel)
    }

    /// Pin or unpin a channel in the actor's list. Repeating is a no-op.
    #[instrument(skip(self))]
    pub async fn set_pinned(&self, id: ChannelId, actor: Actor, pinned: bool) -> ChatResult<ListedChannel<S::Channel>> {
        if self.store.find_participant(id, actor.id).await?.is_none() {
            return Err(ChatError::not_found("Channel"));
        }
        let pinned_at = self
            .store
            .set_pin(id, actor.id, pinned.then(clock::now))
            .await?;

        let channel = self
            .store
            .find_channel(id)
            .await?
            .ok_or_else(|| ChatError::not_found("Channel"))?;
        Ok(ListedChannel { channel, pinned_at })
    }

    /// Create a channel with an explicit participant list. Admin only.
    #[instrument(skip(self))]
    pub async fn create_channel_for_admin(
        &self,
        input: CreateChannelInput,
        actor: Actor,
    ) -> ChatResult<ChannelWithParticipants<S::Channel>> {
        actor.require_admin()?;
        input.validate().map_err(validation_error)?;

        let mut seen = HashSet::new();
        let participant_ids: Vec<UserId> = input
            .participant_ids
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();

        let now = clock::now();
        let mut tx = self.store.begin().await?;
        let channel = self
            .store
            .insert_channel(
                &mut tx,
                NewChannel {
                    id: self.ids.generate(),
                    creator_id: Some(actor.id),
                    target_id: input.target_id,
                    direct_pair: None,
                    is_visible: input.is_visible,
                    created_at: now,
                },
            )
            .await?;
        let participants = self
            .store
            .add_participants(&mut tx, channel.id(), &participant_ids, now)
            .await?;
        self.store.commit(tx).await?;

        info!(channel_id = channel.id(), participants = participants.len(), "Channel created by admin");
        Ok(ChannelWithParticipants { channel, participants })
    }

    /// Add users to an ACTIVE channel. Returns the newly added rows.
    #[instrument(skip(self))]
    pub async fn invite_participants(
        &self,
        id: ChannelId,
        user_ids: Vec<UserId>,
        actor: Actor,
    ) -> ChatResult<Vec<Participant>> {
        let mut tx = self.store.begin().await?;
        let channel = self
            .store
            .lock_channel(&mut tx, id)
            .await?
            .ok_or_else(|| ChatError::not_found("Channel"))?;

        if !actor.is_admin() {
            let participants = self.store.find_participants_in(&mut tx, id).await?;
            if !participants.iter().any(|p| p.user_id == actor.id) {
                return Err(ChatError::not_found("Channel"));
            }
        }
        if !channel.is_active() {
            return Err(ChatError::bad_input("Channel is inactive"));
        }

        let added = self
            .store
            .add_participants(&mut tx, id, &user_ids, clock::now())
            .await?;
        self.store.commit(tx).await?;

        info!(channel_id = id, added = added.len(), "Participants invited");
        Ok(added)
    }

    /// Create or reuse a two-party channel between the actor and `other_user_id`.
    ///
    /// Without a target a new channel is always created. With a target the
    /// pair may hold at most one ACTIVE channel for it, whichever of the two
    /// asks: an ACTIVE one is a duplicate request, otherwise the oldest
    /// INACTIVE one is reactivated with both parties back in, otherwise a new
    /// one is created. Pass `tx` to run inside a caller's
    /// transaction; it is not committed here.
    #[instrument(skip(self, tx))]
    pub async fn create_dm_channel(
        &self,
        other_user_id: UserId,
        actor: Actor,
        target_id: Option<&str>,
        tx: Option<&mut S::Tx>,
    ) -> ChatResult<ChannelWithParticipants<S::Channel>> {
        if other_user_id == actor.id {
            return Err(ChatError::bad_input("Cannot open a direct channel with yourself"));
        }

        match tx {
            Some(tx) => self.create_dm_in(tx, other_user_id, actor.id, target_id).await,
            None => {
                let mut tx = self.store.begin().await?;
                let channel = self
                    .create_dm_in(&mut tx, other_user_id, actor.id, target_id)
                    .await?;
                self.store.commit(tx).await?;
                Ok(channel)
            }
        }
    }

    async fn create_dm_in(
        &self,
        tx: &mut S::Tx,
        other_user_id: UserId,
        user_id: UserId,
        target_id: Option<&str>,
    ) -> ChatResult<ChannelWithParticipants<S::Channel>> {
        let now = clock::now();
        let Some(target_id) = target_id else {
            return self.insert_dm(tx, user_id, other_user_id, None, now).await;
        };

        let pair = DirectPair::new(user_id, other_user_id);
        self.store.lock_target_pair(tx, target_id, pair).await?;
        let channels = self
            .store
            .find_target_channels_for_pair(tx, target_id, pair)
            .await?;

        if channels.iter().any(|c| c.is_active()) {
            return Err(ChatError::bad_input("An active channel already exists for this target"));
        }

        // oldest first, all INACTIVE
        let Some(inactive) = channels.into_iter().next() else {
            return self
                .insert_dm(tx, user_id, other_user_id, Some(target_id.to_string()), now)
                .await;
        };

        let patch = ChannelPatch {
            state: Some(ChannelState::Active),
            target_id: Some(target_id.to_string()),
            ..ChannelPatch::default()
        };
        let channel = self
            .store
            .update_channel(tx, inactive.id(), patch, now)
            .await?
            .ok_or_else(|| ChatError::not_found("Channel"))?;
        self.store
            .add_participants(tx, channel.id(), &pair.members(), now)
            .await?;
        let participants = self.store.find_participants_in(tx, channel.id()).await?;

        metrics::record_dm_channel("reactivated");
        info!(channel_id = channel.id(), target_id, "Direct channel reactivated");
        Ok(ChannelWithParticipants { channel, participants })
    }

    async fn insert_dm(
        &self,
        tx: &mut S::Tx,
        user_id: UserId,
        other_user_id: UserId,
        target_id: Option<String>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> ChatResult<ChannelWithParticipants<S::Channel>> {
        let channel = self
            .store
            .insert_channel(
                tx,
                NewChannel {
                    id: self.ids.generate(),
                    creator_id: Some(user_id),
                    target_id,
                    direct_pair: Some(DirectPair::new(user_id, other_user_id)),
                    is_visible: true,
                    created_at: now,
                },
            )
            .await?;
        let participants = self
            .store
            .add_participants(tx, channel.id(), &[user_id, other_user_id], now)
            .await?;

        metrics::record_dm_channel("created");
        info!(channel_id = channel.id(), "Direct channel created");
        Ok(ChannelWithParticipants { channel, participants })
    }

    /// Deactivate every channel of `target_id` except `keep_channel_id`.
    ///
    /// Returns the channels this call deactivated, with their participants;
    /// channels that were already INACTIVE are left out. Pass `tx`
    /// to run inside a caller's transaction; it is not committed here.
    #[instrument(skip(self, tx))]
    pub async fn update_inactive_fail_channels(
        &self,
        target_id: &str,
        keep_channel_id: ChannelId,
        tx: Option<&mut S::Tx>,
    ) -> ChatResult<Vec<ChannelWithParticipants<S::Channel>>> {
        match tx {
            Some(tx) => self.fail_channels_in(tx, target_id, keep_channel_id).await,
            None => {
                let mut tx = self.store.begin().await?;
                let failed = self.fail_channels_in(&mut tx, target_id, keep_channel_id).await?;
                self.store.commit(tx).await?;
                Ok(failed)
            }
        }
    }

    async fn fail_channels_in(
        &self,
        tx: &mut S::Tx,
        target_id: &str,
        keep_channel_id: ChannelId,
    ) -> ChatResult<Vec<ChannelWithParticipants<S::Channel>>> {
        let channels = self
            .store
            .deactivate_target_channels(tx, target_id, keep_channel_id, clock::now())
            .await?;

        let mut failed = Vec::with_capacity(channels.len());
        for channel in channels {
            let participants = self.store.find_participants_in(tx, channel.id()).await?;
            failed.push(ChannelWithParticipants { channel, participants });
        }

        info!(target_id, keep_channel_id, failed = failed.len(), "Competing channels deactivated");
        Ok(failed)
    }
}
