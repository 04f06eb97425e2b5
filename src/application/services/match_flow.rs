//! Matching flow.
//!
//! Applicants open a direct channel with the owner of a matching target.
//! When the owner selects one applicant, every competing channel for the
//! target goes INACTIVE and receives a system message in the same
//! transaction; publishing and notifications follow the commit.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::channel_logic::ChannelLogic;
use super::dispatch;
use super::message_logic::MessageLogic;
use crate::domain::{
    Actor, ChannelId, ChannelLike, ChannelStore, ChannelWithParticipants, MessageStore,
    Notification, NotificationKind, Notifier, UserId,
};
use crate::shared::error::{ChatError, ChatResult};

/// System message posted into channels that lost a match.
pub const ELIMINATED_MESSAGE: &str = "This conversation was eliminated from the match.";

/// The matching-domain object channels compete for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTarget {
    pub id: String,
    pub owner_id: UserId,
    pub title: Option<String>,
    /// Applicant the owner already picked, as recorded by the matching domain
    #[serde(default)]
    pub selected_user_id: Option<UserId>,
}

/// Outcome of [`MatchChatFlow::select`].
#[derive(Debug, Clone)]
pub struct MatchSelection<C, M> {
    pub winner: ChannelWithParticipants<C>,
    pub eliminated: Vec<ChannelWithParticipants<C>>,
    /// One per eliminated channel, already published
    pub system_messages: Vec<M>,
}

pub struct MatchChatFlow<S> {
    store: Arc<S>,
    channels: ChannelLogic<S>,
    messages: MessageLogic<S>,
    notifier: Arc<dyn Notifier>,
}

impl<S> Clone for MatchChatFlow<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            channels: self.channels.clone(),
            messages: self.messages.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<S> MatchChatFlow<S>
where
    S: ChannelStore + MessageStore,
{
    pub fn new(
        store: Arc<S>,
        channels: ChannelLogic<S>,
        messages: MessageLogic<S>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            channels,
            messages,
            notifier,
        }
    }

    /// Open (or reopen) the actor's channel with the target owner.
    #[instrument(skip(self))]
    pub async fn apply(
        &self,
        target: &MatchTarget,
        actor: Actor,
    ) -> ChatResult<ChannelWithParticipants<S::Channel>> {
        if target.owner_id == actor.id {
            return Err(ChatError::bad_input("Cannot apply to your own target"));
        }

        let mut tx = self.store.begin().await?;
        let channel = self
            .channels
            .create_dm_channel(target.owner_id, actor, Some(&target.id), Some(&mut tx))
            .await?;
        self.store.commit(tx).await?;

        info!(target_id = %target.id, channel_id = channel.channel.id(), "Match proposal opened");
        dispatch(
            self.notifier.clone(),
            Notification {
                kind: NotificationKind::MatchProposal,
                recipients: vec![target.owner_id],
                title: "New match proposal".into(),
                body: target
                    .title
                    .clone()
                    .unwrap_or_else(|| "Someone applied to your post".into()),
                relation_id: Some(channel.channel.id().to_string()),
            },
        );
        Ok(channel)
    }

    /// Pick `channel_id` as the winner for the target.
    ///
    /// Only the owner may select, once. The channel must belong to the
    /// target, be ACTIVE and have exactly two participants.
    #[instrument(skip(self))]
    pub async fn select(
        &self,
        target: &MatchTarget,
        channel_id: ChannelId,
        actor: Actor,
    ) -> ChatResult<MatchSelection<S::Channel, S::Message>> {
        if target.owner_id != actor.id {
            return Err(ChatError::not_found("Target"));
        }
        if target.selected_user_id.is_some() {
            return Err(ChatError::bad_input("An applicant was already selected for this target"));
        }

        let mut tx = self.store.begin().await?;
        let channel = self
            .store
            .lock_channel(&mut tx, channel_id)
            .await?
            .ok_or_else(|| ChatError::not_found("Channel"))?;
        if channel.target_id() != Some(target.id.as_str()) {
            return Err(ChatError::bad_input("Channel does not belong to this target"));
        }
        if !channel.is_active() {
            return Err(ChatError::bad_input("Channel is inactive"));
        }
        let participants = self.store.find_participants_in(&mut tx, channel_id).await?;
        if participants.len() != 2 {
            return Err(ChatError::bad_input("Channel must have exactly two participants"));
        }

        let eliminated = self
            .channels
            .update_inactive_fail_channels(&target.id, channel_id, Some(&mut tx))
            .await?;
        let mut system_messages = Vec::with_capacity(eliminated.len());
        for lost in &eliminated {
            let message = self
                .messages
                .send_system_message(ELIMINATED_MESSAGE, lost.channel.id(), Some(&mut tx))
                .await?;
            system_messages.push(message);
        }
        self.store.commit(tx).await?;

        for message in &system_messages {
            self.messages.publish_message(message).await;
        }

        let winner = ChannelWithParticipants { channel, participants };
        self.notify_selection(target, &winner, &eliminated);

        info!(
            target_id = %target.id,
            channel_id,
            eliminated = eliminated.len(),
            "Match selected"
        );
        Ok(MatchSelection {
            winner,
            eliminated,
            system_messages,
        })
    }

    fn notify_selection(
        &self,
        target: &MatchTarget,
        winner: &ChannelWithParticipants<S::Channel>,
        eliminated: &[ChannelWithParticipants<S::Channel>],
    ) {
        let title = target.title.clone().unwrap_or_else(|| "Your application".into());

        let winners: Vec<UserId> = winner
            .participant_ids()
            .into_iter()
            .filter(|id| *id != target.owner_id)
            .collect();
        dispatch(
            self.notifier.clone(),
            Notification {
                kind: NotificationKind::MatchSelected,
                recipients: winners,
                title: title.clone(),
                body: "You were selected".into(),
                relation_id: Some(winner.channel.id().to_string()),
            },
        );

        let mut losers: Vec<UserId> = eliminated
            .iter()
            .flat_map(|c| c.participant_ids())
            .filter(|id| *id != target.owner_id)
            .collect();
        losers.sort_unstable();
        losers.dedup();
        if losers.is_empty() {
            return;
        }
        dispatch(
            self.notifier.clone(),
            Notification {
                kind: NotificationKind::MatchEliminated,
                recipients: losers,
                title,
                body: "Another applicant was selected".into(),
                relation_id: Some(target.id.clone()),
            },
        );
    }
}
