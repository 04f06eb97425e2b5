//! Matching flow: applying to a target and selecting a winner.

use std::time::Duration;

use pretty_assertions::assert_eq;

use business_chat::application::dto::MessageListArgs;
use business_chat::application::services::{MatchTarget, ELIMINATED_MESSAGE};
use business_chat::domain::{Actor, ChannelState, MessageKind, NotificationKind};
use business_chat::shared::error::ErrorKind;

use crate::common::{assert_kind, TestChat};

const OWNER: i64 = 1;

fn target() -> MatchTarget {
    MatchTarget {
        id: "post-42".into(),
        owner_id: OWNER,
        title: Some("Logo design".into()),
        selected_user_id: None,
    }
}

#[tokio::test]
async fn test_apply_opens_channel_and_notifies_owner() {
    let chat = TestChat::new();

    let channel = chat.core.matching.apply(&target(), Actor::user(2)).await.unwrap();

    assert_eq!(channel.channel.target_id.as_deref(), Some("post-42"));
    let mut ids = channel.participant_ids();
    ids.sort();
    assert_eq!(ids, vec![OWNER, 2]);

    let sent = chat.notifier.wait_for(1).await;
    assert_eq!(sent[0].kind, NotificationKind::MatchProposal);
    assert_eq!(sent[0].recipients, vec![OWNER]);
    assert_eq!(sent[0].body, "Logo design");
}

#[tokio::test]
async fn test_apply_rules() {
    let chat = TestChat::new();

    assert_kind(
        chat.core.matching.apply(&target(), Actor::user(OWNER)).await,
        ErrorKind::BadInput,
    );

    chat.core.matching.apply(&target(), Actor::user(2)).await.unwrap();
    assert_kind(
        chat.core.matching.apply(&target(), Actor::user(2)).await,
        ErrorKind::BadInput,
    );
}

#[tokio::test]
async fn test_select_eliminates_competitors() {
    let chat = TestChat::new();
    let target = target();
    let winner = chat.core.matching.apply(&target, Actor::user(2)).await.unwrap();
    let loser_a = chat.core.matching.apply(&target, Actor::user(3)).await.unwrap();
    let loser_b = chat.core.matching.apply(&target, Actor::user(4)).await.unwrap();
    chat.notifier.wait_for(3).await;

    let mut loser_feed = chat
        .core
        .messages
        .subscribe_to_channel(loser_a.channel.id, Actor::user(3))
        .await
        .unwrap();

    let selection = chat
        .core
        .matching
        .select(&target, winner.channel.id, Actor::user(OWNER))
        .await
        .unwrap();

    assert_eq!(selection.winner.channel.id, winner.channel.id);
    assert_eq!(selection.winner.channel.state, ChannelState::Active);
    let eliminated: Vec<_> = selection.eliminated.iter().map(|c| c.channel.id).collect();
    assert_eq!(eliminated, vec![loser_a.channel.id, loser_b.channel.id]);
    assert!(selection
        .eliminated
        .iter()
        .all(|c| c.channel.state == ChannelState::Inactive));

    assert_eq!(selection.system_messages.len(), 2);
    assert!(selection
        .system_messages
        .iter()
        .all(|m| m.kind == MessageKind::System && m.content == ELIMINATED_MESSAGE));

    let delivered = tokio::time::timeout(Duration::from_secs(1), loser_feed.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivered.channel_id, loser_a.channel.id);
    assert_eq!(delivered.content, ELIMINATED_MESSAGE);

    let history = chat
        .core
        .messages
        .list_messages_for_channel(loser_b.channel.id, Actor::user(4), MessageListArgs::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 1);

    let sent = chat.notifier.wait_for(5).await;
    let selected = sent
        .iter()
        .find(|n| n.kind == NotificationKind::MatchSelected)
        .unwrap();
    assert_eq!(selected.recipients, vec![2]);
    let eliminated = sent
        .iter()
        .find(|n| n.kind == NotificationKind::MatchEliminated)
        .unwrap();
    assert_eq!(eliminated.recipients, vec![3, 4]);
}

#[tokio::test]
async fn test_select_rules() {
    let chat = TestChat::new();
    let target = target();
    let applied = chat.core.matching.apply(&target, Actor::user(2)).await.unwrap();
    let unrelated = chat.dm(OWNER, 5).await;

    assert_kind(
        chat.core
            .matching
            .select(&target, applied.channel.id, Actor::user(2))
            .await,
        ErrorKind::NotFound,
    );
    assert_kind(
        chat.core.matching.select(&target, 424_242, Actor::user(OWNER)).await,
        ErrorKind::NotFound,
    );
    assert_kind(
        chat.core
            .matching
            .select(&target, unrelated.id, Actor::user(OWNER))
            .await,
        ErrorKind::BadInput,
    );

    chat.core
        .channels
        .leave_channel(applied.channel.id, Actor::user(2))
        .await
        .unwrap();
    assert_kind(
        chat.core
            .matching
            .select(&target, applied.channel.id, Actor::user(OWNER))
            .await,
        ErrorKind::BadInput,
    );
}

#[tokio::test]
async fn test_eliminated_applicant_cannot_send_but_can_reapply() {
    let chat = TestChat::new();
    let target = target();
    let winner = chat.core.matching.apply(&target, Actor::user(2)).await.unwrap();
    let loser = chat.core.matching.apply(&target, Actor::user(3)).await.unwrap();
    chat.core
        .matching
        .select(&target, winner.channel.id, Actor::user(OWNER))
        .await
        .unwrap();

    let rejected = chat
        .core
        .messages
        .send_message(
            business_chat::application::dto::SendMessageInput::text(loser.channel.id, "please?"),
            Actor::user(3),
        )
        .await;
    assert_kind(rejected, ErrorKind::BadInput);

    let reopened = chat.core.matching.apply(&target, Actor::user(3)).await.unwrap();
    assert_eq!(reopened.channel.id, loser.channel.id);
    assert_eq!(reopened.channel.state, ChannelState::Active);
}

#[tokio::test]
async fn test_select_cannot_be_repeated_or_moved() {
    let chat = TestChat::new();
    let target = target();
    let winner = chat.core.matching.apply(&target, Actor::user(2)).await.unwrap();
    let loser = chat.core.matching.apply(&target, Actor::user(3)).await.unwrap();
    chat.core
        .matching
        .select(&target, winner.channel.id, Actor::user(OWNER))
        .await
        .unwrap();
    let messages_after_first = chat.store.message_count().await;

    // the losing channel is INACTIVE now
    assert_kind(
        chat.core
            .matching
            .select(&target, loser.channel.id, Actor::user(OWNER))
            .await,
        ErrorKind::BadInput,
    );

    // the matching domain recorded the pick
    let decided = MatchTarget {
        selected_user_id: Some(2),
        ..target.clone()
    };
    assert_kind(
        chat.core
            .matching
            .select(&decided, winner.channel.id, Actor::user(OWNER))
            .await,
        ErrorKind::BadInput,
    );

    let winner_state = chat
        .core
        .channels
        .get_channel(winner.channel.id, Actor::user(2))
        .await
        .unwrap();
    assert_eq!(winner_state.state, ChannelState::Active);
    assert_eq!(chat.store.message_count().await, messages_after_first);
}

#[tokio::test]
async fn test_reselecting_winner_does_not_eliminate_again() {
    let chat = TestChat::new();
    let target = target();
    let winner = chat.core.matching.apply(&target, Actor::user(2)).await.unwrap();
    let loser = chat.core.matching.apply(&target, Actor::user(3)).await.unwrap();
    chat.core
        .matching
        .select(&target, winner.channel.id, Actor::user(OWNER))
        .await
        .unwrap();

    let again = chat
        .core
        .matching
        .select(&target, winner.channel.id, Actor::user(OWNER))
        .await
        .unwrap();

    assert!(again.eliminated.is_empty());
    assert!(again.system_messages.is_empty());
    let history = chat
        .core
        .messages
        .list_messages_for_channel(loser.channel.id, Actor::user(3), MessageListArgs::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_withdrawn_applicant_gets_no_elimination_notice() {
    let chat = TestChat::new();
    let target = target();
    let winner = chat.core.matching.apply(&target, Actor::user(2)).await.unwrap();
    let withdrawn = chat.core.matching.apply(&target, Actor::user(3)).await.unwrap();
    chat.core
        .channels
        .leave_channel(withdrawn.channel.id, Actor::user(3))
        .await
        .unwrap();

    let selection = chat
        .core
        .matching
        .select(&target, winner.channel.id, Actor::user(OWNER))
        .await
        .unwrap();

    assert!(selection.eliminated.is_empty());
    let history = chat
        .core
        .messages
        .list_messages_for_channel(withdrawn.channel.id, Actor::user(OWNER), MessageListArgs::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 0);
}
