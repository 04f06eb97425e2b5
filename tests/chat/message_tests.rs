//! Message send, delete, read tracking and block-list tests.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use business_chat::application::dto::{AdminMessageListArgs, MessageListArgs, SendMessageInput};
use business_chat::config::{ChatSettings, PubSubBackend};
use business_chat::domain::{
    Actor, ChannelState, ChannelStore, MessageKind, MessageStore, NewMessage, NotificationKind,
    PageRequest, UnitOfWork,
};
use business_chat::shared::clock;
use business_chat::shared::error::ErrorKind;

use crate::common::{assert_kind, tick, TestChat};

#[tokio::test]
async fn test_send_message_persists_and_publishes() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;
    let mut sub = chat
        .core
        .messages
        .subscribe_to_channel(channel.id, Actor::user(2))
        .await
        .unwrap();

    let sent = chat.send(channel.id, 1, "hello").await;

    let received = tokio::time::timeout(Duration::from_secs(1), sub.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, sent);
    assert_eq!(sent.author_id, Some(1));
    assert_eq!(sent.kind, MessageKind::Text);
    assert_eq!(chat.store.message_count().await, 1);
}

#[tokio::test]
async fn test_send_notifies_other_participants() {
    let chat = TestChat::new();
    let group = chat.group(&[1, 2, 3]).await;

    chat.send(group.id, 1, "standup in 5").await;

    let sent = chat.notifier.wait_for(1).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::ChatMessage);
    assert_eq!(sent[0].recipients, vec![2, 3]);
    assert_eq!(sent[0].body, "standup in 5");
    assert_eq!(sent[0].relation_id, Some(group.id.to_string()));
}

#[tokio::test]
async fn test_send_to_inactive_channel_has_no_side_effects() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;
    let mut sub = chat
        .core
        .messages
        .subscribe_to_channel(channel.id, Actor::user(2))
        .await
        .unwrap();
    chat.core
        .channels
        .set_state(channel.id, ChannelState::Inactive, TestChat::admin())
        .await
        .unwrap();

    let result = chat
        .core
        .messages
        .send_message(SendMessageInput::text(channel.id, "anyone?"), Actor::user(1))
        .await;

    assert_kind(result, ErrorKind::BadInput);
    assert_eq!(chat.store.message_count().await, 0);
    assert!(tokio::time::timeout(Duration::from_millis(100), sub.next()).await.is_err());
}

#[tokio::test]
async fn test_send_requires_membership() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;

    assert_kind(
        chat.core
            .messages
            .send_message(SendMessageInput::text(channel.id, "hi"), Actor::user(3))
            .await,
        ErrorKind::NotFound,
    );
    assert_kind(
        chat.core
            .messages
            .send_message(SendMessageInput::text(channel.id, "hi"), TestChat::admin())
            .await,
        ErrorKind::Forbidden,
    );
    assert_kind(
        chat.core
            .messages
            .send_message(SendMessageInput::text(424_242, "hi"), Actor::user(1))
            .await,
        ErrorKind::NotFound,
    );
}

#[tokio::test]
async fn test_send_validates_input() {
    let chat = TestChat::with_settings(ChatSettings {
        max_message_length: 10,
        pubsub_backend: PubSubBackend::Local,
        ..ChatSettings::default()
    });
    let channel = chat.dm(1, 2).await;
    let author = Actor::user(1);

    let cases = vec![
        SendMessageInput::text(channel.id, ""),
        SendMessageInput::text(channel.id, "far too long for ten"),
        SendMessageInput {
            kind: MessageKind::System,
            ..SendMessageInput::text(channel.id, "spoof")
        },
        SendMessageInput {
            kind: MessageKind::File,
            ..SendMessageInput::text(channel.id, "a.pdf")
        },
    ];
    for input in cases {
        assert_kind(chat.core.messages.send_message(input, author).await, ErrorKind::BadInput);
    }
    assert_eq!(chat.store.message_count().await, 0);

    let file = chat
        .core
        .messages
        .send_message(
            SendMessageInput::file(channel.id, "a.pdf", json!({ "size": 1024, "mime": "application/pdf" })),
            author,
        )
        .await
        .unwrap();
    assert_eq!(file.kind, MessageKind::File);
    assert_eq!(file.payload.unwrap()["size"], 1024);
}

#[tokio::test]
async fn test_delete_message_rules() {
    let chat = TestChat::new();
    let group = chat.group(&[1, 2]).await;
    let message = chat.send(group.id, 1, "oops").await;

    assert_kind(
        chat.core.messages.delete_message(message.id, Actor::user(2)).await,
        ErrorKind::Forbidden,
    );
    assert_kind(
        chat.core.messages.delete_message(message.id, Actor::user(3)).await,
        ErrorKind::NotFound,
    );

    let deleted = chat.core.messages.delete_message(message.id, Actor::user(1)).await.unwrap();
    assert!(deleted.deleted_at.is_some());

    assert_kind(
        chat.core.messages.delete_message(message.id, Actor::user(1)).await,
        ErrorKind::NotFound,
    );
    assert_kind(
        chat.core.messages.get_message(message.id, Actor::user(2)).await,
        ErrorKind::NotFound,
    );
}

#[tokio::test]
async fn test_admin_may_delete_any_message() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;
    let message = chat.send(channel.id, 1, "spam").await;

    let deleted = chat
        .core
        .messages
        .delete_message(message.id, TestChat::admin())
        .await
        .unwrap();

    assert_eq!(deleted.id, message.id);
}

#[tokio::test]
async fn test_delete_messages_skips_inapplicable_ids() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;
    let mine = chat.send(channel.id, 1, "mine").await;
    let theirs = chat.send(channel.id, 2, "theirs").await;
    let gone = chat.send(channel.id, 1, "gone").await;
    chat.core.messages.delete_message(gone.id, Actor::user(1)).await.unwrap();

    let deleted = chat
        .core
        .messages
        .delete_messages(vec![mine.id, theirs.id, gone.id, 424_242], Actor::user(1))
        .await
        .unwrap();

    assert_eq!(deleted.iter().map(|m| m.id).collect::<Vec<_>>(), vec![mine.id]);
    assert!(chat.core.messages.get_message(theirs.id, Actor::user(1)).await.is_ok());
}

#[tokio::test]
async fn test_get_message_visibility_and_blocks() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;
    let message = chat.send(channel.id, 1, "hi").await;

    assert!(chat.core.messages.get_message(message.id, Actor::user(2)).await.is_ok());
    assert!(chat.core.messages.get_message(message.id, TestChat::admin()).await.is_ok());
    assert_kind(
        chat.core.messages.get_message(message.id, Actor::user(3)).await,
        ErrorKind::NotFound,
    );

    chat.blocks.block(2, 1);
    assert_kind(
        chat.core.messages.get_message(message.id, Actor::user(2)).await,
        ErrorKind::BadInput,
    );
}

#[tokio::test]
async fn test_unread_count_follows_read_cursor() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;
    let reader = Actor::user(2);
    tick().await;

    assert_eq!(chat.core.messages.unread_count(channel.id, 2).await.unwrap(), 0);

    for _ in 0..3 {
        chat.send_random(channel.id, 1).await;
    }
    assert_eq!(chat.core.messages.unread_count(channel.id, 2).await.unwrap(), 3);

    tick().await;
    chat.core.messages.mark_channel_read(channel.id, reader).await.unwrap();
    assert_eq!(chat.core.messages.unread_count(channel.id, 2).await.unwrap(), 0);

    // marking twice is harmless
    chat.core.messages.mark_channel_read(channel.id, reader).await.unwrap();
    tick().await;

    let last = chat.send_random(channel.id, 1).await;
    assert_eq!(chat.core.messages.unread_count(channel.id, 2).await.unwrap(), 1);

    chat.core.messages.delete_message(last.id, Actor::user(1)).await.unwrap();
    assert_eq!(chat.core.messages.unread_count(channel.id, 2).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mark_read_waits_for_in_flight_send() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;

    // a send between stamping and commit
    let mut tx = chat.store.begin().await.unwrap();
    chat.store.lock_channel(&mut tx, channel.id).await.unwrap();
    let pending = chat
        .store
        .insert_message(
            &mut tx,
            NewMessage {
                id: 77,
                channel_id: channel.id,
                author_id: Some(1),
                kind: MessageKind::Text,
                content: "in flight".into(),
                payload: None,
                created_at: clock::now(),
            },
        )
        .await
        .unwrap();

    let messages = chat.core.messages.clone();
    let channel_id = channel.id;
    let reader = tokio::spawn(async move { messages.mark_channel_read(channel_id, Actor::user(2)).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!reader.is_finished());

    chat.store.commit(tx).await.unwrap();
    let read_at = reader.await.unwrap().unwrap();

    assert!(read_at >= pending.created_at);
    assert_eq!(chat.core.messages.unread_count(channel.id, 2).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unread_count_is_zero_for_non_participants() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;
    tick().await;
    chat.send_random(channel.id, 1).await;

    assert_eq!(chat.core.messages.unread_count(channel.id, 3).await.unwrap(), 0);
    assert_kind(
        chat.core.messages.mark_channel_read(channel.id, Actor::user(3)).await,
        ErrorKind::NotFound,
    );
}

#[tokio::test]
async fn test_blocked_author_hidden_from_pages_and_unread() {
    let chat = TestChat::new();
    let group = chat.group(&[1, 2, 3]).await;
    tick().await;

    chat.send(group.id, 1, "from a").await;
    chat.send(group.id, 3, "from c").await;
    chat.core
        .messages
        .send_system_message("c joined", group.id, None)
        .await
        .unwrap();
    chat.send(group.id, 1, "from a again").await;

    chat.blocks.block(2, 1);

    let page = chat
        .core
        .messages
        .list_messages_for_channel(group.id, Actor::user(2), MessageListArgs::default())
        .await
        .unwrap();
    let contents: Vec<_> = page.nodes().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["from c", "c joined"]);
    assert_eq!(chat.core.messages.unread_count(group.id, 2).await.unwrap(), 2);

    // the block is one-way
    let page = chat
        .core
        .messages
        .list_messages_for_channel(group.id, Actor::user(3), MessageListArgs::default())
        .await
        .unwrap();
    assert_eq!(page.len(), 4);

    chat.blocks.unblock(2, 1);
    assert_eq!(chat.core.messages.unread_count(group.id, 2).await.unwrap(), 4);
}

#[tokio::test]
async fn test_list_messages_requires_visibility() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;

    assert_kind(
        chat.core
            .messages
            .list_messages_for_channel(channel.id, Actor::user(3), MessageListArgs::default())
            .await,
        ErrorKind::NotFound,
    );
}

#[tokio::test]
async fn test_list_file_payloads_returns_only_files() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;
    chat.send(channel.id, 1, "look at this").await;
    let file = chat
        .core
        .messages
        .send_message(
            SendMessageInput::file(channel.id, "plan.png", json!({ "url": "s3://bucket/plan.png" })),
            Actor::user(1),
        )
        .await
        .unwrap();

    let files = chat
        .core
        .messages
        .list_file_payloads(channel.id, Actor::user(2), MessageListArgs::default())
        .await
        .unwrap();

    assert_eq!(files.nodes().map(|m| m.id).collect::<Vec<_>>(), vec![file.id]);
}

#[tokio::test]
async fn test_admin_listing_can_include_deleted() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;
    let kept = chat.send(channel.id, 1, "kept").await;
    let removed = chat.send(channel.id, 1, "removed").await;
    chat.core.messages.delete_message(removed.id, Actor::user(1)).await.unwrap();

    assert_kind(
        chat.core
            .messages
            .list_all_for_admin(Actor::user(1), AdminMessageListArgs::default())
            .await,
        ErrorKind::Forbidden,
    );

    let visible = chat
        .core
        .messages
        .list_all_for_admin(TestChat::admin(), AdminMessageListArgs::default())
        .await
        .unwrap();
    assert_eq!(visible.nodes().map(|m| m.id).collect::<Vec<_>>(), vec![kept.id]);

    let everything = chat
        .core
        .messages
        .list_all_for_admin(
            TestChat::admin(),
            AdminMessageListArgs {
                channel_id: Some(channel.id),
                include_deleted: true,
                page: PageRequest::default().with_total_count(),
                ..AdminMessageListArgs::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(everything.len(), 2);
    assert_eq!(everything.total_count, Some(2));
}

#[tokio::test]
async fn test_system_message_without_tx_is_published() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;
    let mut sub = chat
        .core
        .messages
        .subscribe_to_channel(channel.id, Actor::user(1))
        .await
        .unwrap();

    let message = chat
        .core
        .messages
        .send_system_message("Channel archived soon", channel.id, None)
        .await
        .unwrap();

    assert_eq!(message.author_id, None);
    assert_eq!(message.kind, MessageKind::System);
    let received = tokio::time::timeout(Duration::from_secs(1), sub.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.id, message.id);

    assert_kind(
        chat.core
            .messages
            .send_system_message("nobody home", 424_242, None)
            .await,
        ErrorKind::NotFound,
    );
}
