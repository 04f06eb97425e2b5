//! Per-request loader memoization.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use business_chat::application::services::ChannelLoader;
use business_chat::domain::Actor;

use crate::common::{tick, TestChat};

#[tokio::test]
async fn test_loader_memoizes_participants_until_cleared() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;
    let loader = chat.core.loader();

    assert_eq!(loader.participants(channel.id).await.unwrap().len(), 2);

    chat.core
        .channels
        .invite_participants(channel.id, vec![3], Actor::user(1))
        .await
        .unwrap();
    assert_eq!(loader.participants(channel.id).await.unwrap().len(), 2);

    loader.clear();
    assert_eq!(loader.participants(channel.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_loader_last_message_and_unread_count() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;
    tick().await;
    chat.send(channel.id, 1, "first").await;
    let last = chat.send(channel.id, 1, "second").await;

    let loader = chat.core.loader();
    assert_eq!(loader.last_message(channel.id).await.unwrap(), Some(last));
    assert_eq!(loader.unread_count(channel.id, 2).await.unwrap(), 2);

    chat.send(channel.id, 1, "third").await;
    assert_eq!(loader.unread_count(channel.id, 2).await.unwrap(), 2);

    // a fresh loader per request sees the new state
    let next_request = chat.core.loader();
    assert_eq!(next_request.unread_count(channel.id, 2).await.unwrap(), 3);
    assert_eq!(
        next_request.last_message(channel.id).await.unwrap().map(|m| m.content),
        Some("third".to_string())
    );
}

#[tokio::test]
async fn test_loader_entries_expire() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;
    let loader = ChannelLoader::with_limits(
        Arc::clone(&chat.store),
        chat.core.messages.clone(),
        Duration::from_millis(20),
        100,
    );

    assert_eq!(loader.last_message(channel.id).await.unwrap(), None);
    chat.send(channel.id, 1, "hello").await;
    assert_eq!(loader.last_message(channel.id).await.unwrap(), None);

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(loader.last_message(channel.id).await.unwrap().is_some());
}
