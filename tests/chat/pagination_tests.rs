//! Relay pagination over messages and channels.

use pretty_assertions::assert_eq;
use test_case::test_case;

use business_chat::application::dto::{ChannelListArgs, MessageListArgs};
use business_chat::domain::{
    Actor, ChannelId, MessageId, MessageOrder, PageRequest,
};
use business_chat::shared::error::ErrorKind;

use crate::common::{assert_kind, tick, TestChat};

async fn seeded(count: usize) -> (TestChat, ChannelId, Vec<MessageId>) {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        ids.push(chat.send(channel.id, 1 + (i as i64 % 2), &format!("m{}", i)).await.id);
    }
    (chat, channel.id, ids)
}

async fn page(chat: &TestChat, channel_id: ChannelId, page: PageRequest) -> (Vec<MessageId>, business_chat::domain::PageInfo) {
    let connection = chat
        .core
        .messages
        .list_messages_for_channel(channel_id, Actor::user(1), MessageListArgs::page(page))
        .await
        .unwrap();
    let ids = connection.nodes().map(|m| m.id).collect();
    (ids, connection.page_info)
}

#[tokio::test]
async fn test_forward_pages_cover_every_message_once() {
    let (chat, channel_id, all) = seeded(7).await;

    let (first, info) = page(&chat, channel_id, PageRequest::forward(3, None)).await;
    assert_eq!(first, all[0..3].to_vec());
    assert!(info.has_next_page);
    assert!(!info.has_previous_page);

    let (second, info) = page(&chat, channel_id, PageRequest::forward(3, info.end_cursor)).await;
    assert_eq!(second, all[3..6].to_vec());
    assert!(info.has_next_page);
    assert!(info.has_previous_page);

    let (third, info) = page(&chat, channel_id, PageRequest::forward(3, info.end_cursor)).await;
    assert_eq!(third, all[6..].to_vec());
    assert!(!info.has_next_page);
}

#[tokio::test]
async fn test_cursor_is_stable_under_tail_inserts() {
    let (chat, channel_id, all) = seeded(5).await;

    let (_, info) = page(&chat, channel_id, PageRequest::forward(2, None)).await;
    let cursor = info.end_cursor;

    let (before, _) = page(&chat, channel_id, PageRequest::forward(2, cursor.clone())).await;
    chat.send(channel_id, 1, "late arrival").await;
    chat.send(channel_id, 2, "later still").await;
    let (after, _) = page(&chat, channel_id, PageRequest::forward(2, cursor.clone())).await;
    let (again, _) = page(&chat, channel_id, PageRequest::forward(2, cursor)).await;

    assert_eq!(before, all[2..4].to_vec());
    assert_eq!(after, before);
    assert_eq!(again, before);
}

#[tokio::test]
async fn test_backward_page_returns_tail_in_chronological_order() {
    let (chat, channel_id, all) = seeded(5).await;

    let (tail, info) = page(&chat, channel_id, PageRequest::backward(2, None)).await;
    assert_eq!(tail, all[3..].to_vec());
    assert!(info.has_previous_page);
    assert!(!info.has_next_page);

    let (earlier, info) = page(&chat, channel_id, PageRequest::backward(2, info.start_cursor)).await;
    assert_eq!(earlier, all[1..3].to_vec());
    assert!(info.has_next_page);

    let (head, info) = page(&chat, channel_id, PageRequest::backward(2, info.start_cursor)).await;
    assert_eq!(head, all[0..1].to_vec());
    assert!(!info.has_previous_page);
}

#[tokio::test]
async fn test_reverse_chronological_order() {
    let (chat, channel_id, all) = seeded(4).await;

    let args = MessageListArgs {
        order: MessageOrder::ReverseChronological,
        page: PageRequest::forward(3, None),
        ..MessageListArgs::default()
    };
    let newest = chat
        .core
        .messages
        .list_messages_for_channel(channel_id, Actor::user(2), args)
        .await
        .unwrap();
    let ids: Vec<_> = newest.nodes().map(|m| m.id).collect();
    assert_eq!(ids, vec![all[3], all[2], all[1]]);

    let args = MessageListArgs {
        order: MessageOrder::ReverseChronological,
        page: PageRequest::forward(3, newest.page_info.end_cursor.clone()),
        ..MessageListArgs::default()
    };
    let rest = chat
        .core
        .messages
        .list_messages_for_channel(channel_id, Actor::user(2), args)
        .await
        .unwrap();
    assert_eq!(rest.nodes().map(|m| m.id).collect::<Vec<_>>(), vec![all[0]]);
}

#[tokio::test]
async fn test_total_count_only_when_requested() {
    let (chat, channel_id, _) = seeded(4).await;

    let plain = chat
        .core
        .messages
        .list_messages_for_channel(channel_id, Actor::user(1), MessageListArgs::page(PageRequest::forward(1, None)))
        .await
        .unwrap();
    assert_eq!(plain.total_count, None);

    let counted = chat
        .core
        .messages
        .list_messages_for_channel(
            channel_id,
            Actor::user(1),
            MessageListArgs::page(PageRequest::forward(1, None).with_total_count()),
        )
        .await
        .unwrap();
    assert_eq!(counted.total_count, Some(4));
    assert_eq!(counted.len(), 1);
}

#[test_case(PageRequest { first: Some(2), last: Some(2), ..PageRequest::default() } ; "first with last")]
#[test_case(PageRequest { first: Some(2), before: Some("x".into()), ..PageRequest::default() } ; "first with before")]
#[test_case(PageRequest::forward(2, Some("not-a-cursor".into())) ; "garbage cursor")]
#[tokio::test]
async fn test_invalid_page_requests(request: PageRequest) {
    let (chat, channel_id, _) = seeded(1).await;

    let result = chat
        .core
        .messages
        .list_messages_for_channel(channel_id, Actor::user(1), MessageListArgs::page(request))
        .await;

    assert_kind(result, ErrorKind::BadInput);
}

#[tokio::test]
async fn test_page_size_is_clamped() {
    let (chat, channel_id, _) = seeded(3).await;

    let (ids, info) = page(&chat, channel_id, PageRequest::forward(0, None)).await;
    assert_eq!(ids.len(), 1);
    assert!(info.has_next_page);
}

#[tokio::test]
async fn test_channel_pages_keep_pins_on_top() {
    let chat = TestChat::new();
    let mut created = Vec::new();
    for other in 2..=6 {
        created.push(chat.dm(1, other).await.id);
        tick().await;
    }
    chat.core.channels.set_pinned(created[1], Actor::user(1), true).await.unwrap();

    let mut seen = Vec::new();
    let mut after = None;
    loop {
        let connection = chat
            .core
            .channels
            .list_channels_for_actor(Actor::user(1), ChannelListArgs::page(PageRequest::forward(2, after)))
            .await
            .unwrap();
        seen.extend(connection.nodes().map(|c| c.channel.id));
        if !connection.page_info.has_next_page {
            break;
        }
        after = connection.page_info.end_cursor;
    }

    assert_eq!(
        seen,
        vec![created[1], created[4], created[3], created[2], created[0]]
    );
}
