//! Chat reports: filing, author edits and withdrawal, admin handling.

use pretty_assertions::assert_eq;

use business_chat::application::dto::{
    AdminReportUpdateInput, CreateReportInput, ReportListArgs, UpdateReportInput,
};
use business_chat::domain::{
    Actor, ChatReport, PageRequest, ReportFilter, ReportState, ReportTargetKind,
};
use business_chat::shared::error::ErrorKind;

use crate::common::{assert_kind, tick, TestChat};

fn report_input(kind: ReportTargetKind, target_id: i64) -> CreateReportInput {
    CreateReportInput {
        target_kind: kind,
        target_id,
        category: "ABUSE".into(),
        content: "rude messages".into(),
        etc: None,
    }
}

async fn file(chat: &TestChat, author: i64) -> ChatReport {
    let channel = chat.dm(author, author + 100).await;
    chat.core
        .reports
        .create_report(report_input(ReportTargetKind::Channel, channel.id), Actor::user(author))
        .await
        .unwrap()
}

fn handle(state: ReportState, memo: &str) -> AdminReportUpdateInput {
    AdminReportUpdateInput {
        state: Some(state),
        admin_memo: Some(memo.into()),
    }
}

#[tokio::test]
async fn test_report_a_message() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;
    let message = chat.send(channel.id, 2, "buy followers here").await;

    let report = chat
        .core
        .reports
        .create_report(report_input(ReportTargetKind::Message, message.id), Actor::user(1))
        .await
        .unwrap();

    assert_eq!(report.author_id, 1);
    assert_eq!(report.target_kind, ReportTargetKind::Message);
    assert_eq!(report.target_id, message.id);
    assert_eq!(report.state, ReportState::Pending);
    assert_eq!(report.admin_memo, None);
}

#[tokio::test]
async fn test_report_requires_existing_target() {
    let chat = TestChat::new();

    let result = chat
        .core
        .reports
        .create_report(report_input(ReportTargetKind::Channel, 424_242), Actor::user(1))
        .await;
    assert_kind(result, ErrorKind::NotFound);

    let result = chat
        .core
        .reports
        .create_report(report_input(ReportTargetKind::Message, 424_242), Actor::user(1))
        .await;
    assert_kind(result, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_report_input_is_validated() {
    let chat = TestChat::new();
    let channel = chat.dm(1, 2).await;
    let mut input = report_input(ReportTargetKind::Channel, channel.id);
    input.category = String::new();

    let result = chat.core.reports.create_report(input, Actor::user(1)).await;
    assert_kind(result, ErrorKind::BadInput);
}

#[tokio::test]
async fn test_reports_are_private_to_their_author() {
    let chat = TestChat::new();
    let report = file(&chat, 1).await;

    assert_eq!(chat.core.reports.get_report(report.id, Actor::user(1)).await.unwrap().id, report.id);
    assert_kind(
        chat.core.reports.get_report(report.id, Actor::user(2)).await,
        ErrorKind::NotFound,
    );
    assert_kind(
        chat.core
            .reports
            .update_report(report.id, UpdateReportInput::default(), Actor::user(2))
            .await,
        ErrorKind::NotFound,
    );
    assert_kind(
        chat.core.reports.delete_report(report.id, Actor::user(2)).await,
        ErrorKind::NotFound,
    );
}

#[tokio::test]
async fn test_author_edits_report() {
    let chat = TestChat::new();
    let report = file(&chat, 1).await;
    tick().await;

    let input = UpdateReportInput {
        content: Some("rude messages, see attached time".into()),
        ..UpdateReportInput::default()
    };
    let updated = chat.core.reports.update_report(report.id, input, Actor::user(1)).await.unwrap();

    assert_eq!(updated.content, "rude messages, see attached time");
    assert_eq!(updated.category, report.category);
    assert!(updated.updated_at > report.updated_at);
}

#[tokio::test]
async fn test_withdraw_pending_report() {
    let chat = TestChat::new();
    let report = file(&chat, 1).await;

    let deleted = chat.core.reports.delete_report(report.id, Actor::user(1)).await.unwrap();
    assert_eq!(deleted.id, report.id);

    assert_kind(
        chat.core.reports.get_report(report.id, Actor::user(1)).await,
        ErrorKind::NotFound,
    );
}

#[tokio::test]
async fn test_handled_report_cannot_be_withdrawn() {
    let chat = TestChat::new();
    let report = file(&chat, 1).await;
    chat.core
        .reports
        .update_report_for_admin(report.id, handle(ReportState::Processing, "looking"), TestChat::admin())
        .await
        .unwrap();

    assert_kind(
        chat.core.reports.delete_report(report.id, Actor::user(1)).await,
        ErrorKind::BadInput,
    );
    assert!(chat.core.reports.get_report(report.id, Actor::user(1)).await.is_ok());
}

#[tokio::test]
async fn test_admin_memo_is_hidden_from_author() {
    let chat = TestChat::new();
    let report = file(&chat, 1).await;

    let handled = chat
        .core
        .reports
        .update_report_for_admin(report.id, handle(ReportState::Resolved, "user warned"), TestChat::admin())
        .await
        .unwrap();
    assert_eq!(handled.state, ReportState::Resolved);
    assert_eq!(handled.admin_memo.as_deref(), Some("user warned"));

    let seen_by_author = chat.core.reports.get_report(report.id, Actor::user(1)).await.unwrap();
    assert_eq!(seen_by_author.state, ReportState::Resolved);
    assert_eq!(seen_by_author.admin_memo, None);

    let mine = chat
        .core
        .reports
        .my_chat_reports(Actor::user(1), ReportListArgs::default())
        .await
        .unwrap();
    assert!(mine.nodes().all(|r| r.admin_memo.is_none()));

    let seen_by_admin = chat.core.reports.get_report(report.id, TestChat::admin()).await.unwrap();
    assert_eq!(seen_by_admin.admin_memo.as_deref(), Some("user warned"));
}

#[tokio::test]
async fn test_admin_operations_require_admin() {
    let chat = TestChat::new();
    let report = file(&chat, 1).await;

    assert_kind(
        chat.core
            .reports
            .update_report_for_admin(report.id, handle(ReportState::Rejected, "no"), Actor::user(1))
            .await,
        ErrorKind::Forbidden,
    );
    assert_kind(
        chat.core
            .reports
            .chat_reports_for_admin(Actor::user(1), ReportListArgs::default())
            .await,
        ErrorKind::Forbidden,
    );
    assert_kind(
        chat.core
            .reports
            .update_report_for_admin(999, handle(ReportState::Rejected, "no"), TestChat::admin())
            .await,
        ErrorKind::NotFound,
    );
}

#[tokio::test]
async fn test_my_reports_page_newest_first() {
    let chat = TestChat::new();
    let mut mine = Vec::new();
    for _ in 0..5 {
        mine.push(file(&chat, 1).await.id);
        tick().await;
    }
    file(&chat, 2).await;
    mine.reverse();

    let first = chat
        .core
        .reports
        .my_chat_reports(Actor::user(1), ReportListArgs::page(PageRequest::forward(3, None).with_total_count()))
        .await
        .unwrap();
    assert_eq!(first.nodes().map(|r| r.id).collect::<Vec<_>>(), mine[0..3].to_vec());
    assert_eq!(first.total_count, Some(5));
    assert!(first.page_info.has_next_page);

    let second = chat
        .core
        .reports
        .my_chat_reports(
            Actor::user(1),
            ReportListArgs::page(PageRequest::forward(3, first.page_info.end_cursor.clone())),
        )
        .await
        .unwrap();
    assert_eq!(second.nodes().map(|r| r.id).collect::<Vec<_>>(), mine[3..].to_vec());
    assert!(!second.page_info.has_next_page);
    assert!(second.page_info.has_previous_page);
}

#[tokio::test]
async fn test_admin_lists_reports_by_state() {
    let chat = TestChat::new();
    let open = file(&chat, 1).await;
    let closed = file(&chat, 2).await;
    chat.core
        .reports
        .update_report_for_admin(closed.id, handle(ReportState::Resolved, "done"), TestChat::admin())
        .await
        .unwrap();

    let all = chat
        .core
        .reports
        .chat_reports_for_admin(TestChat::admin(), ReportListArgs::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let args = ReportListArgs {
        filter: ReportFilter {
            states: Some(vec![ReportState::Pending]),
            ..ReportFilter::default()
        },
        page: PageRequest::default().with_total_count(),
    };
    let pending = chat.core.reports.chat_reports_for_admin(TestChat::admin(), args).await.unwrap();
    assert_eq!(pending.nodes().map(|r| r.id).collect::<Vec<_>>(), vec![open.id]);
    assert_eq!(pending.total_count, Some(1));
}
