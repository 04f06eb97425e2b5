//! Application Services
//!
//! The chat logic, generic over the stores it runs on.
//!
//! ## Available Services
//!
//! - **ChannelLogic**: channel lifecycle, membership, pins, DM dedup
//! - **MessageLogic**: send, delete, listing, unread counts, real-time delivery
//! - **MatchChatFlow**: apply to and select a winner for a matching target
//! - **ChannelLoader**: per-request memoization of channel field lookups
//! - **ReportLogic**: user reports about channels and messages, admin handling

pub mod channel_logic;
pub mod loader;
pub mod match_flow;
pub mod message_logic;
pub mod report_logic;
pub mod subscription;

pub use channel_logic::ChannelLogic;
pub use loader::{ChannelLoader, RequestCache};
pub use match_flow::{MatchChatFlow, MatchSelection, MatchTarget, ELIMINATED_MESSAGE};
pub use message_logic::MessageLogic;
pub use report_logic::ReportLogic;
pub use subscription::MessageSubscription;

use std::sync::Arc;

use tracing::warn;

use crate::domain::{Notification, Notifier};

/// Hand a notification to the notifier without waiting for it.
pub(crate) fn dispatch(notifier: Arc<dyn Notifier>, notification: Notification) {
    tokio::spawn(async move {
        let kind = notification.kind;
        if let Err(e) = notifier.send(notification).await {
            warn!(kind = ?kind, error = %e, "Notification hand-off failed");
        }
    });
}
