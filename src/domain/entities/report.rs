//! Chat report entity and store trait.
//!
//! Maps to the `b_chat_reports` table. A report is filed by a user against a
//! channel or a single message and then worked through by admins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{Keyset, ReportId, UserId};
use crate::shared::error::ChatResult;

/// What a report points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportTargetKind {
    Channel,
    Message,
}

impl ReportTargetKind {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "message" => Self::Message,
            _ => Self::Channel,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::Message => "message",
        }
    }
}

/// Handling state of a report. Only PENDING reports can be withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportState {
    #[default]
    Pending,
    Processing,
    Resolved,
    Rejected,
}

impl ReportState {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "processing" => Self::Processing,
            "resolved" => Self::Resolved,
            "rejected" => Self::Rejected,
            _ => Self::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Resolved => "resolved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ReportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user's report about a channel or message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReport {
    pub id: ReportId,
    pub author_id: UserId,
    #[serde(rename = "type")]
    pub target_kind: ReportTargetKind,
    /// Channel or message id, per `target_kind`
    pub target_id: i64,
    pub category: String,
    pub content: String,
    /// Free-form extra field kept alongside the report
    pub etc: Option<String>,
    /// Only ever shown to admins
    pub admin_memo: Option<String>,
    pub state: ReportState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatReport {
    /// The report as its author may see it.
    pub fn without_admin_memo(mut self) -> Self {
        self.admin_memo = None;
        self
    }
}

/// Insert payload for a report. New reports start PENDING.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub id: ReportId,
    pub author_id: UserId,
    pub target_kind: ReportTargetKind,
    pub target_id: i64,
    pub category: String,
    pub content: String,
    pub etc: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Partial update of a report; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportPatch {
    pub category: Option<String>,
    pub content: Option<String>,
    pub etc: Option<String>,
    pub state: Option<ReportState>,
    pub admin_memo: Option<String>,
}

impl ReportPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(self, report: &mut ChatReport, at: DateTime<Utc>) {
        if let Some(category) = self.category {
            report.category = category;
        }
        if let Some(content) = self.content {
            report.content = content;
        }
        if let Some(etc) = self.etc {
            report.etc = Some(etc);
        }
        if let Some(state) = self.state {
            report.state = state;
        }
        if let Some(memo) = self.admin_memo {
            report.admin_memo = Some(memo);
        }
        report.updated_at = at;
    }
}

/// Caller-facing report filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFilter {
    pub states: Option<Vec<ReportState>>,
    pub target_kinds: Option<Vec<ReportTargetKind>>,
    pub category: Option<String>,
}

/// Store-level listing query.
#[derive(Debug, Clone, Default)]
pub struct ReportQuery {
    /// None lists every author's reports (admin listing)
    pub author_id: Option<UserId>,
    pub filter: ReportFilter,
}

impl ReportQuery {
    pub fn matches(&self, report: &ChatReport) -> bool {
        let filter = &self.filter;
        self.author_id.map_or(true, |a| report.author_id == a)
            && filter
                .states
                .as_ref()
                .map_or(true, |states| states.contains(&report.state))
            && filter
                .target_kinds
                .as_ref()
                .map_or(true, |kinds| kinds.contains(&report.target_kind))
            && filter
                .category
                .as_deref()
                .map_or(true, |c| report.category == c)
    }
}

/// Sort key of a report list; lists run newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReportSortKey {
    #[serde(rename = "c")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "i")]
    pub id: ReportId,
}

impl ReportSortKey {
    pub fn of(report: &ChatReport) -> Self {
        Self {
            created_at: report.created_at,
            id: report.id,
        }
    }
}

/// Persistence contract for chat reports.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn find_report(&self, id: ReportId) -> ChatResult<Option<ChatReport>>;

    /// One page of reports in scan order; the list itself is newest first.
    async fn find_report_page(
        &self,
        query: &ReportQuery,
        keyset: &Keyset<ReportSortKey>,
    ) -> ChatResult<Vec<ChatReport>>;

    async fn count_reports(&self, query: &ReportQuery) -> ChatResult<i64>;

    async fn insert_report(&self, report: NewReport) -> ChatResult<ChatReport>;

    async fn update_report(
        &self,
        id: ReportId,
        patch: ReportPatch,
        at: DateTime<Utc>,
    ) -> ChatResult<Option<ChatReport>>;

    /// Delete the report only while it is still in `state`.
    async fn delete_report(&self, id: ReportId, state: ReportState) -> ChatResult<Option<ChatReport>>;
}
