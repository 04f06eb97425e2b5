//! Report Logic
//!
//! Users file reports against channels and messages, may edit their own
//! reports, and may withdraw them while still PENDING. Admins list every
//! report and record their handling through the state and a memo that the
//! author never sees.

use std::sync::Arc;

use tracing::{info, instrument};
use validator::Validate;

use crate::application::dto::{AdminReportUpdateInput, CreateReportInput, ReportListArgs, UpdateReportInput};
use crate::config::ChatSettings;
use crate::domain::value_objects::pagination::build_connection;
use crate::domain::{
    Actor, ChannelStore, ChatReport, Connection, MessageStore, NewReport, ReportId, ReportPatch,
    ReportQuery, ReportSortKey, ReportState, ReportStore, ReportTargetKind,
};
use crate::infrastructure::metrics;
use crate::shared::clock;
use crate::shared::error::{ChatError, ChatResult};
use crate::shared::snowflake::SnowflakeGenerator;
use crate::shared::validation::validation_error;

/// Report operations.
pub struct ReportLogic<S> {
    store: Arc<S>,
    ids: Arc<SnowflakeGenerator>,
    default_page_size: i32,
}

impl<S> Clone for ReportLogic<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ids: self.ids.clone(),
            default_page_size: self.default_page_size,
        }
    }
}

impl<S> ReportLogic<S>
where
    S: ChannelStore + MessageStore + ReportStore,
{
    pub fn new(store: Arc<S>, ids: Arc<SnowflakeGenerator>, settings: &ChatSettings) -> Self {
        Self {
            store,
            ids,
            default_page_size: settings.default_page_size,
        }
    }

    /// File a report. The target must exist; deleted messages can still be reported.
    #[instrument(skip(self, input), fields(target_kind = ?input.target_kind, target_id = input.target_id))]
    pub async fn create_report(&self, input: CreateReportInput, actor: Actor) -> ChatResult<ChatReport> {
        input.validate().map_err(validation_error)?;

        let exists = match input.target_kind {
            ReportTargetKind::Channel => self.store.find_channel(input.target_id).await?.is_some(),
            ReportTargetKind::Message => self.store.find_message(input.target_id).await?.is_some(),
        };
        if !exists {
            return Err(ChatError::not_found("Report target"));
        }

        let report = self
            .store
            .insert_report(NewReport {
                id: self.ids.generate(),
                author_id: actor.id,
                target_kind: input.target_kind,
                target_id: input.target_id,
                category: input.category,
                content: input.content,
                etc: input.etc,
                created_at: clock::now(),
            })
            .await?;

        metrics::record_report_filed(report.target_kind.as_str());
        info!(report_id = report.id, "Chat report filed");
        Ok(report)
    }

    /// A report as the actor may see it: admins see any report with its memo,
    /// authors see their own without it.
    #[instrument(skip(self))]
    pub async fn get_report(&self, id: ReportId, actor: Actor) -> ChatResult<ChatReport> {
        let report = self.find(id).await?;
        if actor.is_admin() {
            return Ok(report);
        }
        Ok(self.owned(report, actor)?.without_admin_memo())
    }

    #[instrument(skip(self, input))]
    pub async fn update_report(
        &self,
        id: ReportId,
        input: UpdateReportInput,
        actor: Actor,
    ) -> ChatResult<ChatReport> {
        input.validate().map_err(validation_error)?;
        let report = self.owned(self.find(id).await?, actor)?;

        let patch = ReportPatch::from(input);
        if patch.is_empty() {
            return Ok(report.without_admin_memo());
        }
        let updated = self.patch(id, patch).await?;
        Ok(updated.without_admin_memo())
    }

    /// Withdraw a report. Only PENDING reports can be withdrawn.
    #[instrument(skip(self))]
    pub async fn delete_report(&self, id: ReportId, actor: Actor) -> ChatResult<ChatReport> {
        let report = self.owned(self.find(id).await?, actor)?;
        if report.state != ReportState::Pending {
            return Err(ChatError::bad_input("Report can no longer be deleted"));
        }

        // an admin may have picked the report up since it was read
        let deleted = self
            .store
            .delete_report(id, ReportState::Pending)
            .await?
            .ok_or_else(|| ChatError::bad_input("Report can no longer be deleted"))?;

        info!(report_id = id, "Chat report withdrawn");
        Ok(deleted.without_admin_memo())
    }

    /// The actor's own reports, newest first.
    #[instrument(skip(self))]
    pub async fn my_chat_reports(&self, actor: Actor, args: ReportListArgs) -> ChatResult<Connection<ChatReport>> {
        let query = ReportQuery {
            author_id: Some(actor.id),
            filter: args.filter.clone(),
        };
        let mut connection = self.list_page(query, &args).await?;
        for edge in &mut connection.edges {
            edge.node.admin_memo = None;
        }
        Ok(connection)
    }

    /// Every report, newest first. Admin only.
    #[instrument(skip(self))]
    pub async fn chat_reports_for_admin(
        &self,
        actor: Actor,
        args: ReportListArgs,
    ) -> ChatResult<Connection<ChatReport>> {
        actor.require_admin()?;
        let query = ReportQuery {
            author_id: None,
            filter: args.filter.clone(),
        };
        self.list_page(query, &args).await
    }

    /// Set the handling state and memo of a report. Admin only.
    #[instrument(skip(self, input))]
    pub async fn update_report_for_admin(
        &self,
        id: ReportId,
        input: AdminReportUpdateInput,
        actor: Actor,
    ) -> ChatResult<ChatReport> {
        actor.require_admin()?;
        input.validate().map_err(validation_error)?;
        let report = self.find(id).await?;

        let patch = ReportPatch::from(input);
        if patch.is_empty() {
            return Ok(report);
        }
        let updated = self.patch(id, patch).await?;
        info!(report_id = id, state = %updated.state, "Chat report handled");
        Ok(updated)
    }

    async fn find(&self, id: ReportId) -> ChatResult<ChatReport> {
        self.store
            .find_report(id)
            .await?
            .ok_or_else(|| ChatError::not_found("Report"))
    }

    /// Other users' reports are reported as missing.
    fn owned(&self, report: ChatReport, actor: Actor) -> ChatResult<ChatReport> {
        if report.author_id != actor.id {
            return Err(ChatError::not_found("Report"));
        }
        Ok(report)
    }

    async fn patch(&self, id: ReportId, patch: ReportPatch) -> ChatResult<ChatReport> {
        self.store
            .update_report(id, patch, clock::now())
            .await?
            .ok_or_else(|| ChatError::not_found("Report"))
    }

    async fn list_page(&self, query: ReportQuery, args: &ReportListArgs) -> ChatResult<Connection<ChatReport>> {
        let keyset = args.page.validate::<ReportSortKey>(self.default_page_size)?;
        let rows = self.store.find_report_page(&query, &keyset).await?;
        let mut connection = build_connection(rows, &keyset, ReportSortKey::of)?;
        if args.page.include_total_count {
            connection.total_count = Some(self.store.count_reports(&query).await?);
        }
        Ok(connection)
    }
}
