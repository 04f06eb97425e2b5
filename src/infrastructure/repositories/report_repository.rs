//! Report Repository Implementation
//!
//! PostgreSQL implementation of the ReportStore trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};

use super::chat_store::PgChatStore;
use crate::domain::{
    ChatReport, Keyset, NewReport, ReportId, ReportPatch, ReportQuery, ReportSortKey, ReportState,
    ReportStore, ReportTargetKind,
};
use crate::shared::error::ChatResult;

const REPORT_COLUMNS: &str = "id, author_id, target_kind, target_id, category, content, etc, \
     admin_memo, state, created_at, updated_at";

/// Database row representation of the reports table.
#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    id: i64,
    author_id: i64,
    target_kind: String,
    target_id: i64,
    category: String,
    content: String,
    etc: Option<String>,
    admin_memo: Option<String>,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ReportRow {
    fn into_report(self) -> ChatReport {
        ChatReport {
            id: self.id,
            author_id: self.author_id,
            target_kind: ReportTargetKind::from_str(&self.target_kind),
            target_id: self.target_id,
            category: self.category,
            content: self.content,
            etc: self.etc,
            admin_memo: self.admin_memo,
            state: ReportState::from_str(&self.state),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl PgChatStore {
    /// Push `FROM ... WHERE ...` of a report listing.
    fn push_report_listing<'a>(&self, qb: &mut QueryBuilder<'a, Postgres>, query: &'a ReportQuery) {
        qb.push(" FROM ").push(&self.tables.reports).push(" WHERE TRUE");

        if let Some(author_id) = query.author_id {
            qb.push(" AND author_id = ").push_bind(author_id);
        }

        let filter = &query.filter;
        if let Some(states) = &filter.states {
            let states: Vec<&'static str> = states.iter().map(|s| s.as_str()).collect();
            qb.push(" AND state = ANY(").push_bind(states).push(")");
        }
        if let Some(kinds) = &filter.target_kinds {
            let kinds: Vec<&'static str> = kinds.iter().map(|k| k.as_str()).collect();
            qb.push(" AND target_kind = ANY(").push_bind(kinds).push(")");
        }
        if let Some(category) = &filter.category {
            qb.push(" AND category = ").push_bind(category.as_str());
        }
    }
}

#[async_trait]
impl ReportStore for PgChatStore {
    async fn find_report(&self, id: ReportId) -> ChatResult<Option<ChatReport>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            REPORT_COLUMNS, self.tables.reports
        );
        let row = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.into_report()))
    }

    async fn find_report_page(
        &self,
        query: &ReportQuery,
        keyset: &Keyset<ReportSortKey>,
    ) -> ChatResult<Vec<ChatReport>> {
        let ascending = keyset.scans_ascending(true);
        let (op, dir) = if ascending { (">", "ASC") } else { ("<", "DESC") };

        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(REPORT_COLUMNS);
        self.push_report_listing(&mut qb, query);

        if let Some(cursor) = &keyset.cursor {
            qb.push(" AND (created_at, id) ")
                .push(op)
                .push(" (")
                .push_bind(cursor.created_at)
                .push(", ")
                .push_bind(cursor.id)
                .push(")");
        }

        qb.push(format!(" ORDER BY created_at {dir}, id {dir} LIMIT ", dir = dir))
            .push_bind(keyset.fetch_limit());

        let rows = qb
            .build_query_as::<ReportRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.into_report()).collect())
    }

    async fn count_reports(&self, query: &ReportQuery) -> ChatResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*)");
        self.push_report_listing(&mut qb, query);

        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn insert_report(&self, report: NewReport) -> ChatResult<ChatReport> {
        let sql = format!(
            r#"
            INSERT INTO {} (id, author_id, target_kind, target_id, category, content, etc, state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING {}
            "#,
            self.tables.reports, REPORT_COLUMNS
        );
        let row = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(report.id)
            .bind(report.author_id)
            .bind(report.target_kind.as_str())
            .bind(report.target_id)
            .bind(report.category)
            .bind(report.content)
            .bind(report.etc)
            .bind(ReportState::Pending.as_str())
            .bind(report.created_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into_report())
    }

    async fn update_report(
        &self,
        id: ReportId,
        patch: ReportPatch,
        at: DateTime<Utc>,
    ) -> ChatResult<Option<ChatReport>> {
        let sql = format!(
            r#"
            UPDATE {} SET
                category = COALESCE($2, category),
                content = COALESCE($3, content),
                etc = COALESCE($4, etc),
                state = COALESCE($5, state),
                admin_memo = COALESCE($6, admin_memo),
                updated_at = $7
            WHERE id = $1
            RETURNING {}
            "#,
            self.tables.reports, REPORT_COLUMNS
        );
        let row = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(id)
            .bind(patch.category)
            .bind(patch.content)
            .bind(patch.etc)
            .bind(patch.state.map(|s| s.as_str()))
            .bind(patch.admin_memo)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.into_report()))
    }

    async fn delete_report(&self, id: ReportId, state: ReportState) -> ChatResult<Option<ChatReport>> {
        let sql = format!(
            "DELETE FROM {} WHERE id = $1 AND state = $2 RETURNING {}",
            self.tables.reports, REPORT_COLUMNS
        );
        let row = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(id)
            .bind(state.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.into_report()))
    }
}
