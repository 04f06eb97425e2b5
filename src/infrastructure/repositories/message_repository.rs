//! Message Repository Implementation
//!
//! PostgreSQL implementation of the MessageStore trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};

use super::chat_store::PgChatStore;
use crate::domain::{
    ChannelId, Keyset, Message, MessageId, MessageKind, MessageQuery, MessageSortKey, MessageStore,
    NewMessage, UserId,
};
use crate::infrastructure::database::TransactionContext;
use crate::shared::error::ChatResult;

const MESSAGE_COLUMNS: &str =
    "id, channel_id, author_id, kind, content, payload, created_at, deleted_at";

/// Database row representation of the messages table.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    channel_id: i64,
    author_id: Option<i64>,
    kind: String,
    content: String,
    payload: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl MessageRow {
    fn into_message(self) -> Message {
        Message {
            id: self.id,
            channel_id: self.channel_id,
            author_id: self.author_id,
            kind: MessageKind::from_str(&self.kind),
            content: self.content,
            payload: self.payload,
            created_at: self.created_at,
            deleted_at: self.deleted_at,
        }
    }
}

impl PgChatStore {
    /// Push `FROM ... WHERE ...` of a message listing.
    fn push_message_listing<'a>(&self, qb: &mut QueryBuilder<'a, Postgres>, query: &'a MessageQuery) {
        qb.push(" FROM ").push(&self.tables.messages).push(" WHERE TRUE");

        if let Some(channel_id) = query.channel_id {
            qb.push(" AND channel_id = ").push_bind(channel_id);
        }
        if !query.include_deleted {
            qb.push(" AND deleted_at IS NULL");
        }
        if !query.excluded_authors.is_empty() {
            qb.push(" AND (author_id IS NULL OR author_id <> ALL(")
                .push_bind(query.excluded_authors.as_slice())
                .push("))");
        }

        let filter = &query.filter;
        if let Some(kinds) = &filter.kinds {
            let kinds: Vec<&'static str> = kinds.iter().map(|k| k.as_str()).collect();
            qb.push(" AND kind = ANY(").push_bind(kinds).push(")");
        }
        if let Some(author_id) = filter.author_id {
            qb.push(" AND author_id = ").push_bind(author_id);
        }
        if let Some(after) = filter.created_after {
            qb.push(" AND created_at > ").push_bind(after);
        }
        if let Some(before) = filter.created_before {
            qb.push(" AND created_at < ").push_bind(before);
        }
    }
}

#[async_trait]
impl MessageStore for PgChatStore {
    type Message = Message;

    async fn find_message(&self, id: MessageId) -> ChatResult<Option<Message>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            MESSAGE_COLUMNS, self.tables.messages
        );
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.into_message()))
    }

    async fn find_messages_by_ids(&self, ids: &[MessageId]) -> ChatResult<Vec<Message>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM {} WHERE id = ANY($1) ORDER BY created_at ASC, id ASC",
            MESSAGE_COLUMNS, self.tables.messages
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.into_message()).collect())
    }

    async fn find_message_page(
        &self,
        query: &MessageQuery,
        keyset: &Keyset<MessageSortKey>,
    ) -> ChatResult<Vec<Message>> {
        let ascending = keyset.scans_ascending(query.order.is_descending());
        let (op, dir) = if ascending { (">", "ASC") } else { ("<", "DESC") };

        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(MESSAGE_COLUMNS);
        self.push_message_listing(&mut qb, query);

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
            .build_query_as::<MessageRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.into_message()).collect())
    }

    async fn count_messages(&self, query: &MessageQuery) -> ChatResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*)");
        self.push_message_listing(&mut qb, query);

        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn count_unread(
        &self,
        channel_id: ChannelId,
        since: DateTime<Utc>,
        excluded_authors: &[UserId],
    ) -> ChatResult<i64> {
        let sql = format!(
            r#"
            SELECT COUNT(*) FROM {}
            WHERE channel_id = $1
              AND deleted_at IS NULL
              AND created_at > $2
              AND (author_id IS NULL OR author_id <> ALL($3))
            "#,
            self.tables.messages
        );
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(channel_id)
            .bind(since)
            .bind(excluded_authors)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn find_last_message(&self, channel_id: ChannelId) -> ChatResult<Option<Message>> {
        let sql = format!(
            r#"
            SELECT {} FROM {}
            WHERE channel_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            MESSAGE_COLUMNS, self.tables.messages
        );
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(channel_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.into_message()))
    }

    async fn insert_message(&self, tx: &mut TransactionContext, message: NewMessage) -> ChatResult<Message> {
        let sql = format!(
            r#"
            INSERT INTO {} (id, channel_id, author_id, kind, content, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            self.tables.messages, MESSAGE_COLUMNS
        );
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(message.id)
            .bind(message.channel_id)
            .bind(message.author_id)
            .bind(message.kind.as_str())
            .bind(message.content)
            .bind(message.payload)
            .bind(message.created_at)
            .fetch_one(tx.conn())
            .await?;

        Ok(row.into_message())
    }

    async fn soft_delete_messages(
        &self,
        tx: &mut TransactionContext,
        ids: &[MessageId],
        at: DateTime<Utc>,
    ) -> ChatResult<Vec<Message>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            UPDATE {} SET deleted_at = $2
            WHERE id = ANY($1) AND deleted_at IS NULL
            RETURNING {}
            "#,
            self.tables.messages, MESSAGE_COLUMNS
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(ids)
            .bind(at)
            .fetch_all(tx.conn())
            .await?;

        Ok(rows.into_iter().map(|r| r.into_message()).collect())
    }
}
