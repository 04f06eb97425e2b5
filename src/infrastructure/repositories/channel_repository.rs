//! Channel Repository Implementation
//!
//! PostgreSQL implementation of the ChannelStore trait: channels,
//! participants, per-user pins and read cursors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};

use super::chat_store::PgChatStore;
use crate::domain::{
    Channel, ChannelId, ChannelPatch, ChannelQuery, ChannelSortKey, ChannelState, ChannelStore,
    DirectPair, Keyset, ListedChannel, NewChannel, Participant, UserId,
};
use crate::infrastructure::database::TransactionContext;
use crate::shared::error::{ChatError, ChatResult};

const CHANNEL_COLUMNS: &str =
    "id, state, is_visible, target_id, creator_id, dm_low_id, dm_high_id, created_at, updated_at";

const LISTED_CHANNEL_COLUMNS: &str = "c.id, c.state, c.is_visible, c.target_id, c.creator_id, \
     c.dm_low_id, c.dm_high_id, c.created_at, c.updated_at";

/// Partial unique index: one ACTIVE channel per target and direct pair.
const ACTIVE_PAIR_INDEX_SUFFIX: &str = "_active_pair_key";

/// Advisory lock key shared by both parties of a DM request.
fn target_pair_lock_key(channels_table: &str, target_id: &str, pair: DirectPair) -> String {
    format!("{}:{}:{}:{}", channels_table, target_id, pair.low, pair.high)
}

fn map_channel_conflict(e: sqlx::Error, id: ChannelId) -> ChatError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            match db_err.constraint() {
                Some(name) if name.ends_with(ACTIVE_PAIR_INDEX_SUFFIX) => {
                    ChatError::bad_input("An active channel already exists for this target")
                }
                _ => ChatError::Internal(format!("Channel id {} already exists", id)),
            }
        }
        _ => ChatError::Database(e),
    }
}

const PARTICIPANT_COLUMNS: &str = "channel_id, user_id, joined_at, last_read_at";

/// Database row representation of the channels table.
#[derive(Debug, sqlx::FromRow)]
struct ChannelRow {
    id: i64,
    state: String,
    is_visible: bool,
    target_id: Option<String>,
    creator_id: Option<i64>,
    dm_low_id: Option<i64>,
    dm_high_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ChannelRow {
    fn into_channel(self) -> Channel {
        Channel {
            id: self.id,
            state: ChannelState::from_str(&self.state),
            is_visible: self.is_visible,
            target_id: self.target_id,
            creator_id: self.creator_id,
            direct_pair: match (self.dm_low_id, self.dm_high_id) {
                (Some(low), Some(high)) => Some(DirectPair { low, high }),
                _ => None,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Channel row joined with the listing user's pin.
#[derive(Debug, sqlx::FromRow)]
struct ListedChannelRow {
    #[sqlx(flatten)]
    channel: ChannelRow,
    pinned_at: Option<DateTime<Utc>>,
}

impl ListedChannelRow {
    fn into_listed(self) -> ListedChannel<Channel> {
        ListedChannel {
            channel: self.channel.into_channel(),
            pinned_at: self.pinned_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ParticipantRow {
    channel_id: i64,
    user_id: i64,
    joined_at: DateTime<Utc>,
    last_read_at: Option<DateTime<Utc>>,
}

impl ParticipantRow {
    fn into_participant(self) -> Participant {
        Participant {
            channel_id: self.channel_id,
            user_id: self.user_id,
            joined_at: self.joined_at,
            last_read_at: self.last_read_at,
        }
    }
}

impl PgChatStore {
    /// Pin time expression of a listing; admin listings have no pins.
    fn pin_expr(query: &ChannelQuery) -> &'static str {
        if query.member_id.is_some() {
            "pin.pinned_at"
        } else {
            "NULL::timestamptz"
        }
    }

    /// Push `FROM ... WHERE ...` of a channel listing.
    fn push_channel_listing<'a>(&self, qb: &mut QueryBuilder<'a, Postgres>, query: &'a ChannelQuery) {
        qb.push(" FROM ").push(&self.tables.channels).push(" c");

        if let Some(member_id) = query.member_id {
            qb.push(" JOIN ")
                .push(&self.tables.participants)
                .push(" p ON p.channel_id = c.id AND p.user_id = ")
                .push_bind(member_id);
            qb.push(" LEFT JOIN ")
                .push(&self.tables.pins)
                .push(" pin ON pin.channel_id = c.id AND pin.user_id = ")
                .push_bind(member_id);
        }

        qb.push(" WHERE TRUE");

        let filter = &query.filter;
        if let Some(state) = filter.state {
            qb.push(" AND c.state = ").push_bind(state.as_str());
        }
        if let Some(target_id) = filter.target_id.as_deref() {
            qb.push(" AND c.target_id = ").push_bind(target_id);
        }
        if let Some(is_visible) = filter.is_visible {
            qb.push(" AND c.is_visible = ").push_bind(is_visible);
        }
        if let Some(after) = filter.created_after {
            qb.push(" AND c.created_at > ").push_bind(after);
        }
        if let Some(before) = filter.created_before {
            qb.push(" AND c.created_at < ").push_bind(before);
        }
    }
}

#[async_trait]
impl ChannelStore for PgChatStore {
    type Channel = Channel;

    async fn find_channel(&self, id: ChannelId) -> ChatResult<Option<Channel>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            CHANNEL_COLUMNS, self.tables.channels
        );
        let row = sqlx::query_as::<_, ChannelRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.into_channel()))
    }

    async fn find_participant(&self, channel_id: ChannelId, user_id: UserId) -> ChatResult<Option<Participant>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE channel_id = $1 AND user_id = $2",
            PARTICIPANT_COLUMNS, self.tables.participants
        );
        let row = sqlx::query_as::<_, ParticipantRow>(&sql)
            .bind(channel_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.into_participant()))
    }

    async fn find_participants(&self, channel_id: ChannelId) -> ChatResult<Vec<Participant>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE channel_id = $1 ORDER BY joined_at ASC, user_id ASC",
            PARTICIPANT_COLUMNS, self.tables.participants
        );
        let rows = sqlx::query_as::<_, ParticipantRow>(&sql)
            .bind(channel_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.into_participant()).collect())
    }

    async fn find_channel_page(
        &self,
        query: &ChannelQuery,
        keyset: &Keyset<ChannelSortKey>,
    ) -> ChatResult<Vec<ListedChannel<Channel>>> {
        let pin = Self::pin_expr(query);
        let sort = format!("COALESCE({}, 'epoch'::timestamptz)", pin);
        let ascending = keyset.scans_ascending(true);
        let (op, dir) = if ascending { (">", "ASC") } else { ("<", "DESC") };

        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(LISTED_CHANNEL_COLUMNS)
            .push(", ")
            .push(pin)
            .push(" AS pinned_at");
        self.push_channel_listing(&mut qb, query);

        if let Some(cursor) = &keyset.cursor {
            qb.push(" AND (")
                .push(&sort)
                .push(", c.created_at, c.id) ")
                .push(op)
                .push(" (COALESCE(")
                .push_bind(cursor.pinned_at)
                .push("::timestamptz, 'epoch'::timestamptz), ")
                .push_bind(cursor.created_at)
                .push(", ")
                .push_bind(cursor.id)
                .push(")");
        }

        qb.push(format!(
            " ORDER BY {sort} {dir}, c.created_at {dir}, c.id {dir} LIMIT ",
            sort = sort,
            dir = dir
        ))
        .push_bind(keyset.fetch_limit());

        let rows = qb
            .build_query_as::<ListedChannelRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.into_listed()).collect())
    }

    async fn count_channels(&self, query: &ChannelQuery) -> ChatResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*)");
        self.push_channel_listing(&mut qb, query);

        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn find_pinned_channels(&self, user_id: UserId) -> ChatResult<Vec<ListedChannel<Channel>>> {
        let sql = format!(
            r#"
            SELECT {columns}, pin.pinned_at
            FROM {pins} pin
            JOIN {channels} c ON c.id = pin.channel_id
            JOIN {participants} p ON p.channel_id = pin.channel_id AND p.user_id = pin.user_id
            WHERE pin.user_id = $1
            ORDER BY pin.pinned_at DESC, c.id DESC
            "#,
            columns = LISTED_CHANNEL_COLUMNS,
            pins = self.tables.pins,
            channels = self.tables.channels,
            participants = self.tables.participants,
        );
        let rows = sqlx::query_as::<_, ListedChannelRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.into_listed()).collect())
    }

    async fn set_pin(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
        pinned_at: Option<DateTime<Utc>>,
    ) -> ChatResult<Option<DateTime<Utc>>> {
        match pinned_at {
            Some(at) => {
                // no-op update so the existing pin time comes back
                let sql = format!(
                    r#"
                    INSERT INTO {pins} AS pin (channel_id, user_id, pinned_at)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (channel_id, user_id) DO UPDATE SET pinned_at = pin.pinned_at
                    RETURNING pinned_at
                    "#,
                    pins = self.tables.pins
                );
                let stored = sqlx::query_scalar::<_, DateTime<Utc>>(&sql)
                    .bind(channel_id)
                    .bind(user_id)
                    .bind(at)
                    .fetch_one(&self.pool)
                    .await?;
                Ok(Some(stored))
            }
            None => {
                let sql = format!(
                    "DELETE FROM {} WHERE channel_id = $1 AND user_id = $2",
                    self.tables.pins
                );
                sqlx::query(&sql)
                    .bind(channel_id)
                    .bind(user_id)
                    .execute(&self.pool)
                    .await?;
                Ok(None)
            }
        }
    }

    async fn lock_channel(&self, tx: &mut TransactionContext, id: ChannelId) -> ChatResult<Option<Channel>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1 FOR UPDATE",
            CHANNEL_COLUMNS, self.tables.channels
        );
        let row = sqlx::query_as::<_, ChannelRow>(&sql)
            .bind(id)
            .fetch_optional(tx.conn())
            .await?;

        Ok(row.map(|r| r.into_channel()))
    }

    async fn find_participants_in(&self, tx: &mut TransactionContext, channel_id: ChannelId) -> ChatResult<Vec<Participant>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE channel_id = $1 ORDER BY joined_at ASC, user_id ASC",
            PARTICIPANT_COLUMNS, self.tables.participants
        );
        let rows = sqlx::query_as::<_, ParticipantRow>(&sql)
            .bind(channel_id)
            .fetch_all(tx.conn())
            .await?;

        Ok(rows.into_iter().map(|r| r.into_participant()).collect())
    }

    async fn mark_read(
        &self,
        tx: &mut TransactionContext,
        channel_id: ChannelId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> ChatResult<bool> {
        let sql = format!(
            "UPDATE {} SET last_read_at = $3 WHERE channel_id = $1 AND user_id = $2",
            self.tables.participants
        );
        let result = sqlx::query(&sql)
            .bind(channel_id)
            .bind(user_id)
            .bind(at)
            .execute(tx.conn())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Transaction-scoped advisory lock on `(table, target, low, high)`.
    async fn lock_target_pair(&self, tx: &mut TransactionContext, target_id: &str, pair: DirectPair) -> ChatResult<()> {
        let key = target_pair_lock_key(&self.tables.channels, target_id, pair);
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key)
            .execute(tx.conn())
            .await?;
        Ok(())
    }

    async fn find_target_channels_for_pair(
        &self,
        tx: &mut TransactionContext,
        target_id: &str,
        pair: DirectPair,
    ) -> ChatResult<Vec<Channel>> {
        let sql = format!(
            r#"
            SELECT {columns}
            FROM {channels}
            WHERE target_id = $1 AND dm_low_id = $2 AND dm_high_id = $3
            ORDER BY created_at ASC, id ASC
            FOR UPDATE
            "#,
            columns = CHANNEL_COLUMNS,
            channels = self.tables.channels,
        );
        let rows = sqlx::query_as::<_, ChannelRow>(&sql)
            .bind(target_id)
            .bind(pair.low)
            .bind(pair.high)
            .fetch_all(tx.conn())
            .await?;

        Ok(rows.into_iter().map(|r| r.into_channel()).collect())
    }

    async fn insert_channel(&self, tx: &mut TransactionContext, channel: NewChannel) -> ChatResult<Channel> {
        let sql = format!(
            r#"
            INSERT INTO {} (id, state, is_visible, target_id, creator_id, dm_low_id, dm_high_id, created_at, updated_at)
            VALUES ($1, 'active', $2, $3, $4, $5, $6, $7, $7)
            RETURNING {}
            "#,
            self.tables.channels, CHANNEL_COLUMNS
        );
        let row = sqlx::query_as::<_, ChannelRow>(&sql)
            .bind(channel.id)
            .bind(channel.is_visible)
            .bind(&channel.target_id)
            .bind(channel.creator_id)
            .bind(channel.direct_pair.map(|p| p.low))
            .bind(channel.direct_pair.map(|p| p.high))
            .bind(channel.created_at)
            .fetch_one(tx.conn())
            .await
            .map_err(|e| map_channel_conflict(e, channel.id))?;

        Ok(row.into_channel())
    }

    async fn update_channel(
        &self,
        tx: &mut TransactionContext,
        id: ChannelId,
        patch: ChannelPatch,
        at: DateTime<Utc>,
    ) -> ChatResult<Option<Channel>> {
        let sql = format!(
            r#"
            UPDATE {}
            SET state = COALESCE($2, state),
                target_id = COALESCE($3, target_id),
                is_visible = COALESCE($4, is_visible),
                updated_at = $5
            WHERE id = $1
            RETURNING {}
            "#,
            self.tables.channels, CHANNEL_COLUMNS
        );
        let row = sqlx::query_as::<_, ChannelRow>(&sql)
            .bind(id)
            .bind(patch.state.map(|s| s.as_str()))
            .bind(patch.target_id)
            .bind(patch.is_visible)
            .bind(at)
            .fetch_optional(tx.conn())
            .await
            .map_err(|e| map_channel_conflict(e, id))?;

        Ok(row.map(|r| r.into_channel()))
    }

    async fn deactivate_target_channels(
        &self,
        tx: &mut TransactionContext,
        target_id: &str,
        keep: ChannelId,
        at: DateTime<Utc>,
    ) -> ChatResult<Vec<Channel>> {
        let sql = format!(
            r#"
            WITH updated AS (
                UPDATE {channels}
                SET state = 'inactive', updated_at = $3
                WHERE target_id = $1 AND id <> $2 AND state = 'active'
                RETURNING {columns}
            )
            SELECT {columns} FROM updated ORDER BY created_at ASC, id ASC
            "#,
            channels = self.tables.channels,
            columns = CHANNEL_COLUMNS,
        );
        let rows = sqlx::query_as::<_, ChannelRow>(&sql)
            .bind(target_id)
            .bind(keep)
            .bind(at)
            .fetch_all(tx.conn())
            .await?;

        Ok(rows.into_iter().map(|r| r.into_channel()).collect())
    }

    async fn add_participants(
        &self,
        tx: &mut TransactionContext,
        channel_id: ChannelId,
        user_ids: &[UserId],
        joined_at: DateTime<Utc>,
    ) -> ChatResult<Vec<Participant>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            INSERT INTO {} (channel_id, user_id, joined_at)
            SELECT $1, u, $3 FROM UNNEST($2::BIGINT[]) AS u
            ON CONFLICT (channel_id, user_id) DO NOTHING
            RETURNING {}
            "#,
            self.tables.participants, PARTICIPANT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ParticipantRow>(&sql)
            .bind(channel_id)
            .bind(user_ids)
            .bind(joined_at)
            .fetch_all(tx.conn())
            .await?;

        Ok(rows.into_iter().map(|r| r.into_participant()).collect())
    }

    async fn remove_participant(&self, tx: &mut TransactionContext, channel_id: ChannelId, user_id: UserId) -> ChatResult<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE channel_id = $1 AND user_id = $2",
            self.tables.participants
        );
        let result = sqlx::query(&sql)
            .bind(channel_id)
            .bind(user_id)
            .execute(tx.conn())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
