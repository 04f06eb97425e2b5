//! Postgres chat store
//!
//! One struct backs both the channel and the message store traits so the
//! logic can run channel and message writes in the same transaction.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::UnitOfWork;
use crate::infrastructure::database::TransactionContext;
use crate::shared::error::ChatResult;

/// Fully qualified chat table names for a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTables {
    pub channels: String,
    pub participants: String,
    pub pins: String,
    pub messages: String,
    pub reports: String,
}

impl ChatTables {
    /// `prefix` must be a plain SQL identifier (checked by `ChatSettings::validate`).
    pub fn new(prefix: &str) -> Self {
        Self {
            channels: format!("{}_channels", prefix),
            participants: format!("{}_channel_participants", prefix),
            pins: format!("{}_channel_pins", prefix),
            messages: format!("{}_messages", prefix),
            reports: format!("{}_reports", prefix),
        }
    }
}

impl Default for ChatTables {
    fn default() -> Self {
        Self::new("b_chat")
    }
}

/// PostgreSQL implementation of `ChannelStore`, `MessageStore` and `ReportStore`.
#[derive(Clone)]
pub struct PgChatStore {
    pub(super) pool: PgPool,
    pub(super) tables: ChatTables,
}

impl PgChatStore {
    pub fn new(pool: PgPool, tables: ChatTables) -> Self {
        Self { pool, tables }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn tables(&self) -> &ChatTables {
        &self.tables
    }
}

#[async_trait]
impl UnitOfWork for PgChatStore {
    type Tx = TransactionContext;

    async fn begin(&self) -> ChatResult<TransactionContext> {
        TransactionContext::begin(&self.pool).await
    }

    async fn commit(&self, tx: TransactionContext) -> ChatResult<()> {
        tx.commit().await
    }
}
