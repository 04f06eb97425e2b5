//! Block List Repository Implementation
//!
//! Reads the identity domain's `user_blocks` table.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{BlockListProvider, UserId};
use crate::shared::error::ChatResult;

#[derive(Clone)]
pub struct PgBlockListRepository {
    pool: PgPool,
}

impl PgBlockListRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlockListProvider for PgBlockListRepository {
    async fn blocked_author_ids(&self, user_id: UserId) -> ChatResult<HashSet<UserId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT destination_id
            FROM user_blocks
            WHERE source_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().collect())
    }
}
