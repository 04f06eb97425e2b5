//! User block list lookup.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::domain::value_objects::UserId;
use crate::shared::error::ChatResult;

/// Source of "user X blocks user Y" relations, owned by the identity domain.
///
/// Queried on every read and on every delivered real-time message, so the
/// chat views always reflect the current block list.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlockListProvider: Send + Sync {
    /// Users whose messages `user_id` must not see.
    async fn blocked_author_ids(&self, user_id: UserId) -> ChatResult<HashSet<UserId>>;
}
