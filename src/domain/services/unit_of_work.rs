//! Transaction boundary shared by the chat stores.

use async_trait::async_trait;

use crate::shared::error::ChatResult;

/// A store that can group writes into one atomic unit.
///
/// Dropping a transaction without committing rolls it back, so `?` on an
/// error inside a unit of work is enough to undo it.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Open transaction handle, passed by `&mut` to transactional store methods.
    type Tx: Send;

    async fn begin(&self) -> ChatResult<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> ChatResult<()>;
}
