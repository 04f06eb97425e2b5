//! Postgres transaction handle.
//!
//! The chat stores hand a [`TransactionContext`] to callers as their
//! `UnitOfWork::Tx`, so several logic calls can share one transaction.

use std::time::Instant;

use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use crate::infrastructure::metrics;
use crate::shared::error::ChatResult;

/// Transaction context that wraps a SQLx transaction.
pub struct TransactionContext {
    tx: Transaction<'static, Postgres>,
    started: Instant,
}

impl TransactionContext {
    /// Begin a transaction on the pool.
    pub async fn begin(pool: &PgPool) -> ChatResult<Self> {
        let tx = pool.begin().await?;
        Ok(Self {
            tx,
            started: Instant::now(),
        })
    }

    /// Connection to run queries on inside the transaction.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// Commit the transaction, recording its duration.
    pub async fn commit(self) -> ChatResult<()> {
        self.tx.commit().await?;
        metrics::record_transaction("postgres", self.started.elapsed().as_secs_f64());
        Ok(())
    }

    /// Roll back explicitly. Dropping the context has the same effect.
    pub async fn rollback(self) -> ChatResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
