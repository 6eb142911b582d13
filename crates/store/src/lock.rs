use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::time::Instant;

use crate::StoreError;

/// Per-transfer exclusive lock guarding MOVE-mode destructive steps.
///
/// Mutual exclusion only: two executions racing on the same transfer id
/// serialize, and the loser fails fast after the bounded wait. No
/// ordering guarantee beyond that. COPY transfers never acquire it.
#[async_trait]
pub trait TransferLock: Send + Sync {
    /// Attempts to take the lock, waiting at most `timeout`.
    /// Returns `false` when the wait elapsed without acquisition.
    async fn acquire(&self, transfer_id: i64, timeout: Duration) -> Result<bool, StoreError>;
    async fn release(&self, transfer_id: i64) -> Result<(), StoreError>;
}

/// Always-succeeds lock for single-process backends.
///
/// Embedded deployments run one worker process; there is nothing to
/// exclude across, so contention handling would be dead weight.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLock;

#[async_trait]
impl TransferLock for NoopLock {
    async fn acquire(&self, _transfer_id: i64, _timeout: Duration) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn release(&self, _transfer_id: i64) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Cross-process exclusive lock backed by Postgres advisory locks,
/// keyed directly on the transfer id.
pub struct PgAdvisoryLock {
    pool: PgPool,
    retry_interval: Duration,
}

impl PgAdvisoryLock {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry_interval: Duration::from_millis(250),
        }
    }
}

#[async_trait]
impl TransferLock for PgAdvisoryLock {
    async fn acquire(&self, transfer_id: i64, timeout: Duration) -> Result<bool, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            let (locked,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
                .bind(transfer_id)
                .fetch_one(&self.pool)
                .await?;
            if locked {
                tracing::debug!(transfer_id, "advisory lock acquired");
                return Ok(true);
            }
            if Instant::now() + self.retry_interval > deadline {
                tracing::warn!(transfer_id, "advisory lock wait timed out");
                return Ok(false);
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    async fn release(&self, transfer_id: i64) -> Result<(), StoreError> {
        let (released,): (bool,) = sqlx::query_as("SELECT pg_advisory_unlock($1)")
            .bind(transfer_id)
            .fetch_one(&self.pool)
            .await?;
        if !released {
            tracing::warn!(transfer_id, "advisory unlock had nothing to release");
        }
        Ok(())
    }
}
