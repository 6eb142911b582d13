//! Persistence contract, in-memory backend and per-transfer locks.
//!
//! The engine only ever talks to [`TransferStore`] and [`TransferLock`];
//! which implementation backs them is the deployment's choice. The
//! in-memory store covers single-process deployments and every test; the
//! Postgres advisory lock covers multi-worker deployments that need
//! cross-process exclusion for MOVE transfers.

mod contract;
mod lock;
mod memory;

pub use contract::TransferStore;
pub use lock::{NoopLock, PgAdvisoryLock, TransferLock};
pub use memory::MemoryStore;

/// Errors produced by persistence backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transfer {0} not found")]
    NotFound(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("backend error: {0}")]
    Backend(String),
}
