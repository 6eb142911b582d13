//! Transfer orchestration.
//!
//! The [`Orchestrator`] drives one transfer at a time through validation,
//! optional packaging, verified copying and (for MOVE) source deletion,
//! persisting every state change through the store contract. The
//! continuous watch loop detects newly-arrived files in a monitored
//! folder and spawns an independent child transfer per file, guarded by a
//! circuit breaker.

mod direct;
mod executor;
mod orchestrator;
mod plan;
mod watch_loop;

pub use direct::{DirectStats, run_direct};
pub use executor::{
    CONTINUOUS_WATCH_JOB, Executor, JobHandle, JobSpec, TRANSFER_JOB, TokioExecutor,
    WATCH_TRANSFER_JOB,
};
pub use orchestrator::Orchestrator;
pub use plan::{TransferPlan, TransferStrategy, plan};
pub use watch_loop::{StopReason, WatchOutcome};

use std::path::PathBuf;

use porter_core::TransferStatus;

/// Errors produced while orchestrating transfers.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("path validation failed: {0}")]
    Path(#[from] porter_paths::PathError),

    #[error("transfer failed: {0}")]
    Transfer(#[from] porter_transfer::TransferError),

    #[error("archive failed: {0}")]
    Archive(#[from] porter_archive::ArchiveError),

    #[error("watch failed: {0}")]
    Watch(#[from] porter_watch::WatchError),

    #[error("store failed: {0}")]
    Store(#[from] porter_store::StoreError),

    #[error("transfer {0} not found")]
    NotFound(i64),

    #[error("transfer {transfer_id} is not processable (status: {status:?})")]
    InvalidState {
        transfer_id: i64,
        status: TransferStatus,
    },

    #[error("could not acquire move lock for transfer {0} within the bounded wait")]
    LockTimeout(i64),

    #[error("folder never stabilized: {0}")]
    WatchTimeout(PathBuf),

    #[error("transfer {0} was cancelled")]
    Cancelled(i64),

    #[error("job for transfer {0} exceeded its timeout")]
    JobTimeout(i64),

    #[error("background task failed: {0}")]
    Task(String),
}
