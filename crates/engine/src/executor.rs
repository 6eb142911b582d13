use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::EngineError;

/// Timeout and retention profile for a plain transfer job. Sized for
/// multi-hundred-gigabyte files.
pub const TRANSFER_JOB: JobSpec = JobSpec {
    timeout: Duration::from_secs(7_200),
    result_retention: Duration::from_secs(86_400),
    failure_retention: Duration::from_secs(86_400),
};

/// Profile for a one-shot watch followed by a transfer.
pub const WATCH_TRANSFER_JOB: JobSpec = JobSpec {
    timeout: Duration::from_secs(10_800),
    result_retention: Duration::from_secs(86_400),
    failure_retention: Duration::from_secs(86_400),
};

/// Profile for the continuous watch loop, which is expected to run for
/// most of a day before its own circuit breaker stops it.
pub const CONTINUOUS_WATCH_JOB: JobSpec = JobSpec {
    timeout: Duration::from_secs(86_400),
    result_retention: Duration::from_secs(500),
    failure_retention: Duration::from_secs(86_400),
};

/// How long a unit of work may run and how long its outcome should be
/// kept around by the backing queue.
#[derive(Debug, Clone, Copy)]
pub struct JobSpec {
    pub timeout: Duration,
    pub result_retention: Duration,
    pub failure_retention: Duration,
}

pub type JobFuture = Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send>>;

/// Handle to an enqueued unit of work.
pub struct JobHandle {
    pub id: u64,
    pub transfer_id: i64,
    handle: tokio::task::JoinHandle<Result<(), EngineError>>,
}

impl JobHandle {
    /// Waits for the work to finish and returns its outcome.
    pub async fn join(self) -> Result<(), EngineError> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) => Err(EngineError::Task(err.to_string())),
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Hands units of work off for asynchronous execution with a timeout.
///
/// Scheduling and retry mechanics belong to the backing queue, not to the
/// engine; this contract is the whole boundary.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn enqueue(
        &self,
        spec: JobSpec,
        transfer_id: i64,
        work: JobFuture,
    ) -> Result<JobHandle, EngineError>;
}

/// In-process executor running work on the tokio runtime.
#[derive(Debug, Default)]
pub struct TokioExecutor {
    next_id: AtomicU64,
}

impl TokioExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Executor for TokioExecutor {
    async fn enqueue(
        &self,
        spec: JobSpec,
        transfer_id: i64,
        work: JobFuture,
    ) -> Result<JobHandle, EngineError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            job_id = id,
            transfer_id,
            timeout_secs = spec.timeout.as_secs(),
            "job enqueued"
        );

        let handle = tokio::spawn(async move {
            match tokio::time::timeout(spec.timeout, work).await {
                Ok(result) => {
                    if let Err(err) = &result {
                        tracing::warn!(job_id = id, transfer_id, error = %err, "job failed");
                    }
                    result
                }
                Err(_) => {
                    tracing::error!(job_id = id, transfer_id, "job timed out");
                    Err(EngineError::JobTimeout(transfer_id))
                }
            }
        });

        Ok(JobHandle {
            id,
            transfer_id,
            handle,
        })
    }
}
