use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether the source survives a successful transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    /// Preserve the original after a verified copy.
    Copy,
    /// Delete the original after a verified copy.
    Move,
}

/// Lifecycle states of a transfer job.
///
/// `Cancelled` is reachable from any active state by external request;
/// everything else follows the orchestrator's pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Validating,
    Copying,
    Verifying,
    Completed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    /// True for states a running transfer can still be observed in.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TransferStatus::Pending
                | TransferStatus::Validating
                | TransferStatus::Copying
                | TransferStatus::Verifying
        )
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

/// Watch configuration attached to a job when folder monitoring is requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Keep scanning for new files after the first batch (continuous mode)
    /// instead of a one-shot wait-until-stable.
    pub continuous: bool,
    /// How long the folder (or an individual file) must stay unchanged
    /// before it counts as stable.
    pub settle_time: Duration,
    pub started_at: Option<DateTime<Utc>>,
    pub triggered_at: Option<DateTime<Utc>>,
    /// Completed cycles of the continuous loop.
    pub cycle_count: u64,
}

impl WatchSettings {
    pub fn one_shot(settle_time: Duration) -> Self {
        Self {
            continuous: false,
            settle_time,
            started_at: None,
            triggered_at: None,
            cycle_count: 0,
        }
    }

    pub fn continuous(settle_time: Duration) -> Self {
        Self {
            continuous: true,
            ..Self::one_shot(settle_time)
        }
    }
}

/// A single unit of transfer work.
///
/// Created by the triggering surface (API or CLI), then exclusively mutated
/// by the orchestrator or the continuous watch loop while processing. Jobs
/// are never deleted mid-flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferJob {
    pub id: i64,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub file_name: String,
    pub mode: OperationMode,
    pub status: TransferStatus,

    pub file_size: u64,
    pub bytes_transferred: u64,
    pub progress_percent: u8,

    pub error_message: Option<String>,
    pub retry_count: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    // Folder transfers: the source is packaged into a temporary archive and
    // the archive becomes the effective source for copy and verification.
    pub is_folder_transfer: bool,
    pub original_folder_path: Option<PathBuf>,
    pub archive_path: Option<PathBuf>,
    pub file_count: Option<u64>,
    pub unpack_completed: bool,

    /// Present when the job watches its source folder before transferring.
    pub watch: Option<WatchSettings>,
}

impl TransferJob {
    pub fn new(
        id: i64,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        mode: OperationMode,
    ) -> Self {
        let source_path: PathBuf = source.into();
        let file_name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let now = Utc::now();
        Self {
            id,
            source_path,
            destination_path: destination.into(),
            file_name,
            mode,
            status: TransferStatus::Pending,
            file_size: 0,
            bytes_transferred: 0,
            progress_percent: 0,
            error_message: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            is_folder_transfer: false,
            original_folder_path: None,
            archive_path: None,
            file_count: None,
            unpack_completed: false,
            watch: None,
        }
    }

    pub fn with_watch(mut self, watch: WatchSettings) -> Self {
        self.watch = Some(watch);
        self
    }

    pub fn watch_enabled(&self) -> bool {
        self.watch.is_some()
    }

    pub fn watch_continuous(&self) -> bool {
        self.watch.as_ref().is_some_and(|w| w.continuous)
    }

    /// The path checksummed and copied: the temporary archive for folder
    /// transfers, the source itself otherwise.
    pub fn effective_source(&self) -> &Path {
        self.archive_path.as_deref().unwrap_or(&self.source_path)
    }

    pub fn set_progress(&mut self, bytes_done: u64, total: u64) {
        self.bytes_transferred = bytes_done;
        self.progress_percent = if total == 0 {
            100
        } else {
            ((bytes_done.saturating_mul(100)) / total).min(100) as u8
        };
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = TransferStatus::Failed;
        self.error_message = Some(message.into());
        self.retry_count += 1;
        self.updated_at = Utc::now();
    }
}
