use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::TransferStatus;

/// Which leg of the verification chain a checksum belongs to.
///
/// A transfer reaches `Completed` only when all three records carry the
/// same digest. `Final` is a confirmation record written once equality is
/// proven — it is copied from `Source`, never recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumKind {
    Source,
    Destination,
    Final,
}

/// Append-only checksum row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecksumRecord {
    pub transfer_id: i64,
    pub kind: ChecksumKind,
    /// Hex-encoded SHA-256, 64 characters.
    pub value: String,
    pub duration: Duration,
    pub calculated_at: DateTime<Utc>,
}

impl ChecksumRecord {
    pub fn new(transfer_id: i64, kind: ChecksumKind, value: impl Into<String>, duration: Duration) -> Self {
        Self {
            transfer_id,
            kind,
            value: value.into(),
            duration,
            calculated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    TransferCreated,
    TransferStarted,
    TransferProgress,
    ChecksumCalculated,
    ChecksumVerified,
    TransferCompleted,
    TransferFailed,
    TransferCancelled,
    Error,
}

/// Append-only audit row. Never mutated; only removed when its parent job
/// is deleted with cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub transfer_id: i64,
    pub kind: AuditEventKind,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(transfer_id: i64, kind: AuditEventKind, message: impl Into<String>) -> Self {
        Self {
            transfer_id,
            kind,
            message: message.into(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One file discovered by the continuous watch loop under a parent watch job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchDetection {
    pub id: i64,
    /// The parent watch job this detection belongs to.
    pub transfer_id: i64,
    pub file_name: String,
    pub file_path: PathBuf,
    pub file_size: Option<u64>,
    /// The independent child job created to move this file.
    pub child_transfer_id: Option<i64>,
    pub status: TransferStatus,
    pub source_checksum: Option<String>,
    pub destination_checksum: Option<String>,
    pub checksum_match: bool,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub detected_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WatchDetection {
    pub fn new(transfer_id: i64, file_path: impl Into<PathBuf>, file_size: Option<u64>) -> Self {
        let file_path: PathBuf = file_path.into();
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: 0,
            transfer_id,
            file_name,
            file_path,
            file_size,
            child_transfer_id: None,
            status: TransferStatus::Pending,
            source_checksum: None,
            destination_checksum: None,
            checksum_match: false,
            error_message: None,
            retry_count: 0,
            detected_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}
