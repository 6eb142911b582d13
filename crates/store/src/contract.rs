use std::collections::BTreeSet;
use std::path::PathBuf;

use async_trait::async_trait;
use porter_core::{AuditEvent, ChecksumRecord, TransferJob, TransferStatus, WatchDetection};

use crate::StoreError;

/// What the engine needs from a persistence backend.
///
/// Jobs are created with a placeholder id and come back with one
/// assigned. Checksum records and audit events are append-only. Deleting
/// a job cascades to every row that references it.
#[async_trait]
pub trait TransferStore: Send + Sync {
    async fn create_job(&self, job: TransferJob) -> Result<TransferJob, StoreError>;
    async fn get_job(&self, id: i64) -> Result<Option<TransferJob>, StoreError>;
    async fn update_job(&self, job: &TransferJob) -> Result<(), StoreError>;
    async fn list_jobs_by_status(
        &self,
        status: TransferStatus,
    ) -> Result<Vec<TransferJob>, StoreError>;
    async fn delete_job(&self, id: i64) -> Result<(), StoreError>;

    async fn append_checksum(&self, record: ChecksumRecord) -> Result<(), StoreError>;
    async fn checksums_for(&self, transfer_id: i64) -> Result<Vec<ChecksumRecord>, StoreError>;

    async fn append_audit(&self, event: AuditEvent) -> Result<(), StoreError>;
    async fn audit_for(&self, transfer_id: i64) -> Result<Vec<AuditEvent>, StoreError>;

    async fn append_detection(
        &self,
        detection: WatchDetection,
    ) -> Result<WatchDetection, StoreError>;
    async fn update_detection(&self, detection: &WatchDetection) -> Result<(), StoreError>;
    async fn detections_for(&self, transfer_id: i64) -> Result<Vec<WatchDetection>, StoreError>;

    /// The set of files a continuous watch job has already handled,
    /// keyed by the watch job's id.
    async fn processed_files(&self, transfer_id: i64) -> Result<BTreeSet<PathBuf>, StoreError>;
    async fn set_processed_files(
        &self,
        transfer_id: i64,
        files: BTreeSet<PathBuf>,
    ) -> Result<(), StoreError>;
}
