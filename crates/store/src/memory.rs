use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use porter_core::{AuditEvent, ChecksumRecord, TransferJob, TransferStatus, WatchDetection};
use tokio::sync::RwLock;

use crate::{StoreError, TransferStore};

#[derive(Default)]
struct Tables {
    next_job_id: i64,
    next_detection_id: i64,
    jobs: BTreeMap<i64, TransferJob>,
    checksums: Vec<ChecksumRecord>,
    audits: Vec<AuditEvent>,
    detections: Vec<WatchDetection>,
    processed: HashMap<i64, BTreeSet<PathBuf>>,
}

/// In-memory [`TransferStore`] for single-process deployments and tests.
///
/// Reads and writes are serialized by one `RwLock`, which is the only
/// consistency guarantee the engine relies on.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransferStore for MemoryStore {
    async fn create_job(&self, mut job: TransferJob) -> Result<TransferJob, StoreError> {
        let mut tables = self.tables.write().await;
        tables.next_job_id += 1;
        job.id = tables.next_job_id;
        tables.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: i64) -> Result<Option<TransferJob>, StoreError> {
        Ok(self.tables.read().await.jobs.get(&id).cloned())
    }

    async fn update_job(&self, job: &TransferJob) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        match tables.jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(job.id)),
        }
    }

    async fn list_jobs_by_status(
        &self,
        status: TransferStatus,
    ) -> Result<Vec<TransferJob>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .jobs
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect())
    }

    async fn delete_job(&self, id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.jobs.remove(&id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        tables.checksums.retain(|c| c.transfer_id != id);
        tables.audits.retain(|a| a.transfer_id != id);
        tables.detections.retain(|d| d.transfer_id != id);
        tables.processed.remove(&id);
        Ok(())
    }

    async fn append_checksum(&self, record: ChecksumRecord) -> Result<(), StoreError> {
        self.tables.write().await.checksums.push(record);
        Ok(())
    }

    async fn checksums_for(&self, transfer_id: i64) -> Result<Vec<ChecksumRecord>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .checksums
            .iter()
            .filter(|c| c.transfer_id == transfer_id)
            .cloned()
            .collect())
    }

    async fn append_audit(&self, event: AuditEvent) -> Result<(), StoreError> {
        self.tables.write().await.audits.push(event);
        Ok(())
    }

    async fn audit_for(&self, transfer_id: i64) -> Result<Vec<AuditEvent>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .audits
            .iter()
            .filter(|a| a.transfer_id == transfer_id)
            .cloned()
            .collect())
    }

    async fn append_detection(
        &self,
        mut detection: WatchDetection,
    ) -> Result<WatchDetection, StoreError> {
        let mut tables = self.tables.write().await;
        tables.next_detection_id += 1;
        detection.id = tables.next_detection_id;
        tables.detections.push(detection.clone());
        Ok(detection)
    }

    async fn update_detection(&self, detection: &WatchDetection) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        match tables.detections.iter_mut().find(|d| d.id == detection.id) {
            Some(slot) => {
                *slot = detection.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(detection.id)),
        }
    }

    async fn detections_for(&self, transfer_id: i64) -> Result<Vec<WatchDetection>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .detections
            .iter()
            .filter(|d| d.transfer_id == transfer_id)
            .cloned()
            .collect())
    }

    async fn processed_files(&self, transfer_id: i64) -> Result<BTreeSet<PathBuf>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .processed
            .get(&transfer_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_processed_files(
        &self,
        transfer_id: i64,
        files: BTreeSet<PathBuf>,
    ) -> Result<(), StoreError> {
        self.tables.write().await.processed.insert(transfer_id, files);
        Ok(())
    }
}
