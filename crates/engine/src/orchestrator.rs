use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use porter_core::{
    AuditEvent, AuditEventKind, ChecksumKind, ChecksumRecord, EngineConfig, OperationMode,
    TransferJob, TransferStatus,
};
use porter_paths::DestinationLayout;
use porter_store::{TransferLock, TransferStore};
use porter_watch::Ticker;
use serde_json::json;

use crate::EngineError;

/// Bounded wait for the MOVE-mode exclusive lock.
const MOVE_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// How often in-flight byte counts are flushed to the store.
const PROGRESS_FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Drives transfers through their state machine.
///
/// One `Orchestrator` serves any number of transfers; each call to
/// [`process`](Self::process) runs a single transfer to a terminal state.
/// All persistence goes through the store contract, and the MOVE lock is
/// released on every exit path.
pub struct Orchestrator {
    store: Arc<dyn TransferStore>,
    lock: Arc<dyn TransferLock>,
    config: Arc<EngineConfig>,
    ticker: Ticker,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn TransferStore>,
        lock: Arc<dyn TransferLock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            lock,
            config,
            ticker: Ticker::new(),
        }
    }

    /// Replaces the ticker, sharing its cancellation token with every
    /// polling loop this orchestrator runs.
    pub fn with_ticker(mut self, ticker: Ticker) -> Self {
        self.ticker = ticker;
        self
    }

    pub fn store(&self) -> &Arc<dyn TransferStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    /// Runs one pending transfer to a terminal state.
    ///
    /// MOVE transfers take the per-transfer lock first and release it in
    /// a guaranteed-cleanup path whatever the outcome; a release failure
    /// is logged but never overrides the transfer's terminal status. Any
    /// mid-flight error triggers a full rollback.
    pub async fn process(&self, transfer_id: i64) -> Result<TransferJob, EngineError> {
        let job = self
            .store
            .get_job(transfer_id)
            .await?
            .ok_or(EngineError::NotFound(transfer_id))?;

        if job.status == TransferStatus::Cancelled {
            tracing::info!(transfer_id, "transfer was cancelled before processing");
            return Err(EngineError::Cancelled(transfer_id));
        }
        if job.status != TransferStatus::Pending {
            return Err(EngineError::InvalidState {
                transfer_id,
                status: job.status,
            });
        }

        let mut lock_held = false;
        if job.mode == OperationMode::Move {
            if !self.lock.acquire(transfer_id, MOVE_LOCK_TIMEOUT).await? {
                let err = EngineError::LockTimeout(transfer_id);
                self.rollback(transfer_id, &err, &[]).await;
                return Err(err);
            }
            lock_held = true;
            // Lock is held from here on: nothing may early-return past the
            // release below, so a failed audit write only logs.
            if let Err(err) = self
                .audit(
                    transfer_id,
                    AuditEventKind::TransferProgress,
                    "exclusive lock acquired for move mode",
                )
                .await
            {
                tracing::warn!(transfer_id, error = %err, "could not audit lock acquisition");
            }
        }

        let mut temp_files: Vec<PathBuf> = Vec::new();
        let result = self.execute(job, &mut temp_files).await;

        if lock_held {
            if let Err(err) = self.lock.release(transfer_id).await {
                tracing::warn!(transfer_id, error = %err, "failed to release move lock");
            }
        }

        match result {
            Ok(job) => Ok(job),
            Err(err) => {
                self.rollback(transfer_id, &err, &temp_files).await;
                Err(err)
            }
        }
    }

    /// One-shot watch: wait for the source folder to stabilize, then run
    /// the transfer. Continuous watch jobs go through the watch loop
    /// instead.
    pub async fn run_watch_then_transfer(
        &self,
        transfer_id: i64,
    ) -> Result<TransferJob, EngineError> {
        let mut job = self
            .store
            .get_job(transfer_id)
            .await?
            .ok_or(EngineError::NotFound(transfer_id))?;

        if let Some(mut watch) = job.watch.clone().filter(|w| !w.continuous) {
            watch.started_at = Some(Utc::now());
            job.watch = Some(watch.clone());
            self.store.update_job(&job).await?;
            self.audit_meta(
                transfer_id,
                AuditEventKind::TransferProgress,
                format!(
                    "watch mode: monitoring folder for stability (settle time: {}s)",
                    watch.settle_time.as_secs()
                ),
                json!({ "settle_time_secs": watch.settle_time.as_secs() }),
            )
            .await?;

            let mut checks = 0u32;
            let stable = porter_watch::wait_until_stable(
                &job.source_path,
                watch.settle_time,
                self.config.stability_max_wait,
                &self.ticker,
                |probe| checks = probe.checks,
            )
            .await?;

            if !stable {
                let err = EngineError::WatchTimeout(job.source_path.clone());
                self.rollback(transfer_id, &err, &[]).await;
                return Err(err);
            }

            watch.triggered_at = Some(Utc::now());
            let watch_duration = watch
                .triggered_at
                .zip(watch.started_at)
                .map(|(end, start)| (end - start).num_seconds())
                .unwrap_or(0);
            job.watch = Some(watch);
            self.store.update_job(&job).await?;
            self.audit_meta(
                transfer_id,
                AuditEventKind::TransferProgress,
                format!("watch mode: folder stable after {watch_duration}s, starting transfer"),
                json!({ "watch_duration_secs": watch_duration, "checks_performed": checks }),
            )
            .await?;
        }

        self.process(transfer_id).await
    }

    async fn execute(
        &self,
        mut job: TransferJob,
        temp_files: &mut Vec<PathBuf>,
    ) -> Result<TransferJob, EngineError> {
        let transfer_id = job.id;

        // Re-validate paths even though the creating surface already did:
        // the record may be old and the filesystem has moved on.
        let (safe_source, safe_dest) =
            porter_paths::validate_pair(&job.source_path, &job.destination_path, &self.config)?;
        job.source_path = safe_source;
        job.destination_path = safe_dest;
        self.store.update_job(&job).await?;
        self.audit(
            transfer_id,
            AuditEventKind::TransferProgress,
            "path security validation passed",
        )
        .await?;

        // Canonical layout and overwrite policy, before anything touches
        // the destination or the temp root.
        let layout = DestinationLayout::resolve(&job.source_path, &job.destination_path);
        layout.assert_overwrite_safe()?;

        let is_folder = layout.is_source_dir;
        if is_folder {
            self.package_folder(&mut job, temp_files).await?;
        } else {
            job.file_size = std::fs::metadata(&job.source_path)
                .map_err(porter_transfer::TransferError::from)?
                .len();
            self.store.update_job(&job).await?;
        }

        let effective_source = job.effective_source().to_path_buf();
        let copy_dest = if is_folder {
            let archive_dest = job.destination_path.join(format!("{}.zip", job.file_name));
            temp_files.push(archive_dest.clone());
            temp_files.push(porter_archive::sidecar_path(&archive_dest));
            archive_dest
        } else {
            layout.target_file()
        };

        // VALIDATING: enough room must remain at the destination.
        job.status = TransferStatus::Validating;
        self.store.update_job(&job).await?;
        self.audit(
            transfer_id,
            AuditEventKind::TransferStarted,
            "starting validation",
        )
        .await?;
        porter_transfer::check_disk_space(&copy_dest, job.file_size, self.config.min_free_percent)?;
        self.audit(
            transfer_id,
            AuditEventKind::TransferProgress,
            format!("disk space validated ({} bytes required)", job.file_size),
        )
        .await?;

        // VERIFYING: source digest.
        job.status = TransferStatus::Verifying;
        job.started_at = Some(Utc::now());
        self.store.update_job(&job).await?;
        self.audit(
            transfer_id,
            AuditEventKind::TransferProgress,
            "calculating source checksum",
        )
        .await?;
        let (source_digest, digest_duration) = self.digest(&effective_source).await?;
        self.store
            .append_checksum(ChecksumRecord::new(
                transfer_id,
                ChecksumKind::Source,
                source_digest.as_str(),
                digest_duration,
            ))
            .await?;
        self.audit_meta(
            transfer_id,
            AuditEventKind::ChecksumCalculated,
            format!("source checksum: {}...", &source_digest[..16]),
            json!({ "checksum": &source_digest, "duration_ms": digest_duration.as_millis() as u64 }),
        )
        .await?;

        self.ensure_not_cancelled(transfer_id).await?;

        // COPYING.
        job.status = TransferStatus::Copying;
        self.store.update_job(&job).await?;
        self.audit(
            transfer_id,
            AuditEventKind::TransferProgress,
            format!("copying {} ({} bytes)", job.file_name, job.file_size),
        )
        .await?;
        let copied = self
            .copy_with_live_progress(&mut job, &effective_source, &copy_dest)
            .await?;
        self.audit(
            transfer_id,
            AuditEventKind::TransferProgress,
            format!("copied {copied} bytes"),
        )
        .await?;

        // VERIFYING: destination digest.
        job.status = TransferStatus::Verifying;
        self.store.update_job(&job).await?;
        self.audit(
            transfer_id,
            AuditEventKind::TransferProgress,
            "calculating destination checksum",
        )
        .await?;
        let (dest_digest, dest_duration) = self.digest(&copy_dest).await?;
        self.store
            .append_checksum(ChecksumRecord::new(
                transfer_id,
                ChecksumKind::Destination,
                dest_digest.as_str(),
                dest_duration,
            ))
            .await?;
        self.audit_meta(
            transfer_id,
            AuditEventKind::ChecksumCalculated,
            format!("destination checksum: {}...", &dest_digest[..16]),
            json!({ "checksum": &dest_digest, "duration_ms": dest_duration.as_millis() as u64 }),
        )
        .await?;

        if dest_digest != source_digest {
            self.audit_meta(
                transfer_id,
                AuditEventKind::Error,
                "checksum mismatch, transfer failed",
                json!({ "source_checksum": &source_digest, "dest_checksum": &dest_digest }),
            )
            .await?;
            return Err(porter_transfer::TransferError::ChecksumMismatch {
                source: source_digest,
                destination: dest_digest,
            }
            .into());
        }

        // FINAL is a confirmation record: the already-proven digest,
        // never a third hash pass.
        self.store
            .append_checksum(ChecksumRecord::new(
                transfer_id,
                ChecksumKind::Final,
                source_digest.as_str(),
                Duration::ZERO,
            ))
            .await?;
        self.audit_meta(
            transfer_id,
            AuditEventKind::ChecksumVerified,
            "source, destination and final checksums agree",
            json!({ "checksum": &source_digest }),
        )
        .await?;

        if is_folder {
            self.unpack_at_destination(&mut job, &layout, &copy_dest, &source_digest, temp_files)
                .await?;
        }

        if job.mode == OperationMode::Move {
            self.ensure_not_cancelled(transfer_id).await?;
            self.delete_source_after_move(&job, &layout, &copy_dest, is_folder)
                .await?;
        }

        // COMPLETED.
        job.status = TransferStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.bytes_transferred = job.file_size;
        job.progress_percent = 100;
        job.updated_at = Utc::now();
        self.store.update_job(&job).await?;

        let duration_secs = job
            .completed_at
            .zip(job.started_at)
            .map(|(end, start)| (end - start).num_milliseconds() as f64 / 1_000.0)
            .unwrap_or(0.0);
        let speed_mbps = if duration_secs > 0.0 {
            (job.file_size as f64 / (1024.0 * 1024.0)) / duration_secs
        } else {
            0.0
        };
        self.audit_meta(
            transfer_id,
            AuditEventKind::TransferCompleted,
            format!("transfer completed in {duration_secs:.1}s ({speed_mbps:.2} MB/s)"),
            json!({
                "duration_seconds": duration_secs,
                "speed_mbps": speed_mbps,
                "file_size": job.file_size,
                "file_count": job.file_count,
                "is_folder_transfer": job.is_folder_transfer,
            }),
        )
        .await?;

        tracing::info!(transfer_id, duration_secs, "transfer completed");
        Ok(job)
    }

    /// Folder detection and packaging: scan the visible tree, record the
    /// counts, and produce the temporary STORE-mode archive that becomes
    /// the effective source.
    async fn package_folder(
        &self,
        job: &mut TransferJob,
        temp_files: &mut Vec<PathBuf>,
    ) -> Result<(), EngineError> {
        let transfer_id = job.id;
        job.is_folder_transfer = true;
        job.original_folder_path = Some(job.source_path.clone());

        let source = job.source_path.clone();
        let config = Arc::clone(&self.config);
        let plan = tokio::task::spawn_blocking(move || crate::plan::plan(&source, &config))
            .await
            .map_err(task_err)??;
        job.file_count = Some(plan.file_count);
        job.file_size = plan.total_bytes;
        self.store.update_job(job).await?;
        self.audit_meta(
            transfer_id,
            AuditEventKind::TransferProgress,
            format!(
                "folder detected: {} files, {} bytes ({:?} plan)",
                plan.file_count, plan.total_bytes, plan.strategy
            ),
            json!({
                "file_count": plan.file_count,
                "total_bytes": plan.total_bytes,
                "strategy": format!("{:?}", plan.strategy),
            }),
        )
        .await?;

        let archive_path = self
            .config
            .temp_root
            .join(format!("porter_{transfer_id}_{}.zip", job.file_name));
        job.archive_path = Some(archive_path.clone());
        self.store.update_job(job).await?;
        temp_files.push(archive_path.clone());
        temp_files.push(porter_archive::sidecar_path(&archive_path));
        self.audit(
            transfer_id,
            AuditEventKind::TransferProgress,
            "packaging folder (store mode, no compression)",
        )
        .await?;

        let limits = porter_archive::PackLimits {
            max_entry_bytes: self.config.max_archive_entry_bytes,
            max_total_bytes: self.config.max_archive_total_bytes,
        };
        let source = job.source_path.clone();
        let archive = archive_path.clone();
        let summary = tokio::task::spawn_blocking(move || {
            porter_archive::pack(&source, &archive, limits, |_, _, _| {})
        })
        .await
        .map_err(task_err)??;

        // The archive is what travels from here on.
        job.file_size = summary.archive_size;
        self.store.update_job(job).await?;
        self.audit(
            transfer_id,
            AuditEventKind::TransferProgress,
            format!("folder packaged: {} entries", summary.file_count),
        )
        .await?;
        Ok(())
    }

    async fn unpack_at_destination(
        &self,
        job: &mut TransferJob,
        layout: &DestinationLayout,
        copy_dest: &Path,
        verified_digest: &str,
        temp_files: &mut Vec<PathBuf>,
    ) -> Result<(), EngineError> {
        let transfer_id = job.id;
        self.audit(
            transfer_id,
            AuditEventKind::TransferProgress,
            "unpacking folder at destination",
        )
        .await?;

        // Sidecar next to the copied archive so extraction re-verifies
        // the digest before trusting the container.
        std::fs::write(porter_archive::sidecar_path(copy_dest), verified_digest)
            .map_err(porter_transfer::TransferError::from)?;

        let archive = copy_dest.to_path_buf();
        let final_root = layout.final_root.clone();
        tokio::task::spawn_blocking(move || {
            porter_archive::unpack(&archive, &final_root, |_, _, _| {})
        })
        .await
        .map_err(task_err)??;

        job.unpack_completed = true;
        self.store.update_job(job).await?;
        self.audit(
            transfer_id,
            AuditEventKind::TransferProgress,
            format!(
                "folder unpacked into {}",
                layout.final_root.display()
            ),
        )
        .await?;

        let mut cleaned = 0usize;
        for file in temp_files.drain(..) {
            if file.exists() && std::fs::remove_file(&file).is_ok() {
                cleaned += 1;
            }
        }
        self.audit(
            transfer_id,
            AuditEventKind::TransferProgress,
            format!("cleaned up {cleaned} temporary archive files"),
        )
        .await?;
        Ok(())
    }

    /// MOVE-mode deletion: prove the destination is actually readable
    /// first, then remove the source. Folder sources keep their node so
    /// a watched directory survives for future cycles.
    async fn delete_source_after_move(
        &self,
        job: &TransferJob,
        layout: &DestinationLayout,
        copy_dest: &Path,
        is_folder: bool,
    ) -> Result<(), EngineError> {
        let transfer_id = job.id;
        self.audit(
            transfer_id,
            AuditEventKind::TransferProgress,
            "move mode: verifying destination is readable before deletion",
        )
        .await?;

        let verify_target = if is_folder {
            layout.final_root.clone()
        } else {
            copy_dest.to_path_buf()
        };
        let expected_size = job.file_size;
        tokio::task::spawn_blocking(move || {
            porter_transfer::verify_destination_readable(&verify_target, is_folder, expected_size)
        })
        .await
        .map_err(task_err)??;
        self.audit(
            transfer_id,
            AuditEventKind::TransferProgress,
            "destination verified readable and intact",
        )
        .await?;

        if is_folder {
            let folder = job
                .original_folder_path
                .as_deref()
                .unwrap_or(&job.source_path);
            delete_folder_contents(folder)?;
        } else {
            std::fs::remove_file(&job.source_path).map_err(porter_transfer::TransferError::from)?;
        }
        self.audit(
            transfer_id,
            AuditEventKind::TransferProgress,
            "source deleted (move mode)",
        )
        .await?;
        Ok(())
    }

    /// Full rollback after a mid-flight error: remove temporary archives,
    /// reload the job fresh, mark it failed and leave an audit trail of
    /// the cleanup.
    async fn rollback(&self, transfer_id: i64, error: &EngineError, temp_files: &[PathBuf]) {
        tracing::error!(transfer_id, error = %error, "transfer failed, rolling back");

        let mut cleaned = 0usize;
        for file in temp_files {
            if !file.exists() {
                continue;
            }
            let removed = if file.is_dir() {
                std::fs::remove_dir_all(file)
            } else {
                std::fs::remove_file(file)
            };
            match removed {
                Ok(()) => cleaned += 1,
                Err(err) => {
                    tracing::warn!(transfer_id, file = %file.display(), error = %err, "could not remove temp file");
                }
            }
        }

        match self.store.get_job(transfer_id).await {
            Ok(Some(mut fresh)) => {
                fresh.mark_failed(error.to_string());
                if let Err(err) = self.store.update_job(&fresh).await {
                    tracing::warn!(transfer_id, error = %err, "could not persist failed status");
                }
                let event = AuditEvent::new(
                    transfer_id,
                    AuditEventKind::Error,
                    format!("transfer failed and rolled back: {error}"),
                )
                .with_metadata(json!({
                    "error": error.to_string(),
                    "rolled_back": true,
                    "temp_files_cleaned": cleaned,
                }));
                if let Err(err) = self.store.append_audit(event).await {
                    tracing::warn!(transfer_id, error = %err, "could not persist rollback audit");
                }
            }
            Ok(None) => {
                tracing::warn!(transfer_id, "job vanished during rollback");
            }
            Err(err) => {
                tracing::warn!(transfer_id, error = %err, "could not reload job during rollback");
            }
        }
    }

    async fn copy_with_live_progress(
        &self,
        job: &mut TransferJob,
        source: &Path,
        dest: &Path,
    ) -> Result<u64, EngineError> {
        let bytes = Arc::new(AtomicU64::new(0));
        let total = job.file_size;
        let chunk = self.config.copy_chunk_bytes;
        let src = source.to_path_buf();
        let dst = dest.to_path_buf();
        let counter = Arc::clone(&bytes);
        let mut copy_task = tokio::task::spawn_blocking(move || {
            porter_transfer::copy_with_progress(&src, &dst, chunk, |done, _| {
                counter.store(done, Ordering::Relaxed);
            })
        });

        let mut interval = tokio::time::interval(PROGRESS_FLUSH_INTERVAL);
        interval.tick().await;
        let copied = loop {
            tokio::select! {
                result = &mut copy_task => {
                    break result.map_err(task_err)??;
                }
                _ = interval.tick() => {
                    job.set_progress(bytes.load(Ordering::Relaxed), total);
                    if let Err(err) = self.store.update_job(job).await {
                        tracing::warn!(transfer_id = job.id, error = %err, "progress flush failed");
                    }
                }
            }
        };

        job.set_progress(copied, total.max(copied));
        self.store.update_job(job).await?;
        Ok(copied)
    }

    async fn digest(&self, path: &Path) -> Result<(String, Duration), EngineError> {
        let chunk = self.config.digest_chunk_bytes;
        let path = path.to_path_buf();
        let start = Instant::now();
        let digest = tokio::task::spawn_blocking(move || {
            porter_transfer::file_digest_with_progress(&path, chunk, |_, _| {})
        })
        .await
        .map_err(task_err)??;
        Ok((digest, start.elapsed()))
    }

    /// Cooperative cancellation: observed between states, never by
    /// interrupting work already in flight.
    async fn ensure_not_cancelled(&self, transfer_id: i64) -> Result<(), EngineError> {
        match self.store.get_job(transfer_id).await? {
            Some(job) if job.status == TransferStatus::Cancelled => {
                Err(EngineError::Cancelled(transfer_id))
            }
            Some(_) => Ok(()),
            None => Err(EngineError::NotFound(transfer_id)),
        }
    }

    pub(crate) async fn audit(
        &self,
        transfer_id: i64,
        kind: AuditEventKind,
        message: impl Into<String>,
    ) -> Result<(), EngineError> {
        self.store
            .append_audit(AuditEvent::new(transfer_id, kind, message))
            .await?;
        Ok(())
    }

    pub(crate) async fn audit_meta(
        &self,
        transfer_id: i64,
        kind: AuditEventKind,
        message: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Result<(), EngineError> {
        self.store
            .append_audit(AuditEvent::new(transfer_id, kind, message).with_metadata(metadata))
            .await?;
        Ok(())
    }
}

fn delete_folder_contents(folder: &Path) -> Result<(), EngineError> {
    for entry in std::fs::read_dir(folder).map_err(porter_transfer::TransferError::from)? {
        let entry = entry.map_err(porter_transfer::TransferError::from)?;
        let path = entry.path();
        let removed = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        removed.map_err(porter_transfer::TransferError::from)?;
    }
    Ok(())
}

pub(crate) fn task_err(err: tokio::task::JoinError) -> EngineError {
    EngineError::Task(err.to_string())
}
