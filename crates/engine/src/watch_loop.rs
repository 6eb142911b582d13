use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use porter_core::{AuditEventKind, EngineConfig, TransferJob, TransferStatus, WatchDetection};
use serde_json::json;

use crate::EngineError;
use crate::executor::{Executor, TRANSFER_JOB};
use crate::orchestrator::Orchestrator;

/// Why a continuous watch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    BreakerMaxCycles,
    BreakerMaxDuration,
    BreakerErrorRate,
    /// The parent job's continuous flag was cleared.
    Paused,
    /// The parent job no longer exists.
    Deleted,
    Cancelled,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            StopReason::BreakerMaxCycles => "circuit breaker: max cycles reached",
            StopReason::BreakerMaxDuration => "circuit breaker: max duration exceeded",
            StopReason::BreakerErrorRate => "circuit breaker: error rate too high",
            StopReason::Paused => "paused by operator",
            StopReason::Deleted => "watch job deleted",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// Final accounting of a continuous watch run.
#[derive(Debug, Clone, Copy)]
pub struct WatchOutcome {
    pub cycles: u64,
    pub files_detected: u64,
    pub reason: StopReason,
}

/// Loop-termination guard over cycle count, wall time and a sliding
/// error-rate window.
pub(crate) struct CircuitBreaker {
    max_cycles: u64,
    max_duration: Duration,
    window: usize,
    threshold_percent: u8,
    started: Instant,
    cycles: u64,
    history: VecDeque<bool>,
}

impl CircuitBreaker {
    fn new(config: &EngineConfig) -> Self {
        Self::with_limits(
            config.watch_max_cycles,
            config.watch_max_duration,
            config.watch_error_window,
            config.watch_error_threshold_percent,
        )
    }

    fn with_limits(
        max_cycles: u64,
        max_duration: Duration,
        window: usize,
        threshold_percent: u8,
    ) -> Self {
        Self {
            max_cycles,
            max_duration,
            window,
            threshold_percent,
            started: Instant::now(),
            cycles: 0,
            history: VecDeque::new(),
        }
    }

    fn cycles(&self) -> u64 {
        self.cycles
    }

    fn begin_cycle(&mut self) -> u64 {
        self.cycles += 1;
        self.cycles
    }

    fn record(&mut self, error: bool) {
        self.history.push_back(error);
        // Twice the evaluation window bounds memory for unbounded runs.
        while self.history.len() > self.window * 2 {
            self.history.pop_front();
        }
    }

    fn error_rate_percent(&self) -> u8 {
        if self.history.len() < self.window || self.window == 0 {
            return 0;
        }
        let errors = self
            .history
            .iter()
            .rev()
            .take(self.window)
            .filter(|e| **e)
            .count();
        ((errors * 100) / self.window) as u8
    }

    /// Evaluated before any cycle work is done.
    fn check(&self) -> Option<StopReason> {
        if self.cycles >= self.max_cycles {
            return Some(StopReason::BreakerMaxCycles);
        }
        if self.started.elapsed() >= self.max_duration {
            return Some(StopReason::BreakerMaxDuration);
        }
        if self.history.len() >= self.window
            && self.error_rate_percent() >= self.threshold_percent
        {
            return Some(StopReason::BreakerErrorRate);
        }
        None
    }
}

impl Orchestrator {
    /// Unbounded polling loop over a monitored folder.
    ///
    /// Each cycle: breaker conditions first, then the pause/delete
    /// signal, then a scan for files not yet in the processed set. Every
    /// settled new file becomes an independent child transfer handed to
    /// the executor. A cycle that errors is logged and backed off, never
    /// fatal on its own — only the breaker ends the loop.
    pub async fn run_continuous_watch(
        self: &Arc<Self>,
        transfer_id: i64,
        executor: Arc<dyn Executor>,
    ) -> Result<WatchOutcome, EngineError> {
        let mut job = self
            .store()
            .get_job(transfer_id)
            .await?
            .ok_or(EngineError::NotFound(transfer_id))?;
        let Some(mut watch) = job.watch.clone() else {
            return Err(EngineError::InvalidState {
                transfer_id,
                status: job.status,
            });
        };

        watch.continuous = true;
        watch.started_at = Some(Utc::now());
        job.watch = Some(watch.clone());
        self.store().update_job(&job).await?;
        self.audit_meta(
            transfer_id,
            AuditEventKind::TransferProgress,
            format!(
                "continuous watch started (settle time: {}s)",
                watch.settle_time.as_secs()
            ),
            json!({ "settle_time_secs": watch.settle_time.as_secs() }),
        )
        .await?;

        let mut processed = self.store().processed_files(transfer_id).await?;
        let mut breaker = CircuitBreaker::new(self.config());
        let mut files_detected: u64 = 0;

        let reason = loop {
            if let Some(reason) = breaker.check() {
                self.audit_meta(
                    transfer_id,
                    AuditEventKind::TransferProgress,
                    reason.to_string(),
                    json!({
                        "cycles_completed": breaker.cycles(),
                        "error_rate_percent": breaker.error_rate_percent(),
                    }),
                )
                .await?;
                break reason;
            }

            let Some(parent) = self.store().get_job(transfer_id).await? else {
                break StopReason::Deleted;
            };
            if parent.status == TransferStatus::Cancelled {
                break StopReason::Cancelled;
            }
            if !parent.watch_continuous() {
                break StopReason::Paused;
            }
            job = parent;

            let cycle = breaker.begin_cycle();
            let mut cycle_had_error = false;
            match self
                .watch_cycle(&mut job, cycle, &mut processed, &executor)
                .await
            {
                Ok(found) => files_detected += found,
                Err(err) => {
                    cycle_had_error = true;
                    tracing::warn!(transfer_id, cycle, error = %err, "watch cycle failed");
                    let _ = self
                        .audit_meta(
                            transfer_id,
                            AuditEventKind::Error,
                            format!("watch cycle {cycle} error: {err}"),
                            json!({ "cycle": cycle }),
                        )
                        .await;
                    // Longer backoff after an error before the next scan.
                    if !self.ticker().wait(self.config().watch_error_backoff).await {
                        break StopReason::Cancelled;
                    }
                }
            }
            breaker.record(cycle_had_error);

            if cycle % 100 == 0 {
                let _ = self
                    .audit_meta(
                        transfer_id,
                        AuditEventKind::TransferProgress,
                        format!(
                            "watch status: {cycle} cycles, {}% recent error rate, {files_detected} files detected",
                            breaker.error_rate_percent()
                        ),
                        json!({
                            "cycles": cycle,
                            "error_rate_percent": breaker.error_rate_percent(),
                            "total_detected": files_detected,
                        }),
                    )
                    .await;
            }

            if !cycle_had_error && !self.ticker().wait(self.config().watch_tick).await {
                break StopReason::Cancelled;
            }
        };

        let outcome = WatchOutcome {
            cycles: breaker.cycles(),
            files_detected,
            reason,
        };
        self.audit_meta(
            transfer_id,
            AuditEventKind::TransferProgress,
            format!(
                "continuous watch stopped after {} cycles, {} files detected ({})",
                outcome.cycles, outcome.files_detected, outcome.reason
            ),
            json!({
                "cycles": outcome.cycles,
                "total_detected": outcome.files_detected,
                "reason": outcome.reason.to_string(),
            }),
        )
        .await?;

        tracing::info!(
            transfer_id,
            cycles = outcome.cycles,
            files = outcome.files_detected,
            reason = %outcome.reason,
            "continuous watch finished"
        );
        Ok(outcome)
    }

    /// One scan of the monitored folder: delta against the processed
    /// set, per-file settle, child job per settled file.
    async fn watch_cycle(
        self: &Arc<Self>,
        job: &mut TransferJob,
        cycle: u64,
        processed: &mut BTreeSet<PathBuf>,
        executor: &Arc<dyn Executor>,
    ) -> Result<u64, EngineError> {
        let transfer_id = job.id;

        if !job.source_path.exists() {
            self.audit(
                transfer_id,
                AuditEventKind::TransferProgress,
                format!("watch cycle {cycle}: source path not yet available"),
            )
            .await?;
            return Ok(0);
        }

        let current = list_visible_files(&job.source_path)
            .map_err(porter_transfer::TransferError::from)?;
        let new_files: Vec<PathBuf> = current.difference(processed).cloned().collect();

        let settle = job
            .watch
            .as_ref()
            .map(|w| w.settle_time)
            .unwrap_or(self.config().default_settle_time);

        let mut spawned: u64 = 0;
        for file in new_files {
            let settled = porter_watch::wait_for_file_settle(
                &file,
                settle,
                self.config().file_settle_max_wait,
                self.config().file_settle_check_interval,
                self.ticker(),
            )
            .await?;
            if !settled {
                tracing::debug!(transfer_id, file = %file.display(), "file never settled, skipping");
                continue;
            }

            let size = std::fs::metadata(&file).ok().map(|m| m.len());

            // An independent child job: inherits the operation mode,
            // watches nothing itself.
            let mut child =
                TransferJob::new(0, file.clone(), job.destination_path.clone(), job.mode);
            child.file_size = size.unwrap_or(0);
            let child = self.store().create_job(child).await?;

            let mut detection = WatchDetection::new(transfer_id, file.clone(), size);
            detection.child_transfer_id = Some(child.id);
            let detection = self.store().append_detection(detection).await?;

            let orchestrator = Arc::clone(self);
            let child_id = child.id;
            let mut tracked = detection.clone();
            let handle = executor
                .enqueue(
                    TRANSFER_JOB,
                    child_id,
                    Box::pin(async move {
                        let result = orchestrator.process(child_id).await;
                        match &result {
                            Ok(done) => {
                                tracked.status = done.status;
                                tracked.started_at = done.started_at;
                                tracked.completed_at = done.completed_at;
                                if let Ok(records) =
                                    orchestrator.store().checksums_for(child_id).await
                                {
                                    for record in &records {
                                        match record.kind {
                                            porter_core::ChecksumKind::Source => {
                                                tracked.source_checksum =
                                                    Some(record.value.clone());
                                            }
                                            porter_core::ChecksumKind::Destination => {
                                                tracked.destination_checksum =
                                                    Some(record.value.clone());
                                            }
                                            porter_core::ChecksumKind::Final => {}
                                        }
                                    }
                                    tracked.checksum_match = tracked.source_checksum.is_some()
                                        && tracked.source_checksum == tracked.destination_checksum;
                                }
                            }
                            Err(err) => {
                                tracked.status = TransferStatus::Failed;
                                tracked.error_message = Some(err.to_string());
                                tracked.retry_count += 1;
                            }
                        }
                        if let Err(err) = orchestrator.store().update_detection(&tracked).await {
                            tracing::warn!(
                                detection_id = tracked.id,
                                error = %err,
                                "could not record detection outcome"
                            );
                        }
                        result.map(|_| ())
                    }),
                )
                .await?;

            spawned += 1;
            self.audit_meta(
                transfer_id,
                AuditEventKind::TransferProgress,
                format!(
                    "file detected and transfer enqueued: {} ({} bytes)",
                    detection.file_name,
                    size.unwrap_or(0)
                ),
                json!({
                    "detection_id": detection.id,
                    "file_name": &detection.file_name,
                    "file_size": size,
                    "child_transfer_id": child_id,
                    "job_id": handle.id,
                    "cycle": cycle,
                }),
            )
            .await?;
        }

        *processed = current;
        self.store()
            .set_processed_files(transfer_id, processed.clone())
            .await?;
        if let Some(watch) = job.watch.as_mut() {
            watch.cycle_count = cycle;
        }
        self.store().update_job(job).await?;

        if spawned > 0 {
            self.audit_meta(
                transfer_id,
                AuditEventKind::TransferProgress,
                format!("watch cycle {cycle} complete: detected {spawned} new files"),
                json!({ "cycle": cycle, "files_detected_this_cycle": spawned }),
            )
            .await?;
        }
        Ok(spawned)
    }
}

/// Visible regular files directly under `folder` (no recursion, no
/// hidden names) — the continuous loop's per-cycle view.
fn list_visible_files(folder: &Path) -> std::io::Result<BTreeSet<PathBuf>> {
    let mut files = BTreeSet::new();
    for entry in std::fs::read_dir(folder)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_file() {
            files.insert(path);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(max_cycles: u64, window: usize, threshold: u8) -> CircuitBreaker {
        CircuitBreaker::with_limits(max_cycles, Duration::from_secs(3600), window, threshold)
    }

    #[test]
    fn trips_exactly_at_max_cycles() {
        let mut b = breaker(3, 10, 50);
        assert!(b.check().is_none());
        b.begin_cycle();
        b.begin_cycle();
        assert!(b.check().is_none(), "one below the max must not trip");
        b.begin_cycle();
        assert_eq!(b.check(), Some(StopReason::BreakerMaxCycles));
    }

    #[test]
    fn error_rate_five_of_ten_trips() {
        let mut b = breaker(1000, 10, 50);
        for i in 0..10 {
            b.record(i < 5);
        }
        assert_eq!(b.check(), Some(StopReason::BreakerErrorRate));
    }

    #[test]
    fn error_rate_four_of_ten_does_not_trip() {
        let mut b = breaker(1000, 10, 50);
        for i in 0..10 {
            b.record(i < 4);
        }
        assert!(b.check().is_none());
    }

    #[test]
    fn error_rate_needs_a_full_window() {
        let mut b = breaker(1000, 10, 50);
        for _ in 0..9 {
            b.record(true);
        }
        // Nine samples, all errors, but the window is ten.
        assert!(b.check().is_none());
        b.record(true);
        assert_eq!(b.check(), Some(StopReason::BreakerErrorRate));
    }

    #[test]
    fn history_is_capped_at_twice_the_window() {
        let mut b = breaker(1000, 10, 50);
        for _ in 0..100 {
            b.record(false);
        }
        assert_eq!(b.history.len(), 20);
    }

    #[test]
    fn recovery_clears_the_window() {
        let mut b = breaker(1000, 10, 50);
        for _ in 0..10 {
            b.record(true);
        }
        assert!(b.check().is_some());
        // Ten clean cycles push the errors out of the evaluation window.
        for _ in 0..10 {
            b.record(false);
        }
        assert!(b.check().is_none());
    }

    #[test]
    fn max_duration_trips() {
        let mut b = CircuitBreaker::with_limits(1000, Duration::ZERO, 10, 50);
        b.begin_cycle();
        assert_eq!(b.check(), Some(StopReason::BreakerMaxDuration));
    }

    #[test]
    fn list_visible_files_skips_hidden_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.wav"), b"x").unwrap();
        std::fs::write(dir.path().join(".partial"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let files = list_visible_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files.iter().next().unwrap().ends_with("a.wav"));
    }
}
