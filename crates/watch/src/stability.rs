use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use walkdir::WalkDir;

use crate::{Ticker, WatchError};

/// Point-in-time view of every file under a folder: path → (size, mtime).
pub type Snapshot = BTreeMap<PathBuf, (u64, SystemTime)>;

/// Progress information handed to the stability callback once per check.
#[derive(Debug, Clone, Copy)]
pub struct StabilityProbe {
    pub elapsed: Duration,
    pub checks: u32,
    pub file_count: usize,
}

/// Snapshots all files under `folder` recursively.
///
/// Hidden files are included on purpose: partial uploads often
/// materialize as dot-prefixed temp files, and a folder is not stable
/// while those are still moving. Unreadable entries are skipped.
pub fn snapshot(folder: &Path) -> Result<Snapshot, WatchError> {
    if !folder.is_dir() {
        return Err(WatchError::NotADirectory(folder.to_path_buf()));
    }

    let mut state = Snapshot::new();
    for entry in WalkDir::new(folder) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            state.insert(entry.into_path(), (meta.len(), mtime));
        }
    }
    Ok(state)
}

/// True when two snapshots agree on the file set and on every file's
/// size and modification time.
pub fn is_unchanged(previous: &Snapshot, current: &Snapshot) -> bool {
    previous == current
}

/// Waits until `folder` has gone `settle` without any change, giving up
/// after `max_wait` total.
///
/// The timeout check runs before each sleep: if sleeping would push the
/// elapsed time past `max_wait`, the function returns `Ok(false)` right
/// away instead of overshooting by one cycle. Cancellation through the
/// ticker also returns `Ok(false)`.
pub async fn wait_until_stable(
    folder: &Path,
    settle: Duration,
    max_wait: Duration,
    ticker: &Ticker,
    mut progress: impl FnMut(StabilityProbe),
) -> Result<bool, WatchError> {
    let start = Instant::now();
    let mut checks: u32 = 0;
    let mut previous = snapshot(folder)?;

    loop {
        if start.elapsed() + settle > max_wait {
            tracing::info!(folder = %folder.display(), "stability watch timed out");
            return Ok(false);
        }

        if !ticker.wait(settle).await {
            return Ok(false);
        }
        checks += 1;

        progress(StabilityProbe {
            elapsed: start.elapsed(),
            checks,
            file_count: previous.len(),
        });

        let current = snapshot(folder)?;
        if is_unchanged(&previous, &current) {
            tracing::info!(
                folder = %folder.display(),
                checks,
                files = current.len(),
                "folder is stable"
            );
            return Ok(true);
        }
        previous = current;
    }
}
