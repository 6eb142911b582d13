use std::path::Path;
use std::time::{Duration, Instant};

use crate::{Ticker, WatchError};

/// Waits until a single file's size stays constant for `settle`, checking
/// every `check_interval`, bounded by `max_wait`.
///
/// Returns `Ok(false)` on timeout, cancellation, or the file vanishing
/// mid-watch. Used by the continuous watch loop before a newly-arrived
/// file is handed off for transfer.
pub async fn wait_for_file_settle(
    path: &Path,
    settle: Duration,
    max_wait: Duration,
    check_interval: Duration,
    ticker: &Ticker,
) -> Result<bool, WatchError> {
    let check_interval = if check_interval.is_zero() {
        Duration::from_secs(1)
    } else {
        check_interval
    };

    let start = Instant::now();
    let mut last_size: Option<u64> = None;
    let mut stable_for = Duration::ZERO;

    while start.elapsed() < max_wait {
        match std::fs::metadata(path) {
            Ok(meta) => {
                let size = meta.len();
                if last_size == Some(size) {
                    stable_for += check_interval;
                    if stable_for >= settle {
                        return Ok(true);
                    }
                } else {
                    last_size = Some(size);
                    stable_for = Duration::ZERO;
                }
            }
            // Deleted or access revoked while settling.
            Err(_) => return Ok(false),
        }

        if !ticker.wait(check_interval).await {
            return Ok(false);
        }
    }

    tracing::debug!(path = %path.display(), "file never settled within max wait");
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn constant_file_settles() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("in.wav");
        std::fs::write(&file, b"pcm").unwrap();

        let ticker = Ticker::new();
        let settled = wait_for_file_settle(
            &file,
            Duration::from_millis(30),
            Duration::from_secs(5),
            Duration::from_millis(10),
            &ticker,
        )
        .await
        .unwrap();
        assert!(settled);
    }

    #[tokio::test]
    async fn growing_file_resets_settle_clock() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("in.wav");
        std::fs::write(&file, b"x").unwrap();

        let grower = tokio::spawn({
            let file = file.clone();
            async move {
                for _ in 0..3 {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    let mut data = std::fs::read(&file).unwrap();
                    data.push(b'y');
                    std::fs::write(&file, &data).unwrap();
                }
            }
        });

        let start = Instant::now();
        let ticker = Ticker::new();
        let settled = wait_for_file_settle(
            &file,
            Duration::from_millis(60),
            Duration::from_secs(10),
            Duration::from_millis(10),
            &ticker,
        )
        .await
        .unwrap();
        grower.await.unwrap();

        assert!(settled);
        // A full settle window must pass regardless of when growth stops.
        assert!(start.elapsed() >= Duration::from_millis(60), "{:?}", start.elapsed());
    }

    #[tokio::test]
    async fn vanished_file_reports_unsettled() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gone.wav");

        let ticker = Ticker::new();
        let settled = wait_for_file_settle(
            &file,
            Duration::from_millis(30),
            Duration::from_secs(1),
            Duration::from_millis(10),
            &ticker,
        )
        .await
        .unwrap();
        assert!(!settled);
    }

    #[tokio::test]
    async fn times_out_when_file_keeps_changing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("busy.wav");
        std::fs::write(&file, b"0").unwrap();

        let stop = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let grower = tokio::spawn({
            let file = file.clone();
            let stop = stop.clone();
            async move {
                let mut n = 0u32;
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    n += 1;
                    std::fs::write(&file, vec![b'x'; n as usize]).unwrap();
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }
        });

        let ticker = Ticker::new();
        let settled = wait_for_file_settle(
            &file,
            Duration::from_millis(50),
            Duration::from_millis(200),
            Duration::from_millis(10),
            &ticker,
        )
        .await
        .unwrap();
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        grower.await.unwrap();

        assert!(!settled);
    }
}
