//! Settle-time folder stability detection.
//!
//! No filesystem notification APIs: plain polling over metadata
//! snapshots, traded for portability and predictability. All waits go
//! through the cancellable [`Ticker`], so tests run many cycles in
//! milliseconds and cancellation interrupts a sleep promptly.

mod settle;
mod stability;
mod ticker;

pub use settle::wait_for_file_settle;
pub use stability::{Snapshot, StabilityProbe, is_unchanged, snapshot, wait_until_stable};
pub use ticker::Ticker;

use std::path::PathBuf;

/// Errors produced while watching folders.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
