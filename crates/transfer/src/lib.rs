//! Streaming checksums, chunked copying and destination verification.
//!
//! Everything here works on one file at a time in fixed-size chunks, so
//! sources far larger than available memory stream through untouched.

mod checksum;
mod copy;
mod readback;
mod space;

pub use checksum::{file_digest, file_digest_with_progress};
pub use copy::copy_with_progress;
pub use readback::verify_destination_readable;
pub use space::check_disk_space;

/// Default chunk size for streaming digests: 8 KiB.
pub const DEFAULT_DIGEST_CHUNK: usize = 8 * 1024;

/// Default chunk size for copies: 1 MiB.
///
/// Larger chunks reduce per-chunk overhead (syscalls, progress updates)
/// without holding a meaningful amount of the file in memory.
pub const DEFAULT_COPY_CHUNK: usize = 1024 * 1024;

/// Errors produced by the transfer primitives.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "insufficient disk space: required {required} bytes, available {available} bytes, \
         free after copy {free_after_percent:.1}% (minimum {minimum_percent}%)"
    )]
    InsufficientSpace {
        required: u64,
        available: u64,
        free_after_percent: f64,
        minimum_percent: u8,
    },

    #[error("checksum mismatch: source {source}, destination {destination}")]
    ChecksumMismatch { source: String, destination: String },

    #[error("destination not readable: {0}")]
    Unreadable(String),
}
