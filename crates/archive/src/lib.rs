//! STORE-mode folder packaging with integrity digests and safe extraction.
//!
//! Folders with many small files are bundled into a single uncompressed
//! container before transfer. No compression is applied on purpose: the
//! container exists for atomicity, and the payloads (audio, video,
//! renders) are already compressed.

mod pack;
mod scan;
mod unpack;

pub use pack::{PackLimits, PackSummary, pack};
pub use scan::{FolderStats, scan_visible};
pub use unpack::{ArchiveInfo, info, unpack, validate};

use std::path::PathBuf;

/// The sidecar file written next to an archive with its SHA-256 digest.
pub fn sidecar_path(archive: &std::path::Path) -> PathBuf {
    let mut name = archive.as_os_str().to_owned();
    name.push(".sha256");
    PathBuf::from(name)
}

/// Errors produced while packing or extracting archives.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("archive entry exceeds max size ({size} > {limit} bytes): {path}")]
    EntryTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("archive total exceeds limit ({total} > {limit} bytes) at {path}")]
    TotalTooLarge { path: PathBuf, total: u64, limit: u64 },

    #[error("archive entry has unsafe path: {0}")]
    UnsafeEntryPath(String),

    #[error("archive entry '{0}' is not stored uncompressed")]
    CompressedEntry(String),

    #[error("archive integrity failed: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("checksum failure: {0}")]
    Digest(#[from] porter_transfer::TransferError),

    #[error("invalid or corrupted archive: {0}")]
    Corrupt(#[from] zip::result::ZipError),
}
