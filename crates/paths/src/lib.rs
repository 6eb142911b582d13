//! Path sanitization, volume whitelisting and destination layout rules.
//!
//! Every path that reaches the transfer engine goes through
//! [`sanitize_path`] or [`validate_pair`] first; the destination side
//! additionally goes through [`DestinationLayout`] to apply the canonical
//! layout and the no-silent-overwrite policy.

mod layout;
mod validate;

pub use layout::DestinationLayout;
pub use validate::{canonical_key, sanitize_path, validate_pair};

use std::path::PathBuf;

/// Errors produced while validating paths.
///
/// The three security kinds (`Traversal`, `SymlinkDenied`, `OutsideVolumes`)
/// are distinct so callers can log exactly what was attempted.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,

    #[error("path contains forbidden characters: {0}")]
    Forbidden(String),

    #[error("path traversal detected: {0}")]
    Traversal(String),

    #[error("symlinks not allowed: {0}")]
    SymlinkDenied(PathBuf),

    #[error("path outside allowed volumes: {0}")]
    OutsideVolumes(PathBuf),

    #[error("volume '{0}' is not mounted or accessible")]
    VolumeUnavailable(String),

    #[error("source and destination must be different paths")]
    SamePath,

    #[error("destination already exists: {0}")]
    DestinationExists(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
