//! Shared data model and configuration for the porter transfer engine.
//!
//! This crate holds the persisted record types (transfer jobs, checksum
//! records, audit events, watch detections) and the engine configuration.
//! It knows nothing about filesystems, databases or async runtimes — those
//! live in the crates that consume these types.

mod config;
mod job;
mod records;

pub use config::{EngineConfig, VolumeRule};
pub use job::{OperationMode, TransferJob, TransferStatus, WatchSettings};
pub use records::{
    AuditEvent, AuditEventKind, ChecksumKind, ChecksumRecord, WatchDetection,
};
