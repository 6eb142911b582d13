use std::path::{Component, Path};

use filetime::FileTime;
use zip::ZipArchive;

use crate::{ArchiveError, sidecar_path};

/// Summary of an archive's contents.
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    pub entry_count: usize,
    pub stored_size: u64,
    pub uncompressed_size: u64,
    pub entries: Vec<String>,
}

/// Rejects entry names that could escape the extraction root.
///
/// Absolute paths, Windows prefixes and any `..` component are refused
/// outright — a hostile archive must fail extraction, not be quietly
/// skipped over.
fn ensure_entry_safe(name: &str) -> Result<(), ArchiveError> {
    if name.is_empty() {
        return Err(ArchiveError::UnsafeEntryPath("empty entry name".into()));
    }
    let path = Path::new(name);
    if path.is_absolute() {
        return Err(ArchiveError::UnsafeEntryPath(name.to_string()));
    }
    for component in path.components() {
        match component {
            Component::ParentDir | Component::Prefix(_) | Component::RootDir => {
                return Err(ArchiveError::UnsafeEntryPath(name.to_string()));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }
    Ok(())
}

/// Extracts an archive into `dest_root`.
///
/// When a `<archive>.sha256` sidecar is present, the archive digest is
/// recomputed and compared before anything is written. Extracted file
/// timestamps are reset to the Unix epoch so that later stability checks
/// never mistake carried-over mtimes for fresh writes. Individual entry
/// failures are logged and skipped; unsafe entry names abort the whole
/// extraction.
pub fn unpack(
    archive_path: &Path,
    dest_root: &Path,
    mut progress: impl FnMut(u64, u64, &str),
) -> Result<(), ArchiveError> {
    let sidecar = sidecar_path(archive_path);
    if sidecar.exists() {
        let expected = std::fs::read_to_string(&sidecar)?.trim().to_string();
        let actual = porter_transfer::file_digest(archive_path)?;
        if actual != expected {
            return Err(ArchiveError::DigestMismatch { expected, actual });
        }
    }

    let file = std::fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    let total = archive.len() as u64;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        ensure_entry_safe(&name)?;

        let target = dest_root.join(Path::new(&name));
        let result = if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(ArchiveError::from)
        } else {
            extract_file(&mut entry, &target)
        };

        match result {
            Ok(()) => progress(i as u64 + 1, total, &name),
            Err(err) => {
                tracing::warn!(entry = %name, error = %err, "failed to extract entry, skipping");
                continue;
            }
        }
    }

    Ok(())
}

fn extract_file(entry: &mut impl std::io::Read, target: &Path) -> Result<(), ArchiveError> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = std::fs::File::create(target)?;
    std::io::copy(entry, &mut out)?;
    drop(out);
    // Epoch timestamps: carried-over or wall-clock mtimes would read as
    // fresh modifications to a stability watcher.
    filetime::set_file_mtime(target, FileTime::zero())?;
    Ok(())
}

/// Opens the archive and reads every entry end to end, surfacing CRC or
/// structural corruption.
pub fn validate(archive_path: &Path) -> Result<(), ArchiveError> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        std::io::copy(&mut entry, &mut std::io::sink())?;
    }
    Ok(())
}

/// Entry counts, byte totals and names for an archive.
pub fn info(archive_path: &Path) -> Result<ArchiveInfo, ArchiveError> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut info = ArchiveInfo {
        entry_count: archive.len(),
        stored_size: 0,
        uncompressed_size: 0,
        entries: Vec::with_capacity(archive.len()),
    };
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        info.stored_size += entry.compressed_size();
        info.uncompressed_size += entry.size();
        info.entries.push(entry.name().to_string());
    }
    Ok(info)
}
