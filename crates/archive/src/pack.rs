use std::io::Write;
use std::path::Path;

use zip::CompressionMethod;
use zip::ZipArchive;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::scan::scan_visible;
use crate::{ArchiveError, sidecar_path};

/// Byte caps applied while packaging.
#[derive(Debug, Clone, Copy)]
pub struct PackLimits {
    pub max_entry_bytes: u64,
    pub max_total_bytes: u64,
}

/// What was written into an archive.
#[derive(Debug, Clone)]
pub struct PackSummary {
    pub file_count: u64,
    pub total_bytes: u64,
    pub archive_size: u64,
    /// Hex SHA-256 of the finished archive, also written to the sidecar.
    pub digest: String,
}

/// Packages `source` into a STORE-mode archive at `archive_path`.
///
/// Hidden files and directories are excluded, empty visible directories
/// are recorded as directory entries, and the archive file itself is
/// skipped if it happens to live inside the source. Entry names are paths
/// relative to the source root. After writing, every entry is verified to
/// be stored uncompressed, and a `<archive>.sha256` sidecar is written
/// for later integrity re-checks.
pub fn pack(
    source: &Path,
    archive_path: &Path,
    limits: PackLimits,
    mut progress: impl FnMut(u64, u64, &str),
) -> Result<PackSummary, ArchiveError> {
    if !source.is_dir() {
        return Err(ArchiveError::NotADirectory(source.to_path_buf()));
    }

    let stats = scan_visible(source)?;
    let total_files = stats.file_count();
    let archive_abs = archive_path
        .canonicalize()
        .unwrap_or_else(|_| archive_path.to_path_buf());

    let file = std::fs::File::create(archive_path)?;
    let mut writer = ZipWriter::new(file);

    let mut files_done: u64 = 0;
    let mut running_total: u64 = 0;

    for path in &stats.files {
        let abs = path.canonicalize().unwrap_or_else(|_| path.clone());
        if abs == archive_abs {
            continue;
        }

        let size = std::fs::metadata(path)?.len();
        if size > limits.max_entry_bytes {
            return Err(ArchiveError::EntryTooLarge {
                path: path.clone(),
                size,
                limit: limits.max_entry_bytes,
            });
        }
        running_total += size;
        if running_total > limits.max_total_bytes {
            return Err(ArchiveError::TotalTooLarge {
                path: path.clone(),
                total: running_total,
                limit: limits.max_total_bytes,
            });
        }

        let name = entry_name(source, path);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(size >= u32::MAX as u64);
        writer.start_file(&name, options)?;
        let mut reader = std::fs::File::open(path)?;
        std::io::copy(&mut reader, &mut writer)?;

        files_done += 1;
        progress(files_done, total_files, &name);
    }

    for dir in &stats.empty_dirs {
        let name = format!("{}/", entry_name(source, dir));
        writer.add_directory(
            &name,
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
        )?;
    }

    writer.finish()?.flush()?;

    verify_all_stored(archive_path)?;

    let digest = porter_transfer::file_digest(archive_path)?;
    std::fs::write(sidecar_path(archive_path), &digest)?;

    let archive_size = std::fs::metadata(archive_path)?.len();
    tracing::info!(
        source = %source.display(),
        archive = %archive_path.display(),
        files = files_done,
        bytes = running_total,
        archive_size,
        "folder packaged"
    );

    Ok(PackSummary {
        file_count: files_done,
        total_bytes: running_total,
        archive_size,
        digest,
    })
}

fn entry_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.join("/")
}

/// Every entry in a finished archive must use the stored method; anything
/// else means the container is not the bit-for-bit copy it claims to be.
fn verify_all_stored(archive_path: &Path) -> Result<(), ArchiveError> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        if entry.compression() != CompressionMethod::Stored {
            return Err(ArchiveError::CompressedEntry(entry.name().to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> PackLimits {
        PackLimits {
            max_entry_bytes: 10 * 1024 * 1024,
            max_total_bytes: 500 * 1024 * 1024,
        }
    }

    fn build_source(root: &Path) {
        std::fs::create_dir_all(root.join("takes")).unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        std::fs::write(root.join("mix.wav"), vec![1u8; 256]).unwrap();
        std::fs::write(root.join("takes/take1.wav"), vec![2u8; 128]).unwrap();
        std::fs::write(root.join(".DS_Store"), b"junk").unwrap();
    }

    #[test]
    fn packs_visible_files_with_relative_names() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("session");
        build_source(&src);
        let archive = dir.path().join("session.zip");

        let summary = pack(&src, &archive, limits(), |_, _, _| {}).unwrap();
        assert_eq!(summary.file_count, 2);
        assert_eq!(summary.total_bytes, 384);

        let mut zip = ZipArchive::new(std::fs::File::open(&archive).unwrap()).unwrap();
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index_raw(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"mix.wav".to_string()));
        assert!(names.contains(&"takes/take1.wav".to_string()));
        assert!(names.contains(&"empty/".to_string()));
        assert!(!names.iter().any(|n| n.contains(".DS_Store")));
    }

    #[test]
    fn every_entry_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("session");
        build_source(&src);
        let archive = dir.path().join("session.zip");
        pack(&src, &archive, limits(), |_, _, _| {}).unwrap();

        let mut zip = ZipArchive::new(std::fs::File::open(&archive).unwrap()).unwrap();
        for i in 0..zip.len() {
            let entry = zip.by_index_raw(i).unwrap();
            assert_eq!(entry.compression(), CompressionMethod::Stored, "{}", entry.name());
        }
    }

    #[test]
    fn sidecar_digest_matches_archive() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("session");
        build_source(&src);
        let archive = dir.path().join("session.zip");
        let summary = pack(&src, &archive, limits(), |_, _, _| {}).unwrap();

        let sidecar = std::fs::read_to_string(sidecar_path(&archive)).unwrap();
        assert_eq!(sidecar, summary.digest);
        assert_eq!(porter_transfer::file_digest(&archive).unwrap(), summary.digest);
    }

    #[test]
    fn entry_cap_aborts_packaging() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("session");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("big.bin"), vec![0u8; 2048]).unwrap();
        let archive = dir.path().join("session.zip");

        let result = pack(
            &src,
            &archive,
            PackLimits { max_entry_bytes: 1024, max_total_bytes: u64::MAX },
            |_, _, _| {},
        );
        assert!(matches!(result, Err(ArchiveError::EntryTooLarge { .. })));
    }

    #[test]
    fn total_cap_aborts_packaging() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("session");
        std::fs::create_dir(&src).unwrap();
        for i in 0..4 {
            std::fs::write(src.join(format!("f{i}.bin")), vec![0u8; 512]).unwrap();
        }
        let archive = dir.path().join("session.zip");

        let result = pack(
            &src,
            &archive,
            PackLimits { max_entry_bytes: 1024, max_total_bytes: 1024 },
            |_, _, _| {},
        );
        assert!(matches!(result, Err(ArchiveError::TotalTooLarge { .. })));
    }

    #[test]
    fn progress_counts_files() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("session");
        build_source(&src);
        let archive = dir.path().join("session.zip");

        let mut seen = Vec::new();
        pack(&src, &archive, limits(), |done, total, name| {
            seen.push((done, total, name.to_string()));
        })
        .unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen.last().unwrap().0, 2);
        assert_eq!(seen.last().unwrap().1, 2);
    }
}
