use std::path::Path;

use porter_core::OperationMode;
use porter_paths::DestinationLayout;
use walkdir::WalkDir;

use crate::EngineError;

/// What a direct run moved.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectStats {
    pub files_copied: u64,
    pub bytes_copied: u64,
}

/// Synchronous DIRECT-only entry point for scripted and offline use.
///
/// No store, no lock, no volume whitelist: the canonical destination
/// layout and overwrite policy still apply, every copied file is
/// digest-verified, and MOVE deletes the source only after the
/// destination passes the read-back check. The richer orchestrated path
/// (packaging, watch modes, persistence) lives in [`Orchestrator`].
///
/// [`Orchestrator`]: crate::Orchestrator
pub fn run_direct(
    source: &Path,
    destination: &Path,
    mode: OperationMode,
    chunk_size: usize,
) -> Result<DirectStats, EngineError> {
    if !source.exists() {
        return Err(porter_transfer::TransferError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("source does not exist: {}", source.display()),
        ))
        .into());
    }

    let layout = DestinationLayout::resolve(source, destination);
    layout.assert_overwrite_safe()?;

    let mut stats = DirectStats::default();
    if layout.is_source_dir {
        for entry in WalkDir::new(source) {
            let entry = entry.map_err(|e| {
                EngineError::Transfer(porter_transfer::TransferError::Io(e.into()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(source)
                .unwrap_or(entry.path());
            let target = layout.final_root.join(rel);
            stats.bytes_copied += copy_verified(entry.path(), &target, chunk_size)?;
            stats.files_copied += 1;
        }
    } else {
        let target = layout.target_file();
        stats.bytes_copied = copy_verified(source, &target, chunk_size)?;
        stats.files_copied = 1;
    }

    if mode == OperationMode::Move {
        if layout.is_source_dir {
            porter_transfer::verify_destination_readable(&layout.final_root, true, 0)?;
            delete_contents(source)?;
        } else {
            let target = layout.target_file();
            let size = std::fs::metadata(&target)
                .map_err(porter_transfer::TransferError::from)?
                .len();
            porter_transfer::verify_destination_readable(&target, false, size)?;
            std::fs::remove_file(source).map_err(porter_transfer::TransferError::from)?;
        }
    }

    Ok(stats)
}

fn copy_verified(source: &Path, target: &Path, chunk_size: usize) -> Result<u64, EngineError> {
    let source_digest = porter_transfer::file_digest(source)?;
    let copied = porter_transfer::copy_with_progress(source, target, chunk_size, |_, _| {})?;
    let target_digest = porter_transfer::file_digest(target)?;
    if source_digest != target_digest {
        return Err(porter_transfer::TransferError::ChecksumMismatch {
            source: source_digest,
            destination: target_digest,
        }
        .into());
    }
    Ok(copied)
}

fn delete_contents(folder: &Path) -> Result<(), EngineError> {
    for entry in std::fs::read_dir(folder).map_err(porter_transfer::TransferError::from)? {
        let entry = entry.map_err(porter_transfer::TransferError::from)?;
        let path = entry.path();
        let removed = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        removed.map_err(porter_transfer::TransferError::from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_and_verifies_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("mix.wav");
        std::fs::write(&source, vec![1u8; 2048]).unwrap();
        let dest = dir.path().join("out");

        let stats = run_direct(&source, &dest, OperationMode::Copy, 512).unwrap();
        assert_eq!(stats.files_copied, 1);
        assert_eq!(stats.bytes_copied, 2048);
        assert!(source.exists());
        assert_eq!(std::fs::read(dest.join("mix.wav")).unwrap(), vec![1u8; 2048]);
    }

    #[test]
    fn copies_a_tree_preserving_structure() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("session");
        std::fs::create_dir_all(source.join("takes")).unwrap();
        std::fs::write(source.join("mix.wav"), b"a").unwrap();
        std::fs::write(source.join("takes/t1.wav"), b"bb").unwrap();
        let dest = dir.path().join("out");

        let stats = run_direct(&source, &dest, OperationMode::Copy, 0).unwrap();
        assert_eq!(stats.files_copied, 2);
        assert_eq!(stats.bytes_copied, 3);
        assert!(dest.join("session/mix.wav").exists());
        assert!(dest.join("session/takes/t1.wav").exists());
    }

    #[test]
    fn refuses_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("session");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("f"), b"x").unwrap();
        let dest = dir.path().join("out");
        std::fs::create_dir_all(dest.join("session")).unwrap();

        let err = run_direct(&source, &dest, OperationMode::Copy, 0).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Path(porter_paths::PathError::DestinationExists(_))
        ));
    }

    #[test]
    fn move_file_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("mix.wav");
        std::fs::write(&source, vec![1u8; 128]).unwrap();
        let dest = dir.path().join("out");

        run_direct(&source, &dest, OperationMode::Move, 0).unwrap();
        assert!(!source.exists());
        assert!(dest.join("mix.wav").exists());
    }

    #[test]
    fn move_folder_keeps_the_node() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("session");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("f"), b"x").unwrap();
        let dest = dir.path().join("out");

        run_direct(&source, &dest, OperationMode::Move, 0).unwrap();
        assert!(source.is_dir());
        assert_eq!(std::fs::read_dir(&source).unwrap().count(), 0);
        assert!(dest.join("session/f").exists());
    }

    #[test]
    fn missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_direct(
            &dir.path().join("ghost"),
            &dir.path().join("out"),
            OperationMode::Copy,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Transfer(_)));
    }
}
