use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::TransferError;

/// Verifies a destination is actually readable before MOVE-mode deletion
/// touches the source.
///
/// Checksum equality already proved the bytes arrived; this guards against
/// what can go wrong afterwards: permission flips, unmounted shares,
/// failed unpacks. Files must exist with the expected size and have both
/// their first and last kilobyte readable; folders must be non-empty with
/// at least one contained file readable.
pub fn verify_destination_readable(
    destination: &Path,
    is_folder: bool,
    expected_size: u64,
) -> Result<(), TransferError> {
    if !destination.exists() {
        return Err(TransferError::Unreadable(format!(
            "destination does not exist: {}",
            destination.display()
        )));
    }

    if is_folder {
        verify_folder(destination)
    } else {
        verify_file(destination, expected_size)
    }
}

fn verify_folder(destination: &Path) -> Result<(), TransferError> {
    if !destination.is_dir() {
        return Err(TransferError::Unreadable(format!(
            "destination exists but is not a folder: {}",
            destination.display()
        )));
    }

    let entries: Vec<_> = std::fs::read_dir(destination)
        .map_err(|e| {
            TransferError::Unreadable(format!(
                "no permission to read destination folder {}: {e}",
                destination.display()
            ))
        })?
        .collect::<Result<_, _>>()?;

    if entries.is_empty() {
        return Err(TransferError::Unreadable(format!(
            "destination folder is empty (unpack may have failed): {}",
            destination.display()
        )));
    }

    // Sample check: one readable file is enough proof of access.
    for entry in &entries {
        let path = entry.path();
        if path.is_file() {
            let mut buf = [0u8; 1024];
            let mut file = std::fs::File::open(&path).map_err(|e| {
                TransferError::Unreadable(format!(
                    "cannot read file in destination folder {}: {e}",
                    path.display()
                ))
            })?;
            file.read(&mut buf).map_err(|e| {
                TransferError::Unreadable(format!(
                    "cannot read file in destination folder {}: {e}",
                    path.display()
                ))
            })?;
            break;
        }
    }

    Ok(())
}

fn verify_file(destination: &Path, expected_size: u64) -> Result<(), TransferError> {
    if !destination.is_file() {
        return Err(TransferError::Unreadable(format!(
            "destination exists but is not a file: {}",
            destination.display()
        )));
    }

    let actual_size = std::fs::metadata(destination)?.len();
    if actual_size != expected_size {
        return Err(TransferError::Unreadable(format!(
            "destination file size mismatch: expected {expected_size}, got {actual_size}"
        )));
    }

    let mut file = std::fs::File::open(destination).map_err(|e| {
        TransferError::Unreadable(format!(
            "cannot open destination file {}: {e}",
            destination.display()
        ))
    })?;
    let mut buf = [0u8; 1024];
    file.read(&mut buf).map_err(|e| {
        TransferError::Unreadable(format!("cannot read start of destination file: {e}"))
    })?;
    if expected_size > 1024 {
        file.seek(SeekFrom::End(-1024))?;
        file.read(&mut buf).map_err(|e| {
            TransferError::Unreadable(format!("cannot read end of destination file: {e}"))
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readable_file_passes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("out.bin");
        std::fs::write(&file, vec![9u8; 4096]).unwrap();
        verify_destination_readable(&file, false, 4096).unwrap();
    }

    #[test]
    fn size_mismatch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("out.bin");
        std::fs::write(&file, b"short").unwrap();
        let result = verify_destination_readable(&file, false, 4096);
        assert!(matches!(result, Err(TransferError::Unreadable(_))));
    }

    #[test]
    fn missing_destination_fails() {
        let result = verify_destination_readable(Path::new("/nonexistent/x"), false, 1);
        assert!(matches!(result, Err(TransferError::Unreadable(_))));
    }

    #[test]
    fn folder_with_contents_passes() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("out");
        std::fs::create_dir(&folder).unwrap();
        std::fs::write(folder.join("a.wav"), b"pcm").unwrap();
        verify_destination_readable(&folder, true, 0).unwrap();
    }

    #[test]
    fn empty_folder_fails() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("out");
        std::fs::create_dir(&folder).unwrap();
        let result = verify_destination_readable(&folder, true, 0);
        assert!(matches!(result, Err(TransferError::Unreadable(_))));
    }

    #[test]
    fn file_where_folder_expected_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("out");
        std::fs::write(&file, b"x").unwrap();
        let result = verify_destination_readable(&file, true, 0);
        assert!(matches!(result, Err(TransferError::Unreadable(_))));
    }
}
