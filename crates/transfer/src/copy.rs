use std::io::{Read, Write};
use std::path::Path;

use crate::{DEFAULT_COPY_CHUNK, TransferError};

/// Stream-copies `source` to `destination` in fixed-size chunks, invoking
/// `progress(bytes_copied, total_size)` after every chunk.
///
/// Parent directories of the destination are created as needed. Returns
/// the number of bytes copied.
pub fn copy_with_progress(
    source: &Path,
    destination: &Path,
    chunk_size: usize,
    mut progress: impl FnMut(u64, u64),
) -> Result<u64, TransferError> {
    let chunk_size = if chunk_size == 0 { DEFAULT_COPY_CHUNK } else { chunk_size };
    let total = std::fs::metadata(source)?.len();

    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut src = std::fs::File::open(source)?;
    let mut dst = std::fs::File::create(destination)?;

    let mut buf = vec![0u8; chunk_size];
    let mut bytes_copied: u64 = 0;
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n])?;
        bytes_copied += n as u64;
        progress(bytes_copied, total);
    }
    dst.flush()?;

    tracing::debug!(
        source = %source.display(),
        destination = %destination.display(),
        bytes_copied,
        "copy finished"
    );
    Ok(bytes_copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_bytes_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("dst.bin");
        std::fs::write(&src, b"The quick brown fox").unwrap();

        let copied = copy_with_progress(&src, &dst, 4, |_, _| {}).unwrap();
        assert_eq!(copied, 19);
        assert_eq!(std::fs::read(&dst).unwrap(), b"The quick brown fox");
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("a").join("b").join("dst.bin");
        std::fs::write(&src, b"data").unwrap();

        copy_with_progress(&src, &dst, 0, |_, _| {}).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"data");
    }

    #[test]
    fn progress_reaches_total() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("dst.bin");
        std::fs::write(&src, &[1u8; 100]).unwrap();

        let mut last = (0, 0);
        copy_with_progress(&src, &dst, 32, |done, total| last = (done, total)).unwrap();
        assert_eq!(last, (100, 100));
    }

    #[test]
    fn missing_source_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = copy_with_progress(
            Path::new("/nonexistent/src.bin"),
            &dir.path().join("dst.bin"),
            0,
            |_, _| {},
        );
        assert!(matches!(result, Err(TransferError::Io(_))));
    }
}
