use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::{DEFAULT_DIGEST_CHUNK, TransferError};

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
///
/// The file streams through in [`DEFAULT_DIGEST_CHUNK`]-sized reads; a
/// multi-hundred-gigabyte file needs no more memory than a small one.
pub fn file_digest(path: &Path) -> Result<String, TransferError> {
    file_digest_with_progress(path, DEFAULT_DIGEST_CHUNK, |_, _| {})
}

/// Like [`file_digest`], invoking `progress(bytes_read, total_size)` after
/// every chunk.
pub fn file_digest_with_progress(
    path: &Path,
    chunk_size: usize,
    mut progress: impl FnMut(u64, u64),
) -> Result<String, TransferError> {
    let chunk_size = if chunk_size == 0 { DEFAULT_DIGEST_CHUNK } else { chunk_size };
    let mut file = std::fs::File::open(path)?;
    let total = file.metadata()?.len();

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; chunk_size];
    let mut bytes_read: u64 = 0;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        bytes_read += n as u64;
        progress(bytes_read, total);
    }

    Ok(hex::encode(hasher.finalize()))
}
