use std::path::{Path, PathBuf};

use crate::PathError;

/// Canonical destination layout for one transfer.
///
/// Directories always land under `destination_root/basename(source)`;
/// files land in `destination_root` unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationLayout {
    pub source_path: PathBuf,
    pub destination_root: PathBuf,
    pub final_root: PathBuf,
    pub is_source_dir: bool,
}

impl DestinationLayout {
    pub fn resolve(source: &Path, destination_root: &Path) -> Self {
        let is_source_dir = source.is_dir();
        let final_root = if is_source_dir {
            match source.file_name() {
                Some(name) => destination_root.join(name),
                None => destination_root.to_path_buf(),
            }
        } else {
            destination_root.to_path_buf()
        };
        Self {
            source_path: source.to_path_buf(),
            destination_root: destination_root.to_path_buf(),
            final_root,
            is_source_dir,
        }
    }

    /// The file the source will be written to, for file jobs.
    pub fn target_file(&self) -> PathBuf {
        match self.source_path.file_name() {
            Some(name) => self.final_root.join(name),
            None => self.final_root.clone(),
        }
    }

    /// No-silent-overwrite policy: repeated runs against the same
    /// destination fail loudly instead of merging or overwriting.
    pub fn assert_overwrite_safe(&self) -> Result<(), PathError> {
        if self.is_source_dir {
            if self.final_root.exists() {
                return Err(PathError::DestinationExists(self.final_root.clone()));
            }
        } else {
            let target = self.target_file();
            if target.exists() {
                return Err(PathError::DestinationExists(target));
            }
        }
        Ok(())
    }
}
