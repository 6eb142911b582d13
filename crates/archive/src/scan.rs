use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::ArchiveError;

/// The visible contents of a folder: files, empty subdirectories and byte
/// totals, with hidden (`.`-prefixed) entries excluded at every depth.
#[derive(Debug, Clone, Default)]
pub struct FolderStats {
    pub files: Vec<PathBuf>,
    pub empty_dirs: Vec<PathBuf>,
    pub total_bytes: u64,
}

impl FolderStats {
    pub fn file_count(&self) -> u64 {
        self.files.len() as u64
    }

    pub fn avg_file_bytes(&self) -> Option<u64> {
        if self.files.is_empty() {
            None
        } else {
            Some(self.total_bytes / self.files.len() as u64)
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Recursively scans `root`, skipping hidden files and hidden directory
/// subtrees. Files that disappear mid-scan are ignored.
pub fn scan_visible(root: &Path) -> Result<FolderStats, ArchiveError> {
    if !root.is_dir() {
        return Err(ArchiveError::NotADirectory(root.to_path_buf()));
    }

    let mut stats = FolderStats::default();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable entry during scan");
                continue;
            }
        };

        if entry.file_type().is_file() {
            match entry.metadata() {
                Ok(meta) => {
                    stats.total_bytes += meta.len();
                    stats.files.push(entry.into_path());
                }
                Err(_) => continue,
            }
        } else if entry.file_type().is_dir() && entry.depth() > 0 {
            if dir_is_visibly_empty(entry.path()) {
                stats.empty_dirs.push(entry.into_path());
            }
        }
    }

    Ok(stats)
}

fn dir_is_visibly_empty(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.all(|e| {
            e.map(|e| e.file_name().to_string_lossy().starts_with('.'))
                .unwrap_or(true)
        }),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_tree(root: &Path) {
        std::fs::create_dir_all(root.join("takes")).unwrap();
        std::fs::create_dir_all(root.join(".git/objects")).unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        std::fs::write(root.join("mix.wav"), vec![0u8; 100]).unwrap();
        std::fs::write(root.join("takes/take1.wav"), vec![0u8; 50]).unwrap();
        std::fs::write(root.join(".DS_Store"), b"junk").unwrap();
        std::fs::write(root.join("takes/.hidden"), b"junk").unwrap();
        std::fs::write(root.join(".git/objects/blob"), b"junk").unwrap();
    }

    #[test]
    fn hidden_entries_excluded_at_every_depth() {
        let dir = tempfile::tempdir().unwrap();
        build_tree(dir.path());

        let stats = scan_visible(dir.path()).unwrap();
        assert_eq!(stats.file_count(), 2);
        assert_eq!(stats.total_bytes, 150);
        assert!(stats.files.iter().all(|p| !p.to_string_lossy().contains("/.")));
    }

    #[test]
    fn empty_visible_dirs_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        build_tree(dir.path());

        let stats = scan_visible(dir.path()).unwrap();
        assert_eq!(stats.empty_dirs, vec![dir.path().join("empty")]);
    }

    #[test]
    fn dir_containing_only_hidden_files_counts_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("shadow");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join(".keep"), b"").unwrap();

        let stats = scan_visible(dir.path()).unwrap();
        assert_eq!(stats.empty_dirs, vec![sub]);
    }

    #[test]
    fn file_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            scan_visible(&file),
            Err(ArchiveError::NotADirectory(_))
        ));
    }

    #[test]
    fn avg_file_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), vec![0u8; 10]).unwrap();
        std::fs::write(dir.path().join("b"), vec![0u8; 30]).unwrap();
        let stats = scan_visible(dir.path()).unwrap();
        assert_eq!(stats.avg_file_bytes(), Some(20));
    }
}
