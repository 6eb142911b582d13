use std::path::{Path, PathBuf};

use porter_core::EngineConfig;
use unicode_normalization::UnicodeNormalization;

use crate::PathError;

/// Normalized, case-folded form of a path used for volume comparison.
///
/// Shares must compare equal across hosts that disagree on Unicode
/// composition or case (macOS NFD vs NFC, case-insensitive filesystems).
pub fn canonical_key(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let normalized: String = raw.chars().nfc().collect();
    let mut key: String = normalized.to_lowercase();
    while key.len() > 1 && key.ends_with('/') {
        key.pop();
    }
    key
}

/// Character screening and traversal detection, applied to the raw input
/// before any filesystem resolution.
fn screen_raw(raw: &str) -> Result<(), PathError> {
    if raw.trim().is_empty() {
        return Err(PathError::Empty);
    }

    for ch in raw.chars() {
        if ch.is_control() || is_invisible_whitespace(ch) {
            return Err(PathError::Forbidden(raw.to_string()));
        }
    }

    let lowered = raw.to_lowercase();
    if lowered.contains("%2e%2e") || lowered.contains("%2e%2f") || lowered.contains("%2f%2e") {
        return Err(PathError::Traversal(raw.to_string()));
    }
    if raw.contains("..") {
        return Err(PathError::Traversal(raw.to_string()));
    }

    Ok(())
}

fn is_invisible_whitespace(ch: char) -> bool {
    matches!(ch,
        '\u{2000}'..='\u{200F}' | '\u{2028}'..='\u{202F}' | '\u{205F}' | '\u{FEFF}')
}

/// Sanitizes and authorizes a filesystem path.
///
/// Order of checks:
/// 1. empty / forbidden characters / literal and percent-encoded `..`,
///    all before resolution;
/// 2. canonicalization (resolves symlinks, requires the path to exist);
/// 3. symlink policy on the original path;
/// 4. case-folded, Unicode-normalized comparison against each configured
///    volume root, honoring mount requirements and segment tags.
pub fn sanitize_path(
    path: &Path,
    allow_symlinks: bool,
    config: &EngineConfig,
) -> Result<PathBuf, PathError> {
    screen_raw(&path.to_string_lossy())?;

    let is_symlink = std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    if is_symlink && !allow_symlinks {
        tracing::warn!(path = %path.display(), "rejected symlinked path");
        return Err(PathError::SymlinkDenied(path.to_path_buf()));
    }

    let resolved = std::fs::canonicalize(path)?;
    let resolved_key = canonical_key(&resolved);

    for volume in &config.volumes {
        // Segment-tagged volumes are invisible outside their segment,
        // except on backend transfer nodes.
        if let Some(segment) = &volume.segment {
            if !config.backend_node && config.current_segment.as_deref() != Some(segment.as_str()) {
                continue;
            }
        }

        let volume_root = std::fs::canonicalize(&volume.path).unwrap_or_else(|_| volume.path.clone());
        if !key_is_under(&resolved_key, &canonical_key(&volume_root)) {
            continue;
        }

        if volume.check_mounted && !volume.is_available() {
            return Err(PathError::VolumeUnavailable(volume.alias.clone()));
        }
        return Ok(resolved);
    }

    tracing::warn!(path = %resolved.display(), "path outside configured volumes");
    Err(PathError::OutsideVolumes(resolved))
}

/// Prefix match on canonical keys that respects path component boundaries,
/// so `/vol/ab` never authorizes `/vol/abc`.
fn key_is_under(key: &str, volume_key: &str) -> bool {
    if volume_key == "/" {
        return key.starts_with('/');
    }
    key == volume_key || key.starts_with(&format!("{volume_key}/"))
}

/// Validates a source/destination pair for a transfer.
///
/// The source may be a symlink (its target is what gets read). A
/// destination that does not exist yet is validated through its nearest
/// existing ancestor directory, and the missing suffix is re-attached to
/// the sanitized ancestor. The two resolved paths must differ.
pub fn validate_pair(
    source: &Path,
    destination: &Path,
    config: &EngineConfig,
) -> Result<(PathBuf, PathBuf), PathError> {
    let safe_source = sanitize_path(source, true, config)?;

    screen_raw(&destination.to_string_lossy())?;
    let safe_destination = if destination.exists() {
        sanitize_path(destination, true, config)?
    } else {
        let (ancestor, suffix) = split_at_existing_ancestor(destination)?;
        let safe_ancestor = sanitize_path(&ancestor, true, config)?;
        safe_ancestor.join(suffix)
    };

    if safe_source == safe_destination {
        return Err(PathError::SamePath);
    }

    Ok((safe_source, safe_destination))
}

/// Walks up from a non-existing path to its nearest existing ancestor,
/// returning the ancestor and the relative suffix below it.
fn split_at_existing_ancestor(path: &Path) -> Result<(PathBuf, PathBuf), PathError> {
    let mut ancestor = path;
    while !ancestor.exists() {
        ancestor = ancestor.parent().ok_or_else(|| {
            PathError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no existing ancestor for {}", path.display()),
            ))
        })?;
    }
    let suffix = path
        .strip_prefix(ancestor)
        .map(Path::to_path_buf)
        .unwrap_or_default();
    Ok((ancestor.to_path_buf(), suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use porter_core::VolumeRule;

    fn config_for(root: &Path) -> EngineConfig {
        EngineConfig::default().with_volume(root)
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        let cfg = EngineConfig::default();
        assert!(matches!(
            sanitize_path(Path::new(""), false, &cfg),
            Err(PathError::Empty)
        ));
        assert!(matches!(
            sanitize_path(Path::new("   "), false, &cfg),
            Err(PathError::Empty)
        ));
    }

    #[test]
    fn rejects_literal_traversal_before_resolution() {
        let cfg = EngineConfig::default();
        let result = sanitize_path(Path::new("/tmp/../etc/passwd"), false, &cfg);
        assert!(matches!(result, Err(PathError::Traversal(_))));
    }

    #[test]
    fn rejects_percent_encoded_traversal() {
        let cfg = EngineConfig::default();
        for candidate in ["/tmp/%2e%2e/etc", "/tmp/%2E%2E/etc", "/tmp/a%2f%2e"] {
            let result = sanitize_path(Path::new(candidate), false, &cfg);
            assert!(matches!(result, Err(PathError::Traversal(_))), "{candidate}");
        }
    }

    #[test]
    fn rejects_invisible_whitespace() {
        let cfg = EngineConfig::default();
        let sneaky = format!("/tmp/file\u{200B}name");
        let result = sanitize_path(Path::new(&sneaky), false, &cfg);
        assert!(matches!(result, Err(PathError::Forbidden(_))));
    }

    #[test]
    fn accepts_path_inside_volume() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("take1.wav");
        std::fs::write(&file, b"audio").unwrap();

        let cfg = config_for(dir.path());
        let safe = sanitize_path(&file, false, &cfg).unwrap();
        assert!(safe.ends_with("take1.wav"));
    }

    #[test]
    fn rejects_path_outside_volumes() {
        let volume = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let file = elsewhere.path().join("leak.txt");
        std::fs::write(&file, b"x").unwrap();

        let cfg = config_for(volume.path());
        let result = sanitize_path(&file, false, &cfg);
        assert!(matches!(result, Err(PathError::OutsideVolumes(_))));
    }

    #[test]
    fn volume_prefix_does_not_cross_component_boundary() {
        assert!(key_is_under("/vol/ab/file", "/vol/ab"));
        assert!(!key_is_under("/vol/abc/file", "/vol/ab"));
        assert!(key_is_under("/anything", "/"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_denied_unless_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.bin");
        std::fs::write(&target, b"data").unwrap();
        let link = dir.path().join("alias.bin");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let cfg = config_for(dir.path());
        assert!(matches!(
            sanitize_path(&link, false, &cfg),
            Err(PathError::SymlinkDenied(_))
        ));
        let resolved = sanitize_path(&link, true, &cfg).unwrap();
        assert!(resolved.ends_with("real.bin"));
    }

    #[test]
    fn unavailable_mounted_volume_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"x").unwrap();

        let mut cfg = EngineConfig::default();
        let mut rule = VolumeRule::new(dir.path());
        rule.check_mounted = true;
        cfg.volumes.push(rule);

        // Volume exists, so it passes.
        assert!(sanitize_path(&file, false, &cfg).is_ok());
    }

    #[test]
    fn segment_volume_skipped_off_segment() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"x").unwrap();

        let mut cfg = EngineConfig::default();
        cfg.volumes.push(VolumeRule::new(dir.path()).with_segment("studio-a"));

        // Not a backend node and no matching segment: volume is invisible.
        assert!(matches!(
            sanitize_path(&file, false, &cfg),
            Err(PathError::OutsideVolumes(_))
        ));

        // Matching segment makes it visible again.
        cfg.current_segment = Some("studio-a".into());
        assert!(sanitize_path(&file, false, &cfg).is_ok());

        // Backend nodes see every volume.
        cfg.current_segment = None;
        cfg.backend_node = true;
        assert!(sanitize_path(&file, false, &cfg).is_ok());
    }

    #[test]
    fn pair_requires_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("same.txt");
        std::fs::write(&file, b"x").unwrap();

        let cfg = config_for(dir.path());
        let result = validate_pair(&file, &file, &cfg);
        assert!(matches!(result, Err(PathError::SamePath)));
    }

    #[test]
    fn pair_validates_missing_destination_via_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        std::fs::write(&src, b"x").unwrap();
        let dest = dir.path().join("out").join("deeper").join("dst.bin");

        let cfg = config_for(dir.path());
        let (safe_src, safe_dest) = validate_pair(&src, &dest, &cfg).unwrap();
        assert!(safe_src.ends_with("src.bin"));
        assert!(safe_dest.ends_with("out/deeper/dst.bin"));
    }

    #[test]
    fn pair_rejects_destination_outside_volumes() {
        let volume = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let src = volume.path().join("src.bin");
        std::fs::write(&src, b"x").unwrap();
        let dest = outside.path().join("dst.bin");

        let cfg = config_for(volume.path());
        assert!(matches!(
            validate_pair(&src, &dest, &cfg),
            Err(PathError::OutsideVolumes(_))
        ));
    }
}
