use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A whitelisted volume root that transfers may read from or write to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRule {
    pub path: PathBuf,
    pub alias: String,
    /// Require the path to exist (a mounted share) at validation time.
    pub check_mounted: bool,
    /// Restrict this volume to a logical network segment. Only honored on
    /// nodes that are not running in backend mode.
    pub segment: Option<String>,
}

impl VolumeRule {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        let alias = path.to_string_lossy().into_owned();
        Self {
            path,
            alias,
            check_mounted: false,
            segment: None,
        }
    }

    pub fn mounted(mut self) -> Self {
        self.check_mounted = true;
        self
    }

    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.segment = Some(segment.into());
        self
    }

    /// Whether the volume is currently reachable. Volumes without the
    /// mounted requirement always count as available.
    pub fn is_available(&self) -> bool {
        !self.check_mounted || self.path.is_dir()
    }
}

/// All tunables the engine consumes, constructed once and passed by
/// reference into the components that need them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub volumes: Vec<VolumeRule>,
    /// Backend transfer nodes see every volume regardless of segment tags.
    pub backend_node: bool,
    pub current_segment: Option<String>,

    /// Directory count above which a folder is considered for packaging.
    pub zip_threshold_files: u64,
    /// Average file size below which a folder is considered for packaging.
    pub zip_threshold_avg_bytes: u64,
    pub max_archive_entry_bytes: u64,
    pub max_archive_total_bytes: u64,

    /// Percentage of destination capacity that must remain free after a copy.
    pub min_free_percent: u8,

    pub default_settle_time: Duration,
    pub stability_max_wait: Duration,
    pub file_settle_max_wait: Duration,
    pub file_settle_check_interval: Duration,

    pub watch_tick: Duration,
    pub watch_error_backoff: Duration,
    pub watch_max_cycles: u64,
    pub watch_max_duration: Duration,
    pub watch_error_window: usize,
    pub watch_error_threshold_percent: u8,

    pub copy_chunk_bytes: usize,
    pub digest_chunk_bytes: usize,

    /// Where temporary archives for folder transfers are created.
    pub temp_root: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            volumes: Vec::new(),
            backend_node: false,
            current_segment: None,
            zip_threshold_files: 1_000,
            zip_threshold_avg_bytes: 4 * 1024 * 1024,
            max_archive_entry_bytes: 10 * 1024 * 1024,
            max_archive_total_bytes: 500 * 1024 * 1024,
            min_free_percent: 10,
            default_settle_time: Duration::from_secs(30),
            stability_max_wait: Duration::from_secs(3_600),
            file_settle_max_wait: Duration::from_secs(300),
            file_settle_check_interval: Duration::from_secs(1),
            watch_tick: Duration::from_secs(5),
            watch_error_backoff: Duration::from_secs(10),
            watch_max_cycles: 10_000,
            watch_max_duration: Duration::from_secs(86_400),
            watch_error_window: 10,
            watch_error_threshold_percent: 50,
            copy_chunk_bytes: 1024 * 1024,
            digest_chunk_bytes: 8 * 1024,
            temp_root: std::env::temp_dir(),
        }
    }
}

impl EngineConfig {
    /// Builds a configuration from `PORTER_*` environment variables,
    /// falling back to the defaults for anything unset or unparsable.
    ///
    /// `PORTER_VOLUMES` is a comma-separated list of volume roots.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(raw) = std::env::var("PORTER_VOLUMES") {
            cfg.volumes = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(VolumeRule::new)
                .collect();
        }
        cfg.backend_node = env_bool("PORTER_BACKEND_NODE").unwrap_or(cfg.backend_node);
        cfg.current_segment = std::env::var("PORTER_SEGMENT").ok().filter(|s| !s.is_empty());

        if let Some(v) = env_u64("PORTER_ZIP_THRESHOLD_FILES") {
            cfg.zip_threshold_files = v;
        }
        if let Some(v) = env_u64("PORTER_ZIP_THRESHOLD_AVG_BYTES") {
            cfg.zip_threshold_avg_bytes = v;
        }
        if let Some(v) = env_u64("PORTER_ZIP_MAX_ENTRY_BYTES") {
            cfg.max_archive_entry_bytes = v;
        }
        if let Some(v) = env_u64("PORTER_ZIP_MAX_TOTAL_BYTES") {
            cfg.max_archive_total_bytes = v;
        }
        if let Some(v) = env_u64("PORTER_MIN_FREE_PERCENT") {
            cfg.min_free_percent = v.min(100) as u8;
        }
        if let Some(v) = env_u64("PORTER_SETTLE_TIME_SECS") {
            cfg.default_settle_time = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("PORTER_WATCH_TICK_SECS") {
            cfg.watch_tick = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("PORTER_WATCH_MAX_CYCLES") {
            cfg.watch_max_cycles = v;
        }
        if let Some(v) = env_u64("PORTER_WATCH_MAX_DURATION_SECS") {
            cfg.watch_max_duration = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("PORTER_WATCH_ERROR_THRESHOLD") {
            cfg.watch_error_threshold_percent = v.min(100) as u8;
        }
        if let Ok(dir) = std::env::var("PORTER_TMP_DIR") {
            if !dir.is_empty() {
                cfg.temp_root = PathBuf::from(dir);
            }
        }

        cfg
    }

    pub fn with_volume(mut self, path: impl AsRef<Path>) -> Self {
        self.volumes.push(VolumeRule::new(path.as_ref()));
        self
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.trim().parse().ok()
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    match raw.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.zip_threshold_files, 1_000);
        assert_eq!(cfg.zip_threshold_avg_bytes, 4 * 1024 * 1024);
        assert_eq!(cfg.min_free_percent, 10);
        assert_eq!(cfg.watch_tick, Duration::from_secs(5));
        assert_eq!(cfg.watch_error_window, 10);
        assert_eq!(cfg.watch_error_threshold_percent, 50);
    }

    #[test]
    fn volume_without_mount_requirement_is_always_available() {
        let rule = VolumeRule::new("/definitely/not/mounted/anywhere");
        assert!(rule.is_available());
        let strict = VolumeRule::new("/definitely/not/mounted/anywhere").mounted();
        assert!(!strict.is_available());
    }

    #[test]
    fn mounted_volume_available_when_directory_exists() {
        let dir = tempfile::tempdir().unwrap();
        let rule = VolumeRule::new(dir.path()).mounted();
        assert!(rule.is_available());
    }

    #[test]
    fn with_volume_appends() {
        let cfg = EngineConfig::default().with_volume("/vol/a").with_volume("/vol/b");
        assert_eq!(cfg.volumes.len(), 2);
        assert_eq!(cfg.volumes[1].path, PathBuf::from("/vol/b"));
    }
}
