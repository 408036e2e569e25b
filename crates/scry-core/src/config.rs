//! `Config`: the on-disk, serde-driven configuration object. Every field has
//! a `#[serde(default = "...")]` so partial or legacy config files keep
//! loading.

use crate::constants;
use crate::error::ConfigError;
use crate::types::RankingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            storage: StorageConfig::default(),
            watch: WatchConfig::default(),
            maintenance: MaintenanceConfig::default(),
            logging: LoggingConfig::default(),
            ranking: RankingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_follow_symlinks")]
    pub follow_symlinks: bool,
    #[serde(default = "default_rebuild_every_n_batches")]
    pub rebuild_every_n_batches: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size(),
            batch_size: default_batch_size(),
            follow_symlinks: default_follow_symlinks(),
            rebuild_every_n_batches: default_rebuild_every_n_batches(),
        }
    }
}

fn default_max_file_size() -> u64 {
    1_048_576
}
fn default_batch_size() -> usize {
    constants::DEFAULT_BATCH_SIZE
}
fn default_follow_symlinks() -> bool {
    false
}
fn default_rebuild_every_n_batches() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_meta_dir")]
    pub meta_dir: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,
    #[serde(default = "default_cache_size_kib")]
    pub cache_size_kib: i32,
    #[serde(default = "default_mmap_size_bytes")]
    pub mmap_size_bytes: i64,
    #[serde(default = "default_wal_autocheckpoint_pages")]
    pub wal_autocheckpoint_pages: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            meta_dir: default_meta_dir(),
            busy_timeout_ms: default_busy_timeout_ms(),
            cache_size_kib: default_cache_size_kib(),
            mmap_size_bytes: default_mmap_size_bytes(),
            wal_autocheckpoint_pages: default_wal_autocheckpoint_pages(),
        }
    }
}

fn default_meta_dir() -> String {
    constants::DEFAULT_META_DIR.to_string()
}
fn default_busy_timeout_ms() -> u32 {
    5000
}
fn default_cache_size_kib() -> i32 {
    -64_000
}
fn default_mmap_size_bytes() -> i64 {
    268_435_456
}
fn default_wal_autocheckpoint_pages() -> u32 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_debounce_delay_ms")]
    pub debounce_delay_ms: u64,
    #[serde(default = "default_watch_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "default_ignore_cache_capacity")]
    pub ignore_cache_capacity: usize,
    #[serde(default = "default_memory_check_interval_secs")]
    pub memory_check_interval_secs: u64,
    #[serde(default = "default_memory_threshold_mb")]
    pub memory_threshold_mb: f64,
    #[serde(default = "default_watcher_timeout_ms")]
    pub watcher_timeout_ms: u64,
    #[serde(default)]
    pub extra_ignore_patterns: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_delay_ms: default_debounce_delay_ms(),
            batch_size: default_watch_batch_size(),
            max_queue_size: default_max_queue_size(),
            ignore_cache_capacity: default_ignore_cache_capacity(),
            memory_check_interval_secs: default_memory_check_interval_secs(),
            memory_threshold_mb: default_memory_threshold_mb(),
            watcher_timeout_ms: default_watcher_timeout_ms(),
            extra_ignore_patterns: Vec::new(),
        }
    }
}

fn default_debounce_delay_ms() -> u64 {
    constants::DEFAULT_DEBOUNCE_DELAY_MS
}
fn default_watch_batch_size() -> usize {
    constants::DEFAULT_BATCH_SIZE
}
fn default_max_queue_size() -> usize {
    constants::DEFAULT_MAX_QUEUE_SIZE
}
fn default_ignore_cache_capacity() -> usize {
    constants::DEFAULT_IGNORE_CACHE_CAPACITY
}
fn default_memory_check_interval_secs() -> u64 {
    constants::DEFAULT_MEMORY_CHECK_INTERVAL_SECS
}
fn default_memory_threshold_mb() -> f64 {
    constants::DEFAULT_MEMORY_THRESHOLD_MB
}
fn default_watcher_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_vacuum_threshold")]
    pub vacuum_threshold: u64,
    #[serde(default = "default_maintenance_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_backup_retention_count")]
    pub backup_retention_count: u32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            vacuum_threshold: default_vacuum_threshold(),
            interval_secs: default_maintenance_interval_secs(),
            backup_retention_count: default_backup_retention_count(),
        }
    }
}

fn default_retention_days() -> i64 {
    constants::DEFAULT_RETENTION_DAYS
}
fn default_vacuum_threshold() -> u64 {
    constants::DEFAULT_VACUUM_THRESHOLD
}
fn default_maintenance_interval_secs() -> u64 {
    constants::DEFAULT_MAINTENANCE_INTERVAL_SECS
}
fn default_backup_retention_count() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load config from `<meta_dir>/config.toml`, falling back to defaults
    /// if the file does not exist — a missing project config means "use
    /// defaults", not an error; `NotFound` is reserved for an
    /// explicitly-named file that's missing.
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        Self::load_with_file(project_root, None)
    }

    pub fn load_with_file(
        project_root: &Path,
        explicit_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let path = match explicit_path {
            Some(p) => p.to_path_buf(),
            None => project_root
                .join(constants::DEFAULT_META_DIR)
                .join("config.toml"),
        };

        if !path.exists() {
            if explicit_path.is_some() {
                return Err(ConfigError::NotFound {
                    path: path.display().to_string(),
                });
            }
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)?;
        toml_like::parse(&raw).map_err(|cause| ConfigError::ParseError {
            path: path.display().to_string(),
            cause,
        })
    }

    pub fn meta_dir(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.storage.meta_dir)
    }

    pub fn db_path(&self, project_root: &Path) -> PathBuf {
        self.meta_dir(project_root).join(constants::STORE_DB_FILE)
    }

    pub fn hybrid_dir(&self, project_root: &Path) -> PathBuf {
        self.meta_dir(project_root).join("hybrid")
    }

    pub fn logs_dir(&self, project_root: &Path) -> PathBuf {
        self.meta_dir(project_root).join("logs")
    }

    pub fn backups_dir(&self, project_root: &Path) -> PathBuf {
        self.meta_dir(project_root).join("backups")
    }
}

/// Minimal TOML deserialization wrapper kept in its own module so the
/// top-level `Config` API doesn't leak which crate backs it; delegates to
/// `serde_json`-compatible `toml`-shaped parsing is out of scope here, so
/// this calls into the `toml` crate directly. Kept thin so swapping parsers
/// never touches callers.
mod toml_like {
    use super::Config;

    pub fn parse(raw: &str) -> Result<Config, String> {
        toml::from_str(raw).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.index.batch_size, constants::DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = Config::load_with_file(dir.path(), Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let meta = dir.path().join(constants::DEFAULT_META_DIR);
        std::fs::create_dir_all(&meta).unwrap();
        std::fs::write(meta.join("config.toml"), "[index]\nbatch_size = 42\n").unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.index.batch_size, 42);
        assert_eq!(cfg.storage.busy_timeout_ms, default_busy_timeout_ms());
    }
}
