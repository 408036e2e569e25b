//! Fixed system defaults. Kept as named constants rather than inlined
//! literals so they're grep-able in one place.

/// Default embedding dimension.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// `ast_to_text` / hybrid-index schema version.
pub const HYBRID_SCHEMA_VERSION: u32 = 1;

/// Sparse n-gram builder defaults.
pub const DEFAULT_MIN_GRAM: usize = 3;
pub const DEFAULT_MAX_GRAM: usize = 5;
pub const DEFAULT_NUM_FEATURES: usize = 262_144;

/// Query validation bounds.
pub const MIN_QUERY_LENGTH: usize = 2;
pub const MAX_QUERY_LENGTH: usize = 2000;

/// Tie-break clustering threshold.
pub const TIE_THRESHOLD: f64 = 0.01;

/// Slow-query logging threshold.
pub const SLOW_QUERY_MS: u64 = 100;

/// Write-lock backoff defaults.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 10;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 500;
pub const DEFAULT_WRITE_LOCK_TIMEOUT_MS: u64 = 5000;

/// Circuit breaker defaults.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_RESET_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_HALF_OPEN_SUCCESS_THRESHOLD: u32 = 2;

/// Watcher defaults.
pub const DEFAULT_DEBOUNCE_DELAY_MS: u64 = 100;
pub const DEFAULT_BATCH_SIZE: usize = 200;
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 20_000;
pub const DEFAULT_IGNORE_CACHE_CAPACITY: usize = 10_000;
pub const DEFAULT_MEMORY_CHECK_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_MEMORY_THRESHOLD_MB: f64 = 512.0;

/// Maintenance defaults.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;
pub const DEFAULT_VACUUM_THRESHOLD: u64 = 1000;
pub const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 24 * 3600;

/// Default project metadata directory name under the project root.
pub const DEFAULT_META_DIR: &str = ".scry";

/// Relational store file name.
pub const STORE_DB_FILE: &str = "index.db";
