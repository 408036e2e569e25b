//! Error taxonomy. Each variant is a concrete representation of
//! one of the semantic error classes; `retryable()`/`fatal()` classify them
//! the way the retry/backoff and watcher-state-machine logic needs.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileAccessError {
    #[error("cannot {operation} {path}: {cause}")]
    Io {
        operation: String,
        path: String,
        cause: String,
    },
    #[error("file too large: {path} ({size} bytes > limit {limit})")]
    TooLarge {
        path: String,
        size: u64,
        limit: u64,
    },
    #[error("binary file skipped: {path}")]
    Binary { path: String },
}

impl FileAccessError {
    /// Transient and retryable per .
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("watcher operation timed out after {elapsed_ms}ms (budget {budget_ms}ms)")]
    Timeout { elapsed_ms: u64, budget_ms: u64 },
    #[error("event queue overflow: {pending} pending events exceeds cap {cap}")]
    QueueOverflow { pending: usize, cap: usize },
    #[error("memory threshold alert: {resident_mb}MiB > threshold {threshold_mb}MiB")]
    MemoryAlert {
        resident_mb: f64,
        threshold_mb: f64,
    },
    #[error(
        "fatal memory threshold breach: {resident_mb}MiB > 1.5x threshold {threshold_mb}MiB"
    )]
    MemoryFatal {
        resident_mb: f64,
        threshold_mb: f64,
    },
}

impl WatcherError {
    /// Only the 1.5x breach is fatal; everything else is transient per .
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MemoryFatal { .. })
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: String },
    #[error("failed to parse config {path}: {cause}")]
    ParseError { path: String, cause: String },
    #[error("invalid config value: {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("ignore pattern cannot be compiled: {pattern}: {cause}")]
    CompileFailed { pattern: String, cause: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("database busy")]
    Busy,
    #[error("store integrity check failed: {0}")]
    IntegrityCheck(String),
    #[error("foreign key violation(s): {0:?}")]
    ForeignKeyViolation(Vec<String>),
    #[error("write-lock acquisition timed out after {elapsed_ms}ms")]
    WriteLockTimeout { elapsed_ms: u64 },
    #[error("schema migration required: current={current}, required={required}")]
    SchemaMigrationRequired { current: u32, required: u32 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn database<E: std::fmt::Display>(e: E) -> Self {
        Self::Database(e.to_string())
    }

    /// `Database` errors are transient only when the underlying cause was a
    /// SQLite busy error; callers that already know the cause was `busy`
    /// should use `StoreError::Busy` directly instead.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IntegrityCheck(_) | Self::ForeignKeyViolation(_))
    }
}

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("embedder network error: {0}")]
    Network(String),
    #[error("embedder timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
    #[error("embedder rate limited, retry after {retry_after_ms:?}ms")]
    RateLimit { retry_after_ms: Option<u64> },
    #[error("embedder initialization failed: {0}")]
    Initialization(String),
}

impl EmbedderError {
    /// `Initialization` is fatal for the vector path (degrade to
    /// lexical-only); the rest are retryable per .
    pub fn is_fatal_for_vector_path(&self) -> bool {
        matches!(self, Self::Initialization(_))
    }
}

#[derive(Error, Debug)]
pub enum RankingConfigError {
    #[error("invalid ranking config field {field}: {reason}")]
    Invalid { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("parse failed: {path}: {cause}")]
    Failed { path: String, cause: String },
    #[error("grammar not available for language: {language}")]
    GrammarNotAvailable { language: String },
}
