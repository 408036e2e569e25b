//! Shared project-resolution and engine-wiring helpers used by every
//! subcommand: resolving the project root, loading `Config`, opening the
//! store and hybrid index, and building the default embedder. Kept here so
//! each `commands::*::run` reads as the sequence of steps specific to that
//! command, not boilerplate, since the open sequence has several moving
//! parts in a fixed order: store, hybrid index, then embedder.

use anyhow::{Context, Result};
use scry_core::config::Config;
use scry_core::constants::DEFAULT_EMBEDDING_DIM;
use scry_core::types::RankingConfig;
use scry_hybrid::{CircuitBreakerEmbedder, Embedder, HashingEmbedder, HybridIndex};
use scry_store::maintenance::{BackupPolicy, MaintenanceOutcome, MaintenanceReport, MaintenanceScheduler};
use scry_store::Store;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn resolve_root(path: Option<String>) -> Result<PathBuf> {
    let raw = match path {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir()?,
    };
    std::fs::canonicalize(&raw).with_context(|| format!("failed to resolve project path {}", raw.display()))
}

pub fn load_config(root: &Path, config_file: Option<&Path>) -> Result<Config> {
    Config::load_with_file(root, config_file)
        .map_err(|e| anyhow::anyhow!("failed to load config: {e}. Run `scry init` first."))
}

/// Reads `<meta>/ranking-config.json` if present, overriding `config.ranking`. Re-reading this on every
/// call is what makes it "hot": there is no cached, stale copy.
pub fn load_ranking_config(root: &Path, config: &Config) -> RankingConfig {
    let path = config.meta_dir(root).join("ranking-config.json");
    let Ok(raw) = std::fs::read_to_string(&path) else {
        return config.ranking;
    };
    match serde_json::from_str::<RankingConfig>(&raw) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring invalid ranking-config.json");
            config.ranking
        }
    }
}

pub fn open_store(root: &Path, config: &Config) -> Result<Store> {
    let db_path = config.db_path(root);
    std::fs::create_dir_all(config.meta_dir(root))?;
    Store::open(&db_path, &config.storage)
        .map_err(|e| anyhow::anyhow!("failed to open store at {}: {e}", db_path.display()))
}

/// Opens the hybrid index directory, loading the on-disk image if one
/// exists and is compatible; otherwise starts empty.
pub fn open_hybrid_index(root: &Path, config: &Config) -> HybridIndex {
    let mut index = HybridIndex::new(
        config.hybrid_dir(root),
        DEFAULT_EMBEDDING_DIM,
        scry_sparse::SparseConfig::default(),
    );
    index.load();
    index
}

/// The default in-tree embedder, wrapped with a circuit
/// breaker so a misbehaving embedding backend degrades to lexical-only
/// instead of stalling every query.
pub fn build_embedder() -> Box<dyn Embedder> {
    let mut embedder = CircuitBreakerEmbedder::new(
        HashingEmbedder::new(DEFAULT_EMBEDDING_DIM),
        scry_core::circuit::CircuitBreakerConfig::default(),
    );
    // HashingEmbedder::init is infallible; expect documents that instead of
    // silently swallowing an error that can never occur.
    embedder.init().expect("hashing embedder init is infallible");
    Box::new(embedder)
}

pub fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Runs one C9 maintenance cycle (retention cleanup, `ANALYZE`,
/// threshold-gated `VACUUM`, and a pre-cleanup backup snapshot with
/// rotation) against an already-open store. Used both by `watch`'s
/// periodic scheduler and `diagnose --fix`'s on-demand run.
pub fn run_maintenance(root: &Path, config: &Config, store: &Store) -> Result<MaintenanceReport> {
    let policy = BackupPolicy {
        backups_dir: config.backups_dir(root),
        basename: "index".to_string(),
        retention_count: config.maintenance.backup_retention_count,
    };
    let scheduler = MaintenanceScheduler::new();
    match scheduler
        .run(
            &store.lock,
            config.maintenance.retention_days,
            config.maintenance.vacuum_threshold,
            now_epoch_secs(),
            Some(&policy),
        )
        .map_err(|e| anyhow::anyhow!("maintenance cycle failed: {e}"))?
    {
        MaintenanceOutcome::Ran(report) => Ok(report),
        MaintenanceOutcome::Skipped => Ok(MaintenanceReport::default()),
    }
}
