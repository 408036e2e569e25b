//! End-to-end lifecycle tests exercising the engine's own library crates
//! directly (store, watch, hybrid, search) the way a real `init` ->
//! `index` -> `search` CLI session would, without going through the
//! binary's own argument parsing.

use scry_core::config::Config;
use scry_hybrid::{CircuitBreakerEmbedder, Embedder, HashingEmbedder, HybridIndex};
use scry_search::{hybrid_search, SearchOptions};
use scry_store::maintenance::{BackupPolicy, MaintenanceOutcome, MaintenanceScheduler};
use scry_store::Store;
use scry_watch::{Batch, ChangeEvent, ChangeKind, IgnoreFilter, IncrementalIndexer, PlainTextParser};
use std::sync::Arc;
use tempfile::tempdir;

fn write_project(root: &std::path::Path) {
    std::fs::write(
        root.join("parser.rs"),
        "pub fn parse_request(bytes: &[u8]) -> Result<Request, ParseError> {\n    todo!()\n}\n",
    )
    .unwrap();
    std::fs::write(
        root.join("server.rs"),
        "pub fn handle_connection(stream: TcpStream) {\n    // accept loop\n}\n",
    )
    .unwrap();
}

fn default_embedder() -> Box<dyn Embedder> {
    let mut embedder = CircuitBreakerEmbedder::new(
        HashingEmbedder::new(scry_core::constants::DEFAULT_EMBEDDING_DIM),
        scry_core::circuit::CircuitBreakerConfig::default(),
    );
    embedder.init().unwrap();
    Box::new(embedder)
}

#[test]
fn init_index_and_search_round_trip() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_project(root);

    let config = Config::default();
    std::fs::create_dir_all(config.meta_dir(root)).unwrap();
    let store = Store::open(&config.db_path(root), &config.storage).unwrap();
    let mut hybrid = HybridIndex::new(
        config.hybrid_dir(root),
        scry_core::constants::DEFAULT_EMBEDDING_DIM,
        scry_sparse::SparseConfig::default(),
    );
    let embedder = default_embedder();

    let ignore = Arc::new(
        IgnoreFilter::build(root, &config.storage.meta_dir, &[], config.watch.ignore_cache_capacity).unwrap(),
    );
    assert!(!ignore.is_ignored("parser.rs", false));

    let batch = Batch {
        events: vec![
            ChangeEvent { path: "parser.rs".into(), kind: ChangeKind::Create, high_priority: false },
            ChangeEvent { path: "server.rs".into(), kind: ChangeKind::Create, high_priority: false },
        ],
    };

    let indexer = IncrementalIndexer::new(root, Box::new(PlainTextParser::new(1_048_576)), config.index.clone());
    let result = indexer.process_batch(&store, &mut hybrid, embedder.as_ref(), &batch);
    assert_eq!(result.processed, 2);
    assert_eq!(result.failed, 0);

    let (results, metrics) = hybrid_search(
        &store,
        &hybrid,
        Some(embedder.as_ref()),
        "parse_request",
        &config.ranking,
        &SearchOptions::default(),
    )
    .unwrap();

    assert!(!results.is_empty(), "expected at least one hit for parse_request");
    assert!(results.iter().any(|r| r.file_path == "parser.rs"));
    assert!(metrics.total_time_ms < 5_000);
}

#[test]
fn reindexing_unchanged_content_is_a_no_op() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_project(root);

    let config = Config::default();
    std::fs::create_dir_all(config.meta_dir(root)).unwrap();
    let store = Store::open(&config.db_path(root), &config.storage).unwrap();
    let mut hybrid = HybridIndex::new(
        config.hybrid_dir(root),
        scry_core::constants::DEFAULT_EMBEDDING_DIM,
        scry_sparse::SparseConfig::default(),
    );
    let embedder = default_embedder();
    let indexer = IncrementalIndexer::new(root, Box::new(PlainTextParser::new(1_048_576)), config.index.clone());

    let batch = Batch {
        events: vec![ChangeEvent { path: "parser.rs".into(), kind: ChangeKind::Create, high_priority: false }],
    };
    let first = indexer.process_batch(&store, &mut hybrid, embedder.as_ref(), &batch);
    assert_eq!(first.processed, 1);

    let second = indexer.process_batch(&store, &mut hybrid, embedder.as_ref(), &batch);
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 1);
}

#[test]
fn deleting_a_file_removes_it_from_search_results() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_project(root);

    let config = Config::default();
    std::fs::create_dir_all(config.meta_dir(root)).unwrap();
    let store = Store::open(&config.db_path(root), &config.storage).unwrap();
    let mut hybrid = HybridIndex::new(
        config.hybrid_dir(root),
        scry_core::constants::DEFAULT_EMBEDDING_DIM,
        scry_sparse::SparseConfig::default(),
    );
    let embedder = default_embedder();
    let indexer = IncrementalIndexer::new(root, Box::new(PlainTextParser::new(1_048_576)), config.index.clone());

    let create_batch = Batch {
        events: vec![ChangeEvent { path: "parser.rs".into(), kind: ChangeKind::Create, high_priority: false }],
    };
    indexer.process_batch(&store, &mut hybrid, embedder.as_ref(), &create_batch);

    std::fs::remove_file(root.join("parser.rs")).unwrap();
    let delete_batch = Batch {
        events: vec![ChangeEvent { path: "parser.rs".into(), kind: ChangeKind::Delete, high_priority: false }],
    };
    let result = indexer.process_batch(&store, &mut hybrid, embedder.as_ref(), &delete_batch);
    assert_eq!(result.processed, 1);

    let (results, _) = hybrid_search(
        &store,
        &hybrid,
        Some(embedder.as_ref()),
        "parse_request",
        &config.ranking,
        &SearchOptions::default(),
    )
    .unwrap();
    assert!(results.iter().all(|r| r.file_path != "parser.rs"));
}

#[test]
fn maintenance_cycle_snapshots_a_backup_and_hard_deletes_after_retention() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_project(root);

    let config = Config::default();
    std::fs::create_dir_all(config.meta_dir(root)).unwrap();
    let store = Store::open(&config.db_path(root), &config.storage).unwrap();
    let mut hybrid = HybridIndex::new(
        config.hybrid_dir(root),
        scry_core::constants::DEFAULT_EMBEDDING_DIM,
        scry_sparse::SparseConfig::default(),
    );
    let embedder = default_embedder();
    let indexer = IncrementalIndexer::new(root, Box::new(PlainTextParser::new(1_048_576)), config.index.clone());

    let create_batch = Batch {
        events: vec![ChangeEvent { path: "parser.rs".into(), kind: ChangeKind::Create, high_priority: false }],
    };
    indexer.process_batch(&store, &mut hybrid, embedder.as_ref(), &create_batch);

    std::fs::remove_file(root.join("parser.rs")).unwrap();
    let delete_batch = Batch {
        events: vec![ChangeEvent { path: "parser.rs".into(), kind: ChangeKind::Delete, high_priority: false }],
    };
    indexer.process_batch(&store, &mut hybrid, embedder.as_ref(), &delete_batch);

    let backups_dir = config.backups_dir(root);
    let policy = BackupPolicy {
        backups_dir: backups_dir.clone(),
        basename: "index".to_string(),
        retention_count: 5,
    };
    let scheduler = MaintenanceScheduler::new();
    // retention_days=0 and a "now" far past the soft-delete timestamp so
    // the just-deleted file is immediately eligible for hard deletion.
    let far_future = 10 * 365 * 86_400;
    let outcome = scheduler.run(&store.lock, 0, 1_000_000, far_future, Some(&policy)).unwrap();
    let MaintenanceOutcome::Ran(report) = outcome else {
        panic!("expected the maintenance cycle to run");
    };

    assert_eq!(report.files_hard_deleted, 1);
    assert!(report.analyzed);
    let backup_path = report.backup_path.expect("a backup policy was supplied");
    assert!(backup_path.exists());
    assert!(backup_path.starts_with(&backups_dir));
}
