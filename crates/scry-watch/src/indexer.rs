//! C8: the incremental indexer. Consumes one watcher batch at a
//! time: partitions it into deletions/renames-away and added/modified/
//! renamed-into paths, reads + hashes + parses the latter in parallel,
//! then applies the whole batch to the store (C1) in one write-lock
//! transaction so readers never observe a half-applied batch. Live
//! upserts are mirrored into the hybrid index (C4) only after that
//! transaction commits.

use crate::event::ChangeKind;
use crate::parser::Parser;
use crate::pipeline::Batch;
use rayon::prelude::*;
use scry_core::config::IndexConfig;
use scry_core::error::{FileAccessError, StoreError};
use scry_core::ids;
use scry_core::retry::{RetryConfig, RetryableError, with_retry};
use scry_core::types::{Chunk, Embedding, File, ParseResult, Symbol};
use scry_hybrid::embedder::Embedder;
use scry_hybrid::index::HybridIndex;
use scry_sparse::text::ast_to_text;
use scry_store::Store;
use scry_store::repo::{chunks, embeddings, files, search, symbols};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

/// Result of applying one batch: "processed, failed, skipped,
/// duration_ms, errors[]".
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

struct PreparedUpsert {
    path: String,
    content: Vec<u8>,
    content_hash: String,
    parsed: ParseResult,
    size_bytes: u64,
}

enum PrepareOutcome {
    Ready(PreparedUpsert),
    Skipped(String),
    Failed(String),
}

/// Diff-aware re-parse + re-embed + store write under the single-writer
/// lock. Owns the external parser; the hybrid index and
/// embedder are borrowed per call so the caller controls their lifetime
/// (typically held for the whole watch session).
pub struct IncrementalIndexer {
    root: PathBuf,
    parser: Box<dyn Parser>,
    config: IndexConfig,
    retry_cfg: RetryConfig,
    batches_since_persist: Mutex<u32>,
}

impl IncrementalIndexer {
    pub fn new(root: impl Into<PathBuf>, parser: Box<dyn Parser>, config: IndexConfig) -> Self {
        Self {
            root: root.into(),
            parser,
            config,
            retry_cfg: RetryConfig {
                max_retries: 3,
                initial_delay_ms: 20,
                multiplier: 2.0,
                max_delay_ms: 500,
                jitter: true,
            },
            batches_since_persist: Mutex::new(0),
        }
    }

    /// Applies one batch end to end. Never panics on a single file's
    /// failure — permanent errors are recorded in `errors` and the rest of
    /// the batch continues.
    pub fn process_batch(
        &self,
        store: &Store,
        hybrid: &mut HybridIndex,
        embedder: &dyn Embedder,
        batch: &Batch,
    ) -> BatchResult {
        let start = Instant::now();
        let mut result = BatchResult::default();

        let mut deleted_paths: Vec<String> = Vec::new();
        let mut upsert_paths: Vec<String> = Vec::new();
        for event in &batch.events {
            match &event.kind {
                ChangeKind::Delete => deleted_paths.push(event.path.clone()),
                ChangeKind::Rename { old_path } => {
                    deleted_paths.push(old_path.clone());
                    upsert_paths.push(event.path.clone());
                }
                ChangeKind::Create | ChangeKind::Modify => upsert_paths.push(event.path.clone()),
            }
        }

        self.apply_deletions(store, hybrid, &deleted_paths, &mut result);
        self.apply_upserts(store, hybrid, embedder, &upsert_paths, &mut result);

        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }

    /// Forces an on-disk `rebuild()` right now regardless of the cadence
    /// counter, and resets it. Callers that are about to stop processing
    /// batches (a full reindex finishing, `watch` shutting down) use this
    /// so the on-disk image never lags the in-memory one for longer than
    /// the process is alive.
    pub fn force_rebuild(&self, hybrid: &mut HybridIndex, embedder: &dyn Embedder, now: i64) -> Result<(), scry_hybrid::HybridIndexError> {
        *self.batches_since_persist.lock().expect("rebuild counter poisoned") = 0;
        hybrid.rebuild(embedder, now)
    }

    /// Step 2 of : soft-delete the File row and its dependent
    /// Chunks/Symbols, drop the FTS rows, and remove the matching entry
    /// from the hybrid index, all within one write-lock transaction.
    fn apply_deletions(
        &self,
        store: &Store,
        hybrid: &mut HybridIndex,
        deleted_paths: &[String],
        result: &mut BatchResult,
    ) {
        if deleted_paths.is_empty() {
            return;
        }
        let now = now_seconds();
        let outcome = store.with_write_lock(|conn| -> Result<Vec<String>, StoreError> {
            let mut removed_hybrid_ids = Vec::new();
            for path in deleted_paths {
                if let Some(file) = files::find_by_path(conn, path)? {
                    files::soft_delete(conn, &file.id, now)?;
                    symbols::soft_delete_for_file(conn, &file.id, now)?;
                    chunks::soft_delete_for_file(conn, &file.id, now)?;
                    search::delete_for_file(conn, &file.id)?;
                    removed_hybrid_ids.push(whole_file_chunk_id(&file.id, path));
                }
            }
            Ok(removed_hybrid_ids)
        });

        match outcome {
            Ok(removed_hybrid_ids) => {
                for hybrid_id in &removed_hybrid_ids {
                    hybrid.remove(hybrid_id);
                }
                result.processed += deleted_paths.len() as u64;
            }
            Err(e) => {
                tracing::warn!(error = %e, count = deleted_paths.len(), "deletion batch failed");
                result.failed += deleted_paths.len() as u64;
                result.errors.push(format!("delete batch failed: {e}"));
            }
        }
    }

    /// For `added`/`modified`/`renamed.new`: read, hash-compare, parse
    /// (in parallel), then upsert everything that actually changed in one
    /// transaction, then mirror into the hybrid index and flush its
    /// pending queue.
    fn apply_upserts(
        &self,
        store: &Store,
        hybrid: &mut HybridIndex,
        embedder: &dyn Embedder,
        upsert_paths: &[String],
        result: &mut BatchResult,
    ) {
        if upsert_paths.is_empty() {
            return;
        }

        let prepared: Vec<(String, PrepareOutcome)> = upsert_paths
            .par_iter()
            .map(|path| (path.clone(), self.prepare_file(path)))
            .collect();

        let mut ready: Vec<PreparedUpsert> = Vec::new();
        for (path, outcome) in prepared {
            match outcome {
                PrepareOutcome::Ready(prep) => {
                    match store.with_connection(|conn| files::find_by_path(conn, &path)) {
                        Ok(Some(existing)) if existing.content_hash == prep.content_hash => {
                            result.skipped += 1;
                        }
                        Ok(_) => ready.push(prep),
                        Err(e) => {
                            result.failed += 1;
                            result.errors.push(format!("{path}: lookup failed: {e}"));
                        }
                    }
                }
                PrepareOutcome::Skipped(reason) => {
                    result.skipped += 1;
                    tracing::debug!(path = %path, reason, "skipping file");
                }
                PrepareOutcome::Failed(reason) => {
                    result.failed += 1;
                    result.errors.push(format!("{path}: {reason}"));
                }
            }
        }

        if ready.is_empty() {
            return;
        }

        let now = now_seconds();
        let txn_result = store.with_write_lock(|conn| -> Result<Vec<(String, String, ParseResult)>, StoreError> {
            let mut applied = Vec::new();
            for prep in &ready {
                applied.push(upsert_one(conn, prep, now)?);
            }
            Ok(applied)
        });

        match txn_result {
            Ok(applied) => {
                for (hybrid_id, path, parsed) in &applied {
                    hybrid.add(hybrid_id.clone(), path, parsed);
                }
                result.processed += applied.len() as u64;

                match hybrid.flush(embedder) {
                    Ok(_) => {
                        self.persist_dense_vectors(store, hybrid, &applied, now);
                        self.maybe_rebuild(hybrid, embedder, now, result);
                    }
                    Err(e) => result.errors.push(format!("hybrid flush failed: {e}")),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, count = ready.len(), "upsert batch failed");
                result.failed += ready.len() as u64;
                result.errors.push(format!("upsert batch failed: {e}"));
            }
        }
    }

    /// `flush()` only ever touches the in-memory image; this issues the
    /// actual on-disk `rebuild()` no more often than every
    /// `rebuild_every_n_batches` upsert batches, bounding disk write
    /// amplification while `search()` keeps seeing every batch's in-memory
    /// mutation immediately.
    fn maybe_rebuild(&self, hybrid: &mut HybridIndex, embedder: &dyn Embedder, now: i64, result: &mut BatchResult) {
        let mut counter = self.batches_since_persist.lock().expect("rebuild counter poisoned");
        *counter += 1;
        if *counter < self.config.rebuild_every_n_batches.max(1) {
            return;
        }
        *counter = 0;
        drop(counter);

        match hybrid.rebuild(embedder, now) {
            Ok(()) => tracing::debug!("hybrid index rebuild cadence reached; on-disk image updated"),
            Err(e) => result.errors.push(format!("hybrid rebuild failed: {e}")),
        }
    }

    /// Writes the dense vector [`HybridIndex::flush`] just computed for
    /// each applied file back into the relational `embeddings` table
    ///, keyed by the same whole-file chunk id
    /// used as the hybrid index's row key, so the FK to `chunks` holds.
    fn persist_dense_vectors(
        &self,
        store: &Store,
        hybrid: &HybridIndex,
        applied: &[(String, String, ParseResult)],
        now: i64,
    ) {
        if !hybrid.dense_available() {
            return;
        }
        let outcome = store.with_write_lock(|conn| -> Result<(), StoreError> {
            for (hybrid_id, _, _) in applied {
                if let Some(vector) = hybrid.dense_row(hybrid_id) {
                    embeddings::insert(
                        conn,
                        &Embedding {
                            chunk_id: hybrid_id.clone(),
                            vector: vector.to_vec(),
                            model: "hybrid".to_string(),
                            created_at: now,
                        },
                    )?;
                }
            }
            Ok(())
        });
        if let Err(e) = outcome {
            tracing::warn!(error = %e, "failed to persist dense vectors");
        }
    }

    /// Reads, size/binary-checks, and parses one file. Transient read
    /// errors are retried with backoff; anything
    /// else (permission denied, parse failure) is recorded and the caller
    /// skips this file without aborting the batch.
    fn prepare_file(&self, path: &str) -> PrepareOutcome {
        let full_path = self.root.join(path);
        let read_result = with_retry(
            &self.retry_cfg,
            || {
                std::fs::read(&full_path).map_err(|e| FileAccessError::Io {
                    operation: "read".to_string(),
                    path: path.to_string(),
                    cause: e.to_string(),
                })
            },
            |err: &FileAccessError| {
                if err.is_retryable() {
                    RetryableError::retryable()
                } else {
                    RetryableError::permanent()
                }
            },
        );

        let content = match read_result {
            Ok(c) => c,
            Err(FileAccessError::Io { cause, .. }) if cause.contains("No such file") => {
                // The watcher observed a create/modify for a path that is
                // already gone by the time we got to it; this is a
                // detected-deletion race, not a permanent error.
                return PrepareOutcome::Skipped("path no longer exists".to_string());
            }
            Err(e) => return PrepareOutcome::Failed(e.to_string()),
        };

        if content.len() as u64 > self.config.max_file_size_bytes {
            return PrepareOutcome::Skipped(format!(
                "file too large: {} bytes > limit {}",
                content.len(),
                self.config.max_file_size_bytes
            ));
        }
        if looks_binary(&content) {
            return PrepareOutcome::Skipped("binary file".to_string());
        }

        let parsed = match self.parser.parse(path, &content) {
            Ok(p) => p,
            Err(e) => return PrepareOutcome::Failed(e.to_string()),
        };

        let content_hash = ids::content_hash(&content);
        let size_bytes = content.len() as u64;
        PrepareOutcome::Ready(PreparedUpsert {
            path: path.to_string(),
            content,
            content_hash,
            parsed,
            size_bytes,
        })
    }
}

/// Upserts one file's File/Symbol/Chunk/FTS rows inside an already-open
/// transaction. Returns the hybrid-index row key (the
/// whole-file chunk id), the path, and the `ParseResult` so the caller can
/// mirror it into the hybrid index after the transaction commits.
fn upsert_one(conn: &rusqlite::Connection, prep: &PreparedUpsert, now: i64) -> Result<(String, String, ParseResult), StoreError> {
    let file_id = ids::file_id(&prep.path);
    let file = File {
        id: file_id.clone(),
        path: prep.path.clone(),
        content_hash: prep.content_hash.clone(),
        language: Some(prep.parsed.language.clone()),
        size_bytes: prep.size_bytes,
        modified_at: now,
        indexed_at: now,
        deleted_at: None,
    };
    files::insert(conn, &file)?;
    symbols::delete_for_file(conn, &file_id)?;
    chunks::delete_for_file(conn, &file_id)?;
    search::delete_for_file(conn, &file_id)?;

    for parsed_symbol in &prep.parsed.doc.symbols {
        let qualified = if parsed_symbol.parents.is_empty() {
            parsed_symbol.name.clone()
        } else {
            format!("{}::{}", parsed_symbol.parents.join("::"), parsed_symbol.name)
        };
        let symbol_id = ids::symbol_id(&file_id, &qualified, parsed_symbol.span.start_byte);
        let symbol = Symbol {
            id: symbol_id.clone(),
            file_id: file_id.clone(),
            name: parsed_symbol.name.clone(),
            kind: parsed_symbol.kind,
            span: parsed_symbol.span.clone(),
            parents: parsed_symbol.parents.clone(),
            signature: parsed_symbol.signature.clone(),
            documentation: parsed_symbol.documentation.clone(),
            content_hash: ids::content_hash(qualified.as_bytes()),
            deleted_at: None,
        };
        symbols::insert(conn, &symbol)?;

        let anchor = format!(
            "{}:{}:{}",
            prep.path, parsed_symbol.span.start_line, parsed_symbol.span.start_column
        );
        let chunk_text = parsed_symbol
            .signature
            .clone()
            .unwrap_or_else(|| parsed_symbol.name.clone());
        let chunk_id = ids::chunk_id(&file_id, &anchor);
        chunks::insert(
            conn,
            &Chunk {
                id: chunk_id.clone(),
                file_id: file_id.clone(),
                symbol_id: Some(symbol_id.clone()),
                text: chunk_text.clone(),
                documentation: parsed_symbol.documentation.clone(),
                anchor,
                deleted_at: None,
            },
        )?;
        search::index(
            conn,
            &search::IndexRow {
                content: &chunk_text,
                documentation: parsed_symbol.documentation.as_deref(),
                file_id: &file_id,
                symbol_id: Some(&symbol_id),
                file_path: &prep.path,
            },
        )?;
    }

    // A whole-file chunk in addition to per-symbol ones, so files with no
    // extracted symbols (or no real grammar wired in) are still
    // searchable. This is also the hybrid index's row key for the file.
    let whole_file_anchor = format!("{}:1:0", prep.path);
    let whole_file_id = ids::chunk_id(&file_id, &whole_file_anchor);
    let whole_file_text = ast_to_text(&prep.path, &prep.parsed);
    chunks::insert(
        conn,
        &Chunk {
            id: whole_file_id.clone(),
            file_id: file_id.clone(),
            symbol_id: None,
            text: whole_file_text.clone(),
            documentation: None,
            anchor: whole_file_anchor,
            deleted_at: None,
        },
    )?;
    search::index(
        conn,
        &search::IndexRow {
            content: &whole_file_text,
            documentation: None,
            file_id: &file_id,
            symbol_id: None,
            file_path: &prep.path,
        },
    )?;

    Ok((whole_file_id, prep.path.clone(), prep.parsed.clone()))
}

fn whole_file_chunk_id(file_id: &str, path: &str) -> String {
    ids::chunk_id(file_id, &format!("{path}:1:0"))
}

/// Heuristic binary-file detector: a NUL byte in the first 8KiB. Matches
/// the common `git`/`ripgrep`-style heuristic rather than a full charset
/// sniff, which this indexer has no real use for.
fn looks_binary(content: &[u8]) -> bool {
    let probe = &content[..content.len().min(8192)];
    probe.contains(&0)
}

fn now_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeEvent;
    use crate::parser::PlainTextParser;
    use scry_core::config::{IndexConfig, StorageConfig};
    use scry_hybrid::HashingEmbedder;
    use scry_sparse::SparseConfig;
    use tempfile::tempdir;

    fn indexer() -> (tempfile::TempDir, IncrementalIndexer) {
        let dir = tempdir().unwrap();
        let idx = IncrementalIndexer::new(dir.path(), Box::new(PlainTextParser::new(1_000_000)), IndexConfig::default());
        (dir, idx)
    }

    fn hybrid(dir: &std::path::Path) -> HybridIndex {
        HybridIndex::new(dir.join("hybrid"), 64, SparseConfig::default())
    }

    #[test]
    fn added_file_is_indexed_and_searchable_via_hybrid() {
        let (dir, indexer) = indexer();
        std::fs::write(dir.path().join("a.rs"), b"fn foo() {}\n").unwrap();

        let store = Store::open(&dir.path().join("index.db"), &StorageConfig::default()).unwrap();
        let mut hy = hybrid(dir.path());
        let mut embedder = HashingEmbedder::new(64);
        embedder.init().unwrap();

        let batch = Batch {
            events: vec![ChangeEvent {
                path: "a.rs".to_string(),
                kind: ChangeKind::Create,
                high_priority: false,
            }],
        };

        let result = indexer.process_batch(&store, &mut hy, &embedder, &batch);
        assert_eq!(result.processed, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(hy.len(), 1);

        let file = store.with_connection(|conn| files::find_by_path(conn, "a.rs")).unwrap();
        assert!(file.is_some());
    }

    #[test]
    fn unchanged_content_is_skipped_on_second_pass() {
        let (dir, indexer) = indexer();
        std::fs::write(dir.path().join("a.rs"), b"fn foo() {}\n").unwrap();
        let store = Store::open(&dir.path().join("index.db"), &StorageConfig::default()).unwrap();
        let mut hy = hybrid(dir.path());
        let mut embedder = HashingEmbedder::new(64);
        embedder.init().unwrap();

        let batch = Batch {
            events: vec![ChangeEvent {
                path: "a.rs".to_string(),
                kind: ChangeKind::Create,
                high_priority: false,
            }],
        };
        indexer.process_batch(&store, &mut hy, &embedder, &batch);

        let modify_batch = Batch {
            events: vec![ChangeEvent {
                path: "a.rs".to_string(),
                kind: ChangeKind::Modify,
                high_priority: false,
            }],
        };
        let second = indexer.process_batch(&store, &mut hy, &embedder, &modify_batch);
        assert_eq!(second.skipped, 1);
        assert_eq!(second.processed, 0);
    }

    #[test]
    fn deleted_file_soft_deletes_and_removes_from_hybrid() {
        let (dir, indexer) = indexer();
        std::fs::write(dir.path().join("a.rs"), b"fn foo() {}\n").unwrap();
        let store = Store::open(&dir.path().join("index.db"), &StorageConfig::default()).unwrap();
        let mut hy = hybrid(dir.path());
        let mut embedder = HashingEmbedder::new(64);
        embedder.init().unwrap();

        indexer.process_batch(
            &store,
            &mut hy,
            &embedder,
            &Batch {
                events: vec![ChangeEvent {
                    path: "a.rs".to_string(),
                    kind: ChangeKind::Create,
                    high_priority: false,
                }],
            },
        );
        assert_eq!(hy.len(), 1);

        let delete_result = indexer.process_batch(
            &store,
            &mut hy,
            &embedder,
            &Batch {
                events: vec![ChangeEvent {
                    path: "a.rs".to_string(),
                    kind: ChangeKind::Delete,
                    high_priority: false,
                }],
            },
        );
        assert_eq!(delete_result.processed, 1);
        assert_eq!(hy.len(), 0);

        let file = store.with_connection(|conn| files::find_by_path(conn, "a.rs")).unwrap();
        assert!(file.is_none());
    }

    #[test]
    fn oversized_file_is_skipped_not_failed() {
        let (dir, _indexer) = indexer();
        let small_limit = IncrementalIndexer::new(
            dir.path(),
            Box::new(PlainTextParser::new(1_000_000)),
            IndexConfig {
                max_file_size_bytes: 4,
                ..IndexConfig::default()
            },
        );
        std::fs::write(dir.path().join("big.rs"), b"0123456789").unwrap();
        let store = Store::open(&dir.path().join("index.db"), &StorageConfig::default()).unwrap();
        let mut hy = hybrid(dir.path());
        let mut embedder = HashingEmbedder::new(64);
        embedder.init().unwrap();

        let result = small_limit.process_batch(
            &store,
            &mut hy,
            &embedder,
            &Batch {
                events: vec![ChangeEvent {
                    path: "big.rs".to_string(),
                    kind: ChangeKind::Create,
                    high_priority: false,
                }],
            },
        );
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failed, 0);
    }

    #[test]
    fn binary_file_is_skipped() {
        let (dir, indexer) = indexer();
        std::fs::write(dir.path().join("bin.dat"), [0u8, 1, 2, 0, 3]).unwrap();
        let store = Store::open(&dir.path().join("index.db"), &StorageConfig::default()).unwrap();
        let mut hy = hybrid(dir.path());
        let mut embedder = HashingEmbedder::new(64);
        embedder.init().unwrap();

        let result = indexer.process_batch(
            &store,
            &mut hy,
            &embedder,
            &Batch {
                events: vec![ChangeEvent {
                    path: "bin.dat".to_string(),
                    kind: ChangeKind::Create,
                    high_priority: false,
                }],
            },
        );
        assert_eq!(result.skipped, 1);
    }
}
