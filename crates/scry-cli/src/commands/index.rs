//! `scry index`: a full tree scan turned into synthetic `Create`
//! batches fed through the same [`IncrementalIndexer`] the watcher uses
//! (`crate::walk`), so a forced full reindex and an incremental `refresh`
//! share one code path end to end.

use crate::project;
use crate::walk;
use anyhow::{Context, Result};
use scry_watch::{IgnoreFilter, IncrementalIndexer, PlainTextParser};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

pub fn run(
    path: Option<String>,
    config_file: Option<&Path>,
    force: bool,
    batch_size: Option<usize>,
    follow_symlinks: bool,
) -> Result<()> {
    let root = project::resolve_root(path)?;
    let config = project::load_config(&root, config_file)?;

    if force {
        let db_path = config.db_path(&root);
        for suffix in ["", "-wal", "-shm"] {
            let candidate = Path::new(&format!("{}{}", db_path.display(), suffix)).to_path_buf();
            let _ = std::fs::remove_file(candidate);
        }
        std::fs::remove_dir_all(config.hybrid_dir(&root)).ok();
        tracing::info!("forced full reindex: existing store and hybrid index discarded");
    }

    let store = project::open_store(&root, &config)?;
    let mut hybrid = project::open_hybrid_index(&root, &config);
    let embedder = project::build_embedder();

    let ignore = Arc::new(
        IgnoreFilter::build(
            &root,
            &config.storage.meta_dir,
            &config.watch.extra_ignore_patterns,
            config.watch.ignore_cache_capacity,
        )
        .context("failed to build ignore filter")?,
    );

    let effective_follow_symlinks = follow_symlinks || config.index.follow_symlinks;
    let paths = walk::scan_paths(&root, &ignore, effective_follow_symlinks);
    let total_files = paths.len();
    let effective_batch_size = batch_size.unwrap_or(config.index.batch_size);
    let batches = walk::batches_for(paths, effective_batch_size);
    let total_batches = batches.len();

    let indexer = IncrementalIndexer::new(
        &root,
        Box::new(PlainTextParser::new(4 * 1024 * 1024)),
        config.index.clone(),
    );

    let start = Instant::now();
    let mut processed = 0u64;
    let mut failed = 0u64;
    let mut skipped = 0u64;
    let mut errors: Vec<String> = Vec::new();

    for batch in &batches {
        let result = indexer.process_batch(&store, &mut hybrid, embedder.as_ref(), batch);
        processed += result.processed;
        failed += result.failed;
        skipped += result.skipped;
        errors.extend(result.errors);
    }

    // The rebuild cadence may leave the last few batches unpersisted;
    // a full reindex promises a fully up-to-date on-disk image when it
    // returns, so force one final rebuild regardless of the counter.
    if let Err(e) = indexer.force_rebuild(&mut hybrid, embedder.as_ref(), project::now_epoch_secs()) {
        errors.push(format!("final hybrid rebuild failed: {e}"));
    }

    let elapsed_ms = start.elapsed().as_millis();
    println!("Indexed {total_files} files across {total_batches} batches in {elapsed_ms}ms");
    println!("  processed: {processed}");
    println!("  skipped:   {skipped}");
    println!("  failed:    {failed}");
    for err in errors.iter().take(10) {
        println!("  error: {err}");
    }

    tracing::info!(
        total_files,
        total_batches,
        processed,
        skipped,
        failed,
        elapsed_ms = elapsed_ms as u64,
        "index run complete"
    );

    if failed > 0 {
        anyhow::bail!("{failed} file(s) failed to index");
    }
    Ok(())
}
