//! `scry refresh [files...]`: incremental reindex. With an
//! explicit file list, builds one batch classifying each path as `Delete`
//! (no longer on disk) or `Create`/`Modify` (present) and applies it
//! directly -- no full tree walk. With no arguments, falls back to the
//! same whole-tree walk `index` uses; the indexer's content-hash compare
//! makes that a no-op for anything unchanged, which is
//! exactly what "incremental" means with no explicit target.

use crate::project;
use crate::walk;
use anyhow::{Context, Result};
use scry_watch::{Batch, ChangeEvent, ChangeKind, IgnoreFilter, IncrementalIndexer, PlainTextParser};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

pub fn run(path: Option<String>, config_file: Option<&Path>, files: Vec<String>) -> Result<()> {
    let root = project::resolve_root(path)?;
    let config = project::load_config(&root, config_file)?;

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

    let indexer = IncrementalIndexer::new(
        &root,
        Box::new(PlainTextParser::new(4 * 1024 * 1024)),
        config.index.clone(),
    );

    let start = Instant::now();
    let batches: Vec<Batch> = if files.is_empty() {
        let paths = walk::scan_paths(&root, &ignore, config.index.follow_symlinks);
        walk::batches_for(paths, config.index.batch_size)
    } else {
        let events = files
            .iter()
            .map(|raw| relative_event_for(&root, raw))
            .collect::<Vec<_>>();
        vec![Batch { events }]
    };

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

    // A one-shot command exits right after this; force the on-disk image
    // current rather than leaving up to `rebuild_every_n_batches - 1`
    // batches of it unpersisted.
    if let Err(e) = indexer.force_rebuild(&mut hybrid, embedder.as_ref(), project::now_epoch_secs()) {
        errors.push(format!("final hybrid rebuild failed: {e}"));
    }

    println!(
        "Refreshed {} path(s) in {}ms: processed={processed} skipped={skipped} failed={failed}",
        files.len().max(batches.iter().map(|b| b.events.len()).sum()),
        start.elapsed().as_millis()
    );
    for err in errors.iter().take(10) {
        println!("  error: {err}");
    }

    if failed > 0 {
        anyhow::bail!("{failed} file(s) failed to refresh");
    }
    Ok(())
}

/// Classifies one caller-supplied path (absolute or relative to the
/// current directory) relative to `root`: a `Delete` event if it is no
/// longer present on disk, `Create`/`Modify` otherwise (the indexer's own
/// hash compare makes the `Create` vs `Modify` distinction immaterial).
fn relative_event_for(root: &Path, raw: &str) -> ChangeEvent {
    let candidate = Path::new(raw);
    let absolute = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(candidate))
            .unwrap_or_else(|_| root.join(candidate))
    };
    let relative = absolute
        .strip_prefix(root)
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|_| raw.replace('\\', "/"));

    let kind = if absolute.exists() {
        ChangeKind::Modify
    } else {
        ChangeKind::Delete
    };
    ChangeEvent {
        path: relative,
        kind,
        high_priority: true,
    }
}
