//! `scry watch`: starts [`WatcherPipeline`], drains its
//! batches through [`IncrementalIndexer`] until interrupted. Graceful
//! shutdown -- stop accepting new events, drain what's in
//! flight, close the store -- is driven by a ctrl-c signal observed on a
//! side thread so the batch-draining loop itself stays plain, synchronous
//! `std::sync::mpsc`, matching the rest of this pipeline.

use crate::project;
use anyhow::{Context, Result};
use scry_watch::{IgnoreFilter, IncrementalIndexer, PlainTextParser, WatcherAlert, WatcherPipeline};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[allow(clippy::too_many_arguments)]
pub fn run(
    path: Option<String>,
    config_file: Option<&Path>,
    delay_ms: Option<u64>,
    batch_size: Option<usize>,
    extra_ignore: Vec<String>,
    max_depth: Option<u32>,
    dry_run: bool,
) -> Result<()> {
    let root = project::resolve_root(path)?;
    let mut config = project::load_config(&root, config_file)?;
    if let Some(delay) = delay_ms {
        config.watch.debounce_delay_ms = delay;
    }
    if let Some(bs) = batch_size {
        config.watch.batch_size = bs;
    }
    config.watch.extra_ignore_patterns.extend(extra_ignore);
    if let Some(depth) = max_depth {
        // notify watches the whole tree recursively; depth limiting would
        // require filtering events by component count in translate_event.
        // Logged so the operator knows the flag is accepted but not enforced.
        tracing::warn!(max_depth = depth, "--max-depth is not enforced by the filesystem watcher");
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

    let indexer = IncrementalIndexer::new(
        &root,
        Box::new(PlainTextParser::new(4 * 1024 * 1024)),
        config.index.clone(),
    );

    let mut pipeline = WatcherPipeline::new(&root, config.watch.clone(), Arc::clone(&ignore));
    pipeline.start().context("failed to start filesystem watcher")?;

    println!(
        "Watching {} (debounce={}ms, batch_size={}){}",
        root.display(),
        config.watch.debounce_delay_ms,
        config.watch.batch_size,
        if dry_run { ", dry-run" } else { "" }
    );
    println!("Press Ctrl-C to stop.");

    let mut last_maintenance = std::time::Instant::now();
    let maintenance_interval = Duration::from_secs(config.maintenance.interval_secs);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build signal-handling runtime");
            rt.block_on(async {
                let _ = tokio::signal::ctrl_c().await;
            });
            shutdown.store(true, Ordering::SeqCst);
        });
    }

    while !shutdown.load(Ordering::SeqCst) {
        while let Some(alert) = pipeline.try_recv_alert() {
            match alert {
                WatcherAlert::Memory(e) => tracing::warn!(error = %e, "watcher memory alert"),
                WatcherAlert::QueueOverflow { pending, shed } => {
                    tracing::warn!(pending, shed, "watcher event queue overflow");
                }
            }
        }

        match pipeline.recv_batch(Duration::from_millis(200)) {
            Some(batch) if dry_run => {
                for event in &batch.events {
                    println!("  {:?} {}", event.kind, event.path);
                }
            }
            Some(batch) => {
                let result = indexer.process_batch(&store, &mut hybrid, embedder.as_ref(), &batch);
                if result.processed > 0 || result.failed > 0 || result.skipped > 0 {
                    tracing::info!(
                        processed = result.processed,
                        skipped = result.skipped,
                        failed = result.failed,
                        duration_ms = result.duration_ms,
                        "watch batch applied"
                    );
                }
                for err in &result.errors {
                    tracing::warn!(error = %err, "watch batch error");
                }
            }
            None => {}
        }

        if !dry_run && last_maintenance.elapsed() >= maintenance_interval {
            last_maintenance = std::time::Instant::now();
            match project::run_maintenance(&root, &config, &store) {
                Ok(report) => {
                    if report.analyzed {
                        tracing::info!(
                            files_hard_deleted = report.files_hard_deleted,
                            symbols_hard_deleted = report.symbols_hard_deleted,
                            chunks_hard_deleted = report.chunks_hard_deleted,
                            vacuumed = report.vacuumed,
                            backups_pruned = report.backups_pruned,
                            "maintenance cycle complete"
                        );
                    }
                }
                Err(e) => tracing::warn!(error = %e, "maintenance cycle failed"),
            }
        }
    }

    println!("\nShutting down watcher...");
    pipeline.stop();
    if !dry_run {
        if let Err(e) = indexer.force_rebuild(&mut hybrid, embedder.as_ref(), project::now_epoch_secs()) {
            tracing::warn!(error = %e, "final hybrid rebuild on shutdown failed");
        }
    }
    Ok(())
}
