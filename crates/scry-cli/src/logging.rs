//! Subscriber setup. One human
//! fmt layer on stdout, plus one non-blocking JSON file layer per named log
//! file, each filtered to the events relevant to it by target/level. Callers
//! must keep the returned guards alive for the process's lifetime — dropping
//! one flushes and closes its writer.

use std::path::Path;
use tracing_subscriber::filter::{filter_fn, LevelFilter};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Holds the non-blocking writer guards so `main` can keep them alive for
/// the whole run; dropping this flushes every log file.
#[must_use]
pub struct LogGuards {
    _telemetry: tracing_appender::non_blocking::WorkerGuard,
    _slow_queries: tracing_appender::non_blocking::WorkerGuard,
    _db_errors: tracing_appender::non_blocking::WorkerGuard,
    _search_performance: tracing_appender::non_blocking::WorkerGuard,
}

/// Installs the global subscriber. `level` is the configured default
/// (`config.logging.level`); `--verbose` forces `debug` regardless.
pub fn init(level: &str, verbose: bool, logs_dir: &Path) -> anyhow::Result<LogGuards> {
    std::fs::create_dir_all(logs_dir)?;

    let default_level = if verbose { "debug" } else { level };
    let stdout_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .with_filter(stdout_filter);

    let (telemetry_writer, telemetry_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(logs_dir, "telemetry.jsonl"));
    let telemetry_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(telemetry_writer)
        .with_filter(LevelFilter::INFO);

    let (slow_writer, slow_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(logs_dir, "slow-queries.jsonl"));
    let slow_queries_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(slow_writer)
        .with_filter(filter_fn(|meta| meta.target() == "scry_search::lexical"));

    let (db_writer, db_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(logs_dir, "db-errors.jsonl"));
    let db_errors_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(db_writer)
        .with_filter(filter_fn(|meta| {
            meta.target().starts_with("scry_store") && *meta.level() <= tracing::Level::WARN
        }));

    let (perf_writer, perf_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(logs_dir, "search-performance.jsonl"));
    let search_performance_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(perf_writer)
        .with_filter(filter_fn(|meta| meta.target() == "scry_search::ranking"));

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(telemetry_layer)
        .with(slow_queries_layer)
        .with(db_errors_layer)
        .with(search_performance_layer)
        .init();

    Ok(LogGuards {
        _telemetry: telemetry_guard,
        _slow_queries: slow_guard,
        _db_errors: db_guard,
        _search_performance: perf_guard,
    })
}
