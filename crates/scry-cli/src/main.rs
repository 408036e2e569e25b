//! `scry`: the thin CLI driver over the engine. Subcommand
//! shape and doc-comment register follow `codecompass-cli/src/main.rs`.

mod commands;
mod logging;
mod project;
mod walk;

use clap::{Parser, Subcommand};
use commands::search::OutputFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "scry",
    version,
    about = "Local, offline hybrid code search",
    long_about = "scry indexes a source tree -- files, extracted symbols, lexical full-text\n\
        content, and dense embeddings -- into a persistent local store, then serves\n\
        hybrid lexical + semantic search with reciprocal-rank fusion and MMR\n\
        diversification over it.\n\n\
        Quick start:\n  \
        scry init\n  \
        scry index\n  \
        scry search \"parse incoming request\"\n  \
        scry watch"
)]
struct Cli {
    /// Enable verbose logging (forces debug level regardless of config).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to an explicit config file (default: <root>/.scry/config.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Project root (default: current directory).
    #[arg(short, long, global = true)]
    path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a project: create the metadata directory and default config.
    Init {
        /// Recreate config.toml and the store even if already initialized.
        #[arg(long)]
        force: bool,
    },
    /// Run a full index of the project.
    Index {
        /// Ignore content hashes and discard the existing store/hybrid index first.
        #[arg(long)]
        force: bool,
        /// Override the configured batch size for this run.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Follow symlinks while walking the tree.
        #[arg(long)]
        follow_symlinks: bool,
    },
    /// Incrementally reindex specific files (or the whole tree if none given).
    Refresh {
        /// Paths to reindex; absolute or relative to the current directory.
        files: Vec<String>,
    },
    /// Search the index.
    Search {
        /// The query string (2-2000 characters).
        query: String,
        /// Maximum number of results to return.
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Override the hybrid index's dense-score weight.
        #[arg(long)]
        dense_weight: Option<f32>,
        /// Override the hybrid index's sparse-score weight.
        #[arg(long)]
        sparse_weight: Option<f32>,
        /// Run both lexical and vector retrieval (the default).
        #[arg(long)]
        hybrid: bool,
        /// Disable vector retrieval; lexical (BM25) only.
        #[arg(long, conflicts_with = "vector_only")]
        lexical_only: bool,
        /// Disable lexical retrieval; vector (cosine) only.
        #[arg(long, conflicts_with = "lexical_only")]
        vector_only: bool,
        /// Reserved for a future no-symbol-metadata mode; currently a no-op.
        #[arg(long)]
        no_ast: bool,
        /// Print each result's score breakdown.
        #[arg(long)]
        explain: bool,
        /// Output format.
        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },
    /// Watch the project for changes and reindex incrementally.
    Watch {
        /// Debounce delay in milliseconds (100-10000).
        #[arg(long)]
        delay: Option<u64>,
        /// Maximum events per delivered batch.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Additional ignore patterns (gitignore syntax), may be repeated.
        #[arg(long = "ignore")]
        ignore: Vec<String>,
        /// Accepted for CLI compatibility; not enforced (notify watches recursively).
        #[arg(long)]
        max_depth: Option<u32>,
        /// Report what would be indexed without writing to the store.
        #[arg(long)]
        dry_run: bool,
    },
    /// Check project health: store integrity, foreign keys, and hybrid index state.
    Diagnose {
        /// Run a maintenance cycle and rebuild the hybrid index if it is missing or stale.
        #[arg(long)]
        fix: bool,
        /// Include environment details in the report.
        #[arg(long)]
        report: bool,
        /// Emit machine-readable JSON instead of a human-readable summary.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_file = cli.config.as_ref().map(PathBuf::from);

    // Best-effort full file-backed subscriber: needs
    // a resolved root and config, neither of which may exist yet (e.g. the
    // very first `scry init` in a directory). Fall back to a stdout-only
    // subscriber when resolution fails so every command still logs
    // somewhere; the guards are leaked to keep the non-blocking writers
    // alive for the rest of the process.
    let installed = project::resolve_root(cli.path.clone())
        .ok()
        .and_then(|root| {
            let config = project::load_config(&root, config_file.as_deref()).ok()?;
            let guards = logging::init(&config.logging.level, cli.verbose, &config.logs_dir(&root)).ok()?;
            Some(guards)
        });
    if let Some(guards) = installed {
        std::mem::forget(guards);
    } else {
        let _ = tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
            .try_init();
    }

    match cli.command {
        Commands::Init { force } => commands::init::run(cli.path, config_file.as_deref(), force),
        Commands::Index {
            force,
            batch_size,
            follow_symlinks,
        } => commands::index::run(cli.path, config_file.as_deref(), force, batch_size, follow_symlinks),
        Commands::Refresh { files } => commands::refresh::run(cli.path, config_file.as_deref(), files),
        Commands::Search {
            query,
            limit,
            dense_weight,
            sparse_weight,
            hybrid: _,
            lexical_only,
            vector_only,
            no_ast: _,
            explain,
            format,
        } => commands::search::run(
            cli.path,
            config_file.as_deref(),
            &query,
            limit,
            dense_weight,
            sparse_weight,
            lexical_only,
            vector_only,
            explain,
            format,
        ),
        Commands::Watch {
            delay,
            batch_size,
            ignore,
            max_depth,
            dry_run,
        } => commands::watch::run(cli.path, config_file.as_deref(), delay, batch_size, ignore, max_depth, dry_run),
        Commands::Diagnose { fix, report, json } => commands::diagnose::run(cli.path, config_file.as_deref(), fix, report, json),
    }
}
