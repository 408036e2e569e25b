//! `scry search <query>`: the CLI's thin wrapper over C6's
//! `hybrid_search`. Translates `--lexical-only`/`--vector-only` into
//! [`SearchOptions`], `--dense-weight`/`--sparse-weight` into
//! `HybridIndex`'s own combination weights, and `--limit` into `performance.early_termination_top_k`.

use crate::project;
use anyhow::{Context, Result};
use scry_hybrid::SearchWeights;
use scry_search::{hybrid_search, SearchOptions};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown format {other:?}, expected human|json")),
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    path: Option<String>,
    config_file: Option<&Path>,
    query: &str,
    limit: usize,
    dense_weight: Option<f32>,
    sparse_weight: Option<f32>,
    lexical_only: bool,
    vector_only: bool,
    explain: bool,
    format: OutputFormat,
) -> Result<()> {
    if lexical_only && vector_only {
        anyhow::bail!("--lexical-only and --vector-only are mutually exclusive");
    }

    let root = project::resolve_root(path)?;
    let config = project::load_config(&root, config_file)?;
    let mut ranking_cfg = project::load_ranking_config(&root, &config);
    ranking_cfg.performance.early_termination_top_k = limit;

    let store = project::open_store(&root, &config)?;
    let hybrid = project::open_hybrid_index(&root, &config);
    let embedder = project::build_embedder();

    let vector_weights = match (dense_weight, sparse_weight) {
        (None, None) => None,
        (d, s) => {
            let defaults = SearchWeights::default();
            Some(SearchWeights {
                w_dense: d.unwrap_or(defaults.w_dense),
                w_sparse: s.unwrap_or(defaults.w_sparse),
            })
        }
    };

    let opts = SearchOptions {
        enable_lexical: !vector_only,
        enable_vector: !lexical_only,
        vector_weights,
    };

    let (results, metrics) = hybrid_search(&store, &hybrid, Some(embedder.as_ref()), query, &ranking_cfg, &opts)
        .context("hybrid search failed")?;

    match format {
        OutputFormat::Json => print_json(&results, &metrics)?,
        OutputFormat::Human => print_human(&results, &metrics, explain),
    }
    Ok(())
}

fn print_json(
    results: &[scry_core::types::HybridResult],
    metrics: &scry_core::types::QueryMetrics,
) -> Result<()> {
    let payload = serde_json::json!({
        "results": results,
        "metrics": metrics,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn print_human(results: &[scry_core::types::HybridResult], metrics: &scry_core::types::QueryMetrics, explain: bool) {
    if results.is_empty() {
        println!("No results.");
    }
    for result in results {
        let column = result.column.map(|c| format!(":{c}")).unwrap_or_default();
        println!(
            "{:>2}. {}:{}{}  [{:.4}]",
            result.final_rank, result.file_path, result.line_number, column, result.final_score
        );
        if let Some(name) = &result.symbol_name {
            let kind = result.symbol_type.as_deref().unwrap_or("symbol");
            println!("      {kind} {name}");
        }
        println!("      {}", result.snippet);
        if explain {
            let b = &result.score_breakdown;
            println!(
                "      lexical: rank={:?} contrib={:.6}  vector: rank={:?} contrib={:.6}  tie-break: {:.6}  diversity_penalty: {:?}",
                b.lexical_rank, b.lexical_contribution, b.vector_rank, b.vector_contribution, b.tie_breaker_contribution, b.diversity_penalty
            );
        }
    }
    println!(
        "\n{} result(s) in {}ms (lexical={}ms vector={}ms rank={}ms){}",
        results.len(),
        metrics.total_time_ms,
        metrics.lexical_search_time_ms,
        metrics.vector_search_time_ms,
        metrics.ranking_time_ms,
        metrics
            .fallback_mode
            .as_ref()
            .map(|m| format!(" [fallback: {m}]"))
            .unwrap_or_default()
    );
    if metrics.sla_violation {
        println!("warning: search exceeded its latency budget");
    }
}
