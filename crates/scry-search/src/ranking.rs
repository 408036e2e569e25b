//! C6: the hybrid retrieval and ranker. Runs C5
//! (lexical) and C4 (vector, via `HybridIndex`) concurrently against a
//! shared time budget, fuses them with Reciprocal Rank Fusion, breaks
//! near-ties with a small weighted panel of signals, diversifies the result
//! set with MMR, and truncates to the caller's early-termination window.
//!
//! Code shape (small scoring structs, deterministic id tie-break on sort,
//! bounded pure helper functions) follows `cruxe-query/src/ranking.rs`.

use crate::lexical::{self, LexicalHit, SnippetOptions};
use rusqlite::Connection;
use scry_core::constants::{MAX_QUERY_LENGTH, MIN_QUERY_LENGTH, TIE_THRESHOLD};
use scry_core::error::StoreError;
use scry_core::types::{
    CandidateSource, DiversificationConfig, FusionConfig, HybridResult, QueryMetrics,
    RankingCandidate, RankingConfig, ScoreBreakdown, SymbolKind, TieBreakerScores,
    TieBreakerWeights,
};
use scry_hybrid::{Embedder, HybridIndex, SearchHit, SearchWeights};
use scry_sparse::ngram::ngram_sparse;
use scry_store::repo::{chunks, files, symbols};
use scry_store::Store;
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HybridSearchError {
    #[error("query length {actual} outside [{min}, {max}]")]
    QueryLength {
        min: usize,
        max: usize,
        actual: usize,
    },
    #[error("at least one of enable_lexical/enable_vector must be true")]
    NoSourceEnabled,
    #[error("invalid ranking config: {0}")]
    InvalidConfig(String),
    #[error("both lexical and vector retrieval failed: lexical={lexical}, vector={vector}")]
    BothSourcesFailed { lexical: String, vector: String },
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub enable_lexical: bool,
    pub enable_vector: bool,
    /// Overrides `HybridIndex`'s default sparse/dense combination weights
    /// for the vector source's own scoring — distinct from `cfg.fusion`'s
    /// lexical/vector RRF weights. `None` keeps `SearchWeights::default()`.
    pub vector_weights: Option<SearchWeights>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            enable_lexical: true,
            enable_vector: true,
            vector_weights: None,
        }
    }
}

/// Runs the full Stage A-G pipeline. `embedder` is `None` when no dense
/// model is configured; the vector source then degrades to sparse-only
/// scoring via `HybridIndex::search`'s own fallback.
pub fn hybrid_search(
    store: &Store,
    index: &HybridIndex,
    embedder: Option<&dyn Embedder>,
    query: &str,
    cfg: &RankingConfig,
    opts: &SearchOptions,
) -> Result<(Vec<HybridResult>, QueryMetrics), HybridSearchError> {
    let total_start = Instant::now();

    // Stage A: validation.
    let qlen = query.chars().count();
    if !(MIN_QUERY_LENGTH..=MAX_QUERY_LENGTH).contains(&qlen) {
        return Err(HybridSearchError::QueryLength {
            min: MIN_QUERY_LENGTH,
            max: MAX_QUERY_LENGTH,
            actual: qlen,
        });
    }
    if !opts.enable_lexical && !opts.enable_vector {
        return Err(HybridSearchError::NoSourceEnabled);
    }
    cfg.validate().map_err(HybridSearchError::InvalidConfig)?;

    // Stage B: parallel retrieval under a shared timeout budget.
    let stage_b = retrieve_stage_b(store, index, embedder, query, cfg, opts);

    let lexical_used = stage_b.lexical.is_some();
    let vector_used = stage_b.vector.is_some();
    if !lexical_used && !vector_used {
        return Err(HybridSearchError::BothSourcesFailed {
            lexical: stage_b.lexical_err.unwrap_or_else(|| "disabled".to_string()),
            vector: stage_b.vector_err.unwrap_or_else(|| "disabled".to_string()),
        });
    }
    let fallback_mode = match (lexical_used, vector_used) {
        (true, true) => None,
        (true, false) => Some("lexical".to_string()),
        (false, true) => Some("vector".to_string()),
        (false, false) => unreachable!("handled above"),
    };

    let ranking_start = Instant::now();

    // Stage C: Reciprocal Rank Fusion, deduped by (file_id, line_number).
    let fused = fuse(
        stage_b.lexical.as_deref().unwrap_or(&[]),
        stage_b.vector.as_deref().unwrap_or(&[]),
        &cfg.fusion,
    );
    let unique_candidates = fused.len();
    let mut results: Vec<HybridResult> = fused
        .into_iter()
        .map(|row| row.into_hybrid_result())
        .collect();

    // Stage D: tie-break within TIE_THRESHOLD clusters.
    results = tie_break(results, &cfg.tie_breakers, cfg.fusion.gamma, query);

    // Stage E: MMR diversification.
    results = diversify(results, &cfg.diversification);

    // Stage F: early termination and final rank assignment.
    results = finalize(results, cfg.performance.early_termination_top_k);

    let ranking_ms = ranking_start.elapsed().as_millis() as u64;
    let total_ms = total_start.elapsed().as_millis() as u64;

    let metrics = QueryMetrics {
        lexical_search_time_ms: stage_b.lexical_ms,
        vector_search_time_ms: stage_b.vector_ms,
        ranking_time_ms: ranking_ms,
        total_time_ms: total_ms,
        lexical_candidates: stage_b.lexical_raw_count,
        vector_candidates: stage_b.vector_raw_count,
        unique_candidates,
        sla_violation: total_ms > cfg.performance.timeout_ms,
        fallback_mode,
    };

    tracing::info!(
        target: "scry_search::ranking",
        lexical_ms = metrics.lexical_search_time_ms,
        vector_ms = metrics.vector_search_time_ms,
        ranking_ms = metrics.ranking_time_ms,
        total_ms = metrics.total_time_ms,
        lexical_candidates = metrics.lexical_candidates,
        vector_candidates = metrics.vector_candidates,
        unique_candidates = metrics.unique_candidates,
        sla_violation = metrics.sla_violation,
        fallback_mode = metrics.fallback_mode.as_deref().unwrap_or("none"),
        "query completed"
    );
    if metrics.sla_violation {
        tracing::warn!(
            target: "scry_search::ranking",
            total_ms = metrics.total_time_ms,
            budget_ms = cfg.performance.timeout_ms,
            "query exceeded its time budget"
        );
    }

    Ok((results, metrics))
}

// ---------------------------------------------------------------------
// Stage B: parallel retrieval
// ---------------------------------------------------------------------

struct StageBOutcome {
    lexical: Option<Vec<RankingCandidate>>,
    lexical_ms: u64,
    lexical_err: Option<String>,
    lexical_raw_count: usize,
    vector: Option<Vec<RankingCandidate>>,
    vector_ms: u64,
    vector_err: Option<String>,
    vector_raw_count: usize,
}

struct TimedResult<T> {
    elapsed_ms: u64,
    result: Result<T, String>,
}

fn timed<T>(f: impl FnOnce() -> Result<T, String>) -> TimedResult<T> {
    let start = Instant::now();
    let result = f();
    TimedResult {
        elapsed_ms: start.elapsed().as_millis() as u64,
        result,
    }
}

fn retrieve_stage_b(
    store: &Store,
    index: &HybridIndex,
    embedder: Option<&dyn Embedder>,
    query: &str,
    cfg: &RankingConfig,
    opts: &SearchOptions,
) -> StageBOutcome {
    let limit = cfg.performance.candidate_limit;
    let timeout_ms = cfg.performance.timeout_ms;

    let mut lexical_slot: Option<TimedResult<Vec<RankingCandidate>>> = None;
    let mut vector_slot: Option<TimedResult<Vec<RankingCandidate>>> = None;

    std::thread::scope(|scope| {
        let lexical_handle = opts.enable_lexical.then(|| {
            scope.spawn(|| {
                timed(|| {
                    store
                        .with_connection(|conn| build_lexical_candidates(conn, query, limit))
                        .map_err(|e| e.to_string())
                })
            })
        });
        let vector_handle = opts.enable_vector.then(|| {
            scope.spawn(|| {
                timed(|| {
                    let query_dense = embedder
                        .filter(|_| index.dense_available())
                        .and_then(|e| e.embed(&[query.to_string()]).ok())
                        .and_then(|v| v.into_iter().next());
                    let weights = opts.vector_weights.unwrap_or_default();
                    store
                        .with_connection(|conn| {
                            build_vector_candidates(conn, index, query, query_dense.as_deref(), limit, &weights)
                        })
                        .map_err(|e| e.to_string())
                })
            })
        });

        if let Some(h) = lexical_handle {
            lexical_slot = Some(h.join().expect("lexical retrieval thread panicked"));
        }
        if let Some(h) = vector_handle {
            vector_slot = Some(h.join().expect("vector retrieval thread panicked"));
        }
    });

    let lexical_ms = lexical_slot.as_ref().map(|s| s.elapsed_ms).unwrap_or(0);
    let vector_ms = vector_slot.as_ref().map(|s| s.elapsed_ms).unwrap_or(0);
    let (lexical_timed_out, vector_timed_out) = match (&lexical_slot, &vector_slot) {
        (Some(_), Some(_)) => apply_timeout_budget(lexical_ms, vector_ms, timeout_ms),
        _ => (false, false),
    };

    let (lexical, lexical_err, lexical_raw_count) = match lexical_slot {
        Some(TimedResult { result: Ok(v), .. }) if !lexical_timed_out => {
            let n = v.len();
            (Some(v), None, n)
        }
        Some(TimedResult { result: Ok(v), .. }) => (None, Some("lexical retrieval exceeded its share of the query timeout".to_string()), v.len()),
        Some(TimedResult { result: Err(e), .. }) => (None, Some(e), 0),
        None => (None, None, 0),
    };
    let (vector, vector_err, vector_raw_count) = match vector_slot {
        Some(TimedResult { result: Ok(v), .. }) if !vector_timed_out => {
            let n = v.len();
            (Some(v), None, n)
        }
        Some(TimedResult { result: Ok(v), .. }) => (None, Some("vector retrieval exceeded its share of the query timeout".to_string()), v.len()),
        Some(TimedResult { result: Err(e), .. }) => (None, Some(e), 0),
        None => (None, None, 0),
    };

    StageBOutcome {
        lexical,
        lexical_ms,
        lexical_err,
        lexical_raw_count,
        vector,
        vector_ms,
        vector_err,
        vector_raw_count,
    }
}

/// Decides which of two concurrently-run sources ran over its fair share of
/// the shared timeout. The source that finishes first is never late; the
/// other is allowed `max((timeout_ms - faster_ms) / 2, 50ms)` more time,
/// measured from the start of the query.
fn apply_timeout_budget(lexical_ms: u64, vector_ms: u64, timeout_ms: u64) -> (bool, bool) {
    if lexical_ms <= vector_ms {
        let budget = (timeout_ms.saturating_sub(lexical_ms) / 2).max(50);
        (false, vector_ms > lexical_ms + budget)
    } else {
        let budget = (timeout_ms.saturating_sub(vector_ms) / 2).max(50);
        (lexical_ms > vector_ms + budget, false)
    }
}

fn build_lexical_candidates(
    conn: &Connection,
    query: &str,
    limit: usize,
) -> Result<Vec<RankingCandidate>, scry_core::error::StoreError> {
    let hits = lexical::search(conn, query, limit, &SnippetOptions::default())?;
    let mut out = Vec::with_capacity(hits.len());
    for (idx, hit) in hits.into_iter().enumerate() {
        if let Some(candidate) = lexical_hit_to_candidate(conn, hit, idx as u32 + 1)? {
            out.push(candidate);
        }
    }
    Ok(out)
}

fn lexical_hit_to_candidate(
    conn: &Connection,
    hit: LexicalHit,
    source_rank: u32,
) -> Result<Option<RankingCandidate>, scry_core::error::StoreError> {
    let Some(file) = files::find_by_id(conn, &hit.file_id)? else {
        return Ok(None);
    };
    let (symbol_name, symbol_type, line_number, column) = match &hit.symbol_id {
        Some(symbol_id) => match symbols::find_by_id(conn, symbol_id)? {
            Some(symbol) => (
                Some(symbol.name),
                Some(symbol.kind.as_str().to_string()),
                symbol.span.start_line,
                Some(symbol.span.start_column),
            ),
            None => (None, None, 0, None),
        },
        None => (None, None, 0, None),
    };
    Ok(Some(RankingCandidate {
        source: CandidateSource::Lexical,
        source_rank,
        source_score: hit.rank,
        file_id: hit.file_id,
        file_path: hit.file_path,
        line_number,
        column,
        snippet: hit.snippet,
        symbol_name,
        symbol_type,
        language: file.language,
        file_size: file.size_bytes,
        last_modified: file.modified_at,
    }))
}

fn build_vector_candidates(
    conn: &Connection,
    index: &HybridIndex,
    query: &str,
    query_dense: Option<&[f32]>,
    limit: usize,
    weights: &SearchWeights,
) -> Result<Vec<RankingCandidate>, scry_core::error::StoreError> {
    let query_sparse = ngram_sparse(query, &index.sparse_config());
    let hits = index.search(&query_sparse, query_dense, limit, weights);
    let mut out = Vec::with_capacity(hits.len());
    for (idx, hit) in hits.into_iter().enumerate() {
        if let Some(candidate) = vector_hit_to_candidate(conn, hit, idx as u32 + 1)? {
            out.push(candidate);
        }
    }
    Ok(out)
}

fn vector_hit_to_candidate(
    conn: &Connection,
    hit: SearchHit,
    source_rank: u32,
) -> Result<Option<RankingCandidate>, scry_core::error::StoreError> {
    let Some(chunk) = chunks::find_by_id(conn, &hit.id)? else {
        return Ok(None);
    };
    let Some(file) = files::find_by_id(conn, &chunk.file_id)? else {
        return Ok(None);
    };
    let (line_number, column) = parse_anchor(&chunk.anchor);
    let (symbol_name, symbol_type) = match &chunk.symbol_id {
        Some(symbol_id) => match symbols::find_by_id(conn, symbol_id)? {
            Some(symbol) => (Some(symbol.name), Some(symbol.kind.as_str().to_string())),
            None => (None, None),
        },
        None => (None, None),
    };
    Ok(Some(RankingCandidate {
        source: CandidateSource::Vector,
        source_rank,
        source_score: f64::from(hit.combined_score),
        file_id: chunk.file_id,
        file_path: file.path,
        line_number,
        column,
        snippet: make_vector_snippet(&chunk.text),
        symbol_name,
        symbol_type,
        language: file.language,
        file_size: file.size_bytes,
        last_modified: file.modified_at,
    }))
}

/// Anchors are `path:line:col`; paths are assumed colon-free (POSIX-style
/// relative paths), so the last two `:`-separated fields are line/column.
fn parse_anchor(anchor: &str) -> (u32, Option<u32>) {
    let mut parts = anchor.rsplitn(3, ':');
    let column = parts.next().and_then(|s| s.parse::<u32>().ok());
    let line = parts.next().and_then(|s| s.parse::<u32>().ok()).unwrap_or(0);
    (line, column)
}

const VECTOR_SNIPPET_MAX_CHARS: usize = 240;

fn make_vector_snippet(text: &str) -> String {
    if text.chars().count() <= VECTOR_SNIPPET_MAX_CHARS {
        return text.to_string();
    }
    let truncated: String = text.chars().take(VECTOR_SNIPPET_MAX_CHARS).collect();
    match truncated.rfind(' ') {
        Some(idx) if idx > 0 => format!("{}\u{2026}", &truncated[..idx]),
        _ => format!("{truncated}\u{2026}"),
    }
}

// ---------------------------------------------------------------------
// Stage C: Reciprocal Rank Fusion
// ---------------------------------------------------------------------

struct FusionRow {
    candidate: RankingCandidate,
    lexical_rank: Option<u32>,
    lexical_contribution: f64,
    vector_rank: Option<u32>,
    vector_contribution: f64,
}

impl FusionRow {
    fn into_hybrid_result(self) -> HybridResult {
        let final_score = self.lexical_contribution + self.vector_contribution;
        let mut result = HybridResult::from_candidate(self.candidate, 0);
        result.final_score = final_score;
        result.score_breakdown = ScoreBreakdown {
            lexical_rank: self.lexical_rank,
            lexical_contribution: self.lexical_contribution,
            vector_rank: self.vector_rank,
            vector_contribution: self.vector_contribution,
            tie_breaker_scores: None,
            tie_breaker_contribution: 0.0,
            diversity_penalty: None,
        };
        result
    }
}

fn fuse(
    lexical: &[RankingCandidate],
    vector: &[RankingCandidate],
    fusion: &FusionConfig,
) -> Vec<FusionRow> {
    let mut rows: HashMap<(String, u32), FusionRow> = HashMap::new();
    let mut order: Vec<(String, u32)> = Vec::new();

    for candidate in lexical {
        let key = (candidate.file_id.clone(), candidate.line_number);
        let score = fusion.alpha / (fusion.rrf_k + f64::from(candidate.source_rank));
        if let Some(existing) = rows.get_mut(&key) {
            existing.lexical_rank = Some(candidate.source_rank);
            existing.lexical_contribution = score;
        } else {
            order.push(key.clone());
            rows.insert(
                key,
                FusionRow {
                    candidate: candidate.clone(),
                    lexical_rank: Some(candidate.source_rank),
                    lexical_contribution: score,
                    vector_rank: None,
                    vector_contribution: 0.0,
                },
            );
        }
    }

    for candidate in vector {
        let key = (candidate.file_id.clone(), candidate.line_number);
        let score = fusion.beta / (fusion.rrf_k + f64::from(candidate.source_rank));
        if let Some(existing) = rows.get_mut(&key) {
            existing.vector_rank = Some(candidate.source_rank);
            existing.vector_contribution = score;
        } else {
            order.push(key.clone());
            rows.insert(
                key,
                FusionRow {
                    candidate: candidate.clone(),
                    lexical_rank: None,
                    lexical_contribution: 0.0,
                    vector_rank: Some(candidate.source_rank),
                    vector_contribution: score,
                },
            );
        }
    }

    order
        .into_iter()
        .filter_map(|key| rows.remove(&key))
        .collect()
}

// ---------------------------------------------------------------------
// Stage D: tie-break
// ---------------------------------------------------------------------

fn sort_deterministic(results: &mut [HybridResult]) {
    results.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| a.file_id.cmp(&b.file_id))
            .then_with(|| a.line_number.cmp(&b.line_number))
    });
}

/// Clusters results whose final score sits within `TIE_THRESHOLD` of the
/// cluster's top score (sorted descending, so that bound also bounds every
/// pairwise distance inside the cluster) and, for any cluster with two or
/// more members, adds `gamma * combined` to each member's score before a
/// final global re-sort.
fn tie_break(mut results: Vec<HybridResult>, weights: &TieBreakerWeights, gamma: f64, query: &str) -> Vec<HybridResult> {
    sort_deterministic(&mut results);

    let mut i = 0;
    while i < results.len() {
        let anchor_score = results[i].final_score;
        let mut j = i + 1;
        while j < results.len() && anchor_score - results[j].final_score <= TIE_THRESHOLD {
            j += 1;
        }
        if j - i >= 2 {
            for result in &mut results[i..j] {
                let scores = compute_tie_breaker_scores(result, query, weights);
                let contribution = gamma * scores.combined;
                result.score_breakdown.tie_breaker_scores = Some(scores);
                result.score_breakdown.tie_breaker_contribution = contribution;
                result.final_score += contribution;
            }
        }
        i = j;
    }

    sort_deterministic(&mut results);
    results
}

fn compute_tie_breaker_scores(result: &HybridResult, query: &str, weights: &TieBreakerWeights) -> TieBreakerScores {
    let symbol_type_priority = symbol_type_priority(result.symbol_type.as_deref());
    let path_priority = path_priority(&result.file_path);
    let language_match = language_match(result.language.as_deref(), query);
    let identifier_match = identifier_match(result.symbol_name.as_deref(), query);
    let combined = weights.symbol_type_weight * symbol_type_priority
        + weights.path_priority_weight * path_priority
        + weights.language_match_weight * language_match
        + weights.identifier_match_weight * identifier_match;
    TieBreakerScores {
        symbol_type_priority,
        path_priority,
        language_match,
        identifier_match,
        combined,
    }
}

/// Candidates without a recognized symbol kind (file-level chunks, or a
/// kind absent from `SymbolKind`) share `SymbolKind`'s own "unknown" bucket.
fn symbol_type_priority(symbol_type: Option<&str>) -> f64 {
    match symbol_type.and_then(SymbolKind::parse) {
        Some(kind) => kind.tie_break_priority(),
        None => 0.10,
    }
}

/// First-match-wins path priority table.
fn path_priority(path: &str) -> f64 {
    let normalized = path.replace('\\', "/").to_ascii_lowercase();
    if normalized.starts_with("src/") {
        1.0
    } else if normalized.starts_with("lib/") {
        0.9
    } else if normalized.starts_with("packages/") {
        0.85
    } else if normalized.starts_with("test/") || normalized.starts_with("tests/") {
        0.6
    } else if normalized.contains(".test.") || normalized.contains(".spec.") {
        0.6
    } else if normalized.starts_with("example/") || normalized.starts_with("examples/") {
        0.5
    } else if normalized.starts_with("doc/") || normalized.starts_with("docs/") {
        0.4
    } else {
        0.5
    }
}

fn language_match(language: Option<&str>, query: &str) -> f64 {
    let Some(language) = language else {
        return 0.0;
    };
    let query_lower = query.to_ascii_lowercase();
    let language_lower = language.to_ascii_lowercase();
    if query_lower.contains(&language_lower) || language_extensions(&language_lower).iter().any(|ext| query_lower.contains(ext)) {
        1.0
    } else {
        0.0
    }
}

fn language_extensions(language: &str) -> &'static [&'static str] {
    match language {
        "rust" => &["rs"],
        "typescript" => &["ts", "tsx"],
        "javascript" => &["js", "jsx"],
        "python" => &["py"],
        "go" => &["go"],
        "java" => &["java"],
        "c" => &["c", "h"],
        "cpp" | "c++" => &["cpp", "cc", "hpp"],
        "ruby" => &["rb"],
        _ => &[],
    }
}

fn identifier_match(symbol_name: Option<&str>, query: &str) -> f64 {
    match symbol_name {
        Some(name) if query.split_whitespace().any(|token| token == name) => 1.0,
        _ => 0.0,
    }
}

// ---------------------------------------------------------------------
// Stage E: MMR diversification
// ---------------------------------------------------------------------

fn diversify(results: Vec<HybridResult>, cfg: &DiversificationConfig) -> Vec<HybridResult> {
    if !cfg.enabled || results.len() <= 1 {
        return results;
    }
    let first_path = results[0].file_path.clone();
    if results.iter().all(|r| r.file_path == first_path) {
        return results;
    }

    let mut remaining = results;
    let mut selected: Vec<HybridResult> = Vec::with_capacity(remaining.len());
    let mut per_file_counts: HashMap<String, u32> = HashMap::new();

    loop {
        let eligible: Vec<usize> = remaining
            .iter()
            .enumerate()
            .filter(|(_, r)| per_file_counts.get(&r.file_path).copied().unwrap_or(0) < cfg.max_per_file)
            .map(|(i, _)| i)
            .collect();
        let Some(&first_eligible) = eligible.first() else {
            break;
        };

        let mut best_idx = first_eligible;
        let mut best_mmr = f64::NEG_INFINITY;
        let mut best_penalty = 0.0_f64;
        for &idx in &eligible {
            let candidate = &remaining[idx];
            let max_sim = selected
                .iter()
                .map(|s| path_similarity(&candidate.file_path, &s.file_path))
                .fold(0.0_f64, f64::max);
            let penalty = (1.0 - cfg.lambda) * max_sim;
            let mmr = cfg.lambda * candidate.final_score - penalty;
            if mmr > best_mmr {
                best_mmr = mmr;
                best_idx = idx;
                best_penalty = penalty;
            }
        }

        let mut chosen = remaining.remove(best_idx);
        *per_file_counts.entry(chosen.file_path.clone()).or_insert(0) += 1;
        chosen.final_score = best_mmr;
        chosen.score_breakdown.diversity_penalty = Some(best_penalty);
        selected.push(chosen);
    }

    selected
}

/// Longest-common-prefix-of-components similarity over forward-slash path
/// segments. Equal paths are 1.0; two empty paths 0.0.
fn path_similarity(a: &str, b: &str) -> f64 {
    let pa: Vec<&str> = a.replace('\\', "/").split('/').filter(|s| !s.is_empty()).collect();
    let pb: Vec<&str> = b.replace('\\', "/").split('/').filter(|s| !s.is_empty()).collect();
    if pa.is_empty() && pb.is_empty() {
        return 0.0;
    }
    if pa == pb {
        return 1.0;
    }
    let common = pa.iter().zip(pb.iter()).take_while(|(x, y)| x == y).count();
    let max_len = pa.len().max(pb.len());
    if max_len == 0 {
        0.0
    } else {
        common as f64 / max_len as f64
    }
}

// ---------------------------------------------------------------------
// Stage F: early termination
// ---------------------------------------------------------------------

fn finalize(mut results: Vec<HybridResult>, top_k: usize) -> Vec<HybridResult> {
    results.truncate(top_k);
    for (rank, result) in results.iter_mut().enumerate() {
        result.final_rank = rank as u32 + 1;
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_result(file_id: &str, file_path: &str, line: u32, final_score: f64) -> HybridResult {
        HybridResult {
            file_id: file_id.to_string(),
            file_path: file_path.to_string(),
            line_number: line,
            column: None,
            snippet: String::new(),
            symbol_name: None,
            symbol_type: None,
            language: None,
            file_size: 0,
            last_modified: 0,
            final_score,
            final_rank: 0,
            score_breakdown: ScoreBreakdown::default(),
        }
    }

    #[test]
    fn rrf_formula_matches_worked_example() {
        let fusion = FusionConfig {
            alpha: 0.5,
            beta: 0.4,
            gamma: 0.1,
            rrf_k: 60.0,
        };
        let lexical = vec![RankingCandidate {
            source: CandidateSource::Lexical,
            source_rank: 1,
            source_score: -5.0,
            file_id: "f1".into(),
            file_path: "src/a.ts".into(),
            line_number: 10,
            column: None,
            snippet: String::new(),
            symbol_name: None,
            symbol_type: None,
            language: None,
            file_size: 0,
            last_modified: 0,
        }];
        let mut vector = lexical.clone();
        vector[0].source = CandidateSource::Vector;

        let fused = fuse(&lexical, &vector, &fusion);
        assert_eq!(fused.len(), 1);
        let result = fused.into_iter().next().unwrap().into_hybrid_result();
        assert!((result.score_breakdown.lexical_contribution - 0.5 / 61.0).abs() < 1e-9);
        assert!((result.score_breakdown.vector_contribution - 0.4 / 61.0).abs() < 1e-9);
        assert!((result.final_score - (0.5 / 61.0 + 0.4 / 61.0)).abs() < 1e-9);
    }

    #[test]
    fn apply_timeout_budget_matches_s6_scenario() {
        let (lexical_timed_out, vector_timed_out) = apply_timeout_budget(30, 200, 100);
        assert!(!lexical_timed_out);
        assert!(vector_timed_out);
    }

    #[test]
    fn tie_break_only_applies_within_threshold_clusters() {
        let weights = TieBreakerWeights::default();
        let results = vec![
            stub_result("f1", "src/a.ts", 1, 1.0),
            stub_result("f2", "tests/a.test.ts", 1, 1.0 - TIE_THRESHOLD / 2.0),
            stub_result("f3", "src/z.ts", 1, 0.2),
        ];
        let out = tie_break(results, &weights, 0.1, "a");
        // f1 and f2 are tied and get a path-priority boost; f3 is untouched.
        assert!(out[2].score_breakdown.tie_breaker_scores.is_none());
        assert_eq!(out[2].file_id, "f3");
        assert!(out[0].final_score > out[1].final_score);
        assert_eq!(out[0].file_id, "f1"); // src/ outranks tests/ once tie-broken
    }

    #[test]
    fn path_priority_prefers_src_over_tests() {
        assert!(path_priority("src/lib.rs") > path_priority("tests/lib_test.rs"));
        assert_eq!(path_priority("unrelated/path.rs"), 0.5);
    }

    #[test]
    fn path_similarity_of_equal_paths_is_one() {
        assert_eq!(path_similarity("src/a.rs", "src/a.rs"), 1.0);
        assert_eq!(path_similarity("", ""), 0.0);
    }

    #[test]
    fn diversify_skips_when_all_results_share_one_file() {
        let cfg = DiversificationConfig::default();
        let results = vec![stub_result("f1", "src/a.rs", 1, 1.0), stub_result("f1", "src/a.rs", 2, 0.9)];
        let out = diversify(results.clone(), &cfg);
        assert_eq!(out.len(), results.len());
        assert!(out[0].score_breakdown.diversity_penalty.is_none());
    }

    #[test]
    fn diversify_drops_candidates_that_cannot_fit_the_per_file_cap() {
        let cfg = DiversificationConfig {
            enabled: true,
            lambda: 0.5,
            max_per_file: 2,
        };
        let results = vec![
            stub_result("p10", "parser.ts", 10, 1.0),
            stub_result("p20", "parser.ts", 20, 0.95),
            stub_result("l1", "lexer.ts", 1, 0.9),
            stub_result("l2", "lexer.ts", 2, 0.85),
            stub_result("p30", "parser.ts", 30, 0.8),
        ];
        let out = diversify(results, &cfg);
        assert_eq!(out.len(), 4);
        assert!(!out.iter().any(|r| r.file_id == "p30"));
    }

    #[test]
    fn finalize_truncates_and_renumbers_ranks() {
        let results = vec![
            stub_result("f1", "a.rs", 1, 3.0),
            stub_result("f2", "b.rs", 1, 2.0),
            stub_result("f3", "c.rs", 1, 1.0),
        ];
        let out = finalize(results, 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].final_rank, 1);
        assert_eq!(out[1].final_rank, 2);
    }
}
