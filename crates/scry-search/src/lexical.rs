//! C5: the lexical searcher — query-string construction,
//! snippet generation, and slow-query logging layered over
//! `scry_store::repo::search`'s raw FTS5 plumbing.

use rusqlite::Connection;
use scry_core::constants::SLOW_QUERY_MS;
use scry_core::error::StoreError;
use scry_store::repo::search::{self, RawSearchRow};
use std::time::Instant;

/// One lexical hit, BM25-ranked (ascending: lower `rank` is a better match).
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub rank: f64,
    pub file_id: String,
    pub symbol_id: Option<String>,
    pub file_path: String,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct SnippetOptions {
    pub max_tokens: usize,
    pub marker_open: String,
    pub marker_close: String,
}

impl Default for SnippetOptions {
    fn default() -> Self {
        Self {
            max_tokens: 12,
            marker_open: "[".to_string(),
            marker_close: "]".to_string(),
        }
    }
}

const DEFAULT_CONTENT_WEIGHT: f64 = 1.0;
const DEFAULT_DOCS_WEIGHT: f64 = 0.5;

/// Plain `MATCH` query, default column weights.
pub fn search(
    conn: &Connection,
    query: &str,
    limit: usize,
    snippet_opts: &SnippetOptions,
) -> Result<Vec<LexicalHit>, StoreError> {
    search_with_weights(conn, query, DEFAULT_CONTENT_WEIGHT, DEFAULT_DOCS_WEIGHT, limit, snippet_opts)
}

/// Wraps `phrase` in FTS5 phrase-query quoting (`"a b c"`), escaping any
/// embedded quote by doubling it per FTS5 syntax.
pub fn search_phrase(
    conn: &Connection,
    phrase: &str,
    limit: usize,
    snippet_opts: &SnippetOptions,
) -> Result<Vec<LexicalHit>, StoreError> {
    let escaped = phrase.replace('"', "\"\"");
    let match_expr = format!("\"{escaped}\"");
    run_query(conn, &match_expr, DEFAULT_CONTENT_WEIGHT, DEFAULT_DOCS_WEIGHT, limit, snippet_opts, phrase)
}

/// Appends `*` to each whitespace-separated token, turning the query into
/// an FTS5 prefix match.
pub fn search_prefix(
    conn: &Connection,
    prefix: &str,
    limit: usize,
    snippet_opts: &SnippetOptions,
) -> Result<Vec<LexicalHit>, StoreError> {
    let match_expr = prefix
        .split_whitespace()
        .map(|token| format!("{token}*"))
        .collect::<Vec<_>>()
        .join(" ");
    run_query(conn, &match_expr, DEFAULT_CONTENT_WEIGHT, DEFAULT_DOCS_WEIGHT, limit, snippet_opts, prefix)
}

/// Plain query with caller-supplied column weights.
pub fn search_with_weights(
    conn: &Connection,
    query: &str,
    content_weight: f64,
    docs_weight: f64,
    limit: usize,
    snippet_opts: &SnippetOptions,
) -> Result<Vec<LexicalHit>, StoreError> {
    run_query(conn, query, content_weight, docs_weight, limit, snippet_opts, query)
}

fn run_query(
    conn: &Connection,
    match_expr: &str,
    content_weight: f64,
    docs_weight: f64,
    limit: usize,
    snippet_opts: &SnippetOptions,
    log_query: &str,
) -> Result<Vec<LexicalHit>, StoreError> {
    let started = Instant::now();
    let rows = search::query(conn, match_expr, content_weight, docs_weight, limit)?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if elapsed_ms > SLOW_QUERY_MS {
        tracing::warn!(
            duration_ms = elapsed_ms,
            result_count = rows.len(),
            query = log_query,
            content_weight,
            docs_weight,
            limit,
            "slow lexical query"
        );
    }

    let query_tokens: Vec<String> = log_query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();

    Ok(rows
        .into_iter()
        .map(|row| to_hit(row, &query_tokens, snippet_opts))
        .collect())
}

fn to_hit(row: RawSearchRow, query_tokens: &[String], snippet_opts: &SnippetOptions) -> LexicalHit {
    LexicalHit {
        rank: row.rank,
        file_id: row.file_id,
        symbol_id: row.symbol_id,
        file_path: row.file_path,
        snippet: make_snippet(&row.content, query_tokens, snippet_opts),
    }
}

/// Builds a snippet of at most `max_tokens` whitespace-separated tokens,
/// wrapping any token that case-insensitively matches a query token in
/// `marker_open`/`marker_close`. Centers the window on the first matching token when the
/// content is longer than the budget, so the match is never truncated out.
fn make_snippet(content: &str, query_tokens: &[String], opts: &SnippetOptions) -> String {
    let tokens: Vec<&str> = content.split_whitespace().collect();
    if tokens.is_empty() {
        return String::new();
    }

    let match_pos = tokens
        .iter()
        .position(|t| query_tokens.iter().any(|q| t.to_lowercase() == *q));

    let start = match match_pos {
        Some(pos) => pos.saturating_sub(opts.max_tokens / 2),
        None => 0,
    };
    let end = (start + opts.max_tokens).min(tokens.len());
    let start = end.saturating_sub(opts.max_tokens).min(start);

    tokens[start..end]
        .iter()
        .map(|token| {
            let matched = query_tokens.iter().any(|q| token.to_lowercase() == *q);
            if matched {
                format!("{}{}{}", opts.marker_open, token, opts.marker_close)
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_core::config::StorageConfig;
    use scry_store::repo::search::IndexRow;
    use scry_store::{db, schema};
    use tempfile::tempdir;

    fn conn_with_fixture() -> Connection {
        let dir = tempdir().unwrap();
        let c = db::open_connection(&dir.path().join("t.db"), &StorageConfig::default()).unwrap();
        std::mem::forget(dir);
        schema::create_tables(&c).unwrap();
        search::index(
            &c,
            &IndexRow {
                content: "async function fetchData(url) returns a promise of response",
                documentation: Some("Fetches remote data over HTTP"),
                file_id: "f1",
                symbol_id: Some("s1"),
                file_path: "src/http.ts",
            },
        )
        .unwrap();
        c
    }

    #[test]
    fn search_returns_a_snippet_with_matched_token_bracketed() {
        let c = conn_with_fixture();
        let hits = search(&c, "fetchData", 10, &SnippetOptions::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].snippet.contains("[fetchData]"));
    }

    #[test]
    fn search_phrase_matches_exact_sequence() {
        let c = conn_with_fixture();
        let hits = search_phrase(&c, "function fetchData", 10, &SnippetOptions::default()).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn search_prefix_matches_partial_token() {
        let c = conn_with_fixture();
        let hits = search_prefix(&c, "fetch", 10, &SnippetOptions::default()).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn search_with_weights_favors_docs_when_weighted() {
        let c = conn_with_fixture();
        let hits = search_with_weights(&c, "data", 0.1, 5.0, 10, &SnippetOptions::default()).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn empty_content_yields_empty_snippet() {
        let opts = SnippetOptions::default();
        assert_eq!(make_snippet("", &["x".to_string()], &opts), "");
    }
}
