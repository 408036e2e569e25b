//! `search` FTS5 repository. Raw index
//! maintenance and `MATCH`/`bm25()` query plumbing live here; query-string
//! construction (phrase/prefix), snippet extraction, and slow-query
//! logging are `scry-search`'s C5 concern layered on top of
//! this.

use rusqlite::{Connection, params};
use scry_core::error::StoreError;

pub struct IndexRow<'a> {
    pub content: &'a str,
    pub documentation: Option<&'a str>,
    pub file_id: &'a str,
    pub symbol_id: Option<&'a str>,
    pub file_path: &'a str,
}

pub fn index(conn: &Connection, row: &IndexRow) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO search (content, documentation, file_id, symbol_id, file_path)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![row.content, row.documentation, row.file_id, row.symbol_id, row.file_path],
    )
    .map_err(StoreError::database)?;
    Ok(())
}

pub fn delete_for_file(conn: &Connection, file_id: &str) -> Result<u64, StoreError> {
    let n = conn
        .execute("DELETE FROM search WHERE file_id = ?1", params![file_id])
        .map_err(StoreError::database)?;
    Ok(n as u64)
}

#[derive(Debug, Clone)]
pub struct RawSearchRow {
    pub rank: f64,
    pub file_id: String,
    pub symbol_id: Option<String>,
    pub file_path: String,
    pub content: String,
    pub documentation: Option<String>,
}

/// `bm25(search, content_weight, docs_weight)` ordered ascending — lower is
/// a better match. `match_expr` is an already-constructed FTS5
/// `MATCH` expression (plain, phrase-quoted, or prefix, per caller).
pub fn query(
    conn: &Connection,
    match_expr: &str,
    content_weight: f64,
    docs_weight: f64,
    limit: usize,
) -> Result<Vec<RawSearchRow>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT bm25(search, ?1, ?2) as rank, file_id, symbol_id, file_path, content, documentation
             FROM search WHERE search MATCH ?3 ORDER BY rank LIMIT ?4",
        )
        .map_err(StoreError::database)?;
    let rows = stmt
        .query_map(params![content_weight, docs_weight, match_expr, limit as i64], |r| {
            Ok(RawSearchRow {
                rank: r.get(0)?,
                file_id: r.get(1)?,
                symbol_id: r.get(2)?,
                file_path: r.get(3)?,
                content: r.get(4)?,
                documentation: r.get(5)?,
            })
        })
        .map_err(StoreError::database)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, schema};
    use scry_core::config::StorageConfig;
    use tempfile::tempdir;

    fn conn() -> Connection {
        let dir = tempdir().unwrap();
        let c = db::open_connection(&dir.path().join("t.db"), &StorageConfig::default()).unwrap();
        std::mem::forget(dir);
        schema::create_tables(&c).unwrap();
        c
    }

    #[test]
    fn index_and_match_query() {
        let c = conn();
        index(
            &c,
            &IndexRow {
                content: "async function fetchData(url)",
                documentation: Some("Fetches remote data"),
                file_id: "f1",
                symbol_id: Some("s1"),
                file_path: "src/http.ts",
            },
        )
        .unwrap();
        index(
            &c,
            &IndexRow {
                content: "class HttpClient",
                documentation: None,
                file_id: "f2",
                symbol_id: None,
                file_path: "src/client.ts",
            },
        )
        .unwrap();

        let results = query(&c, "fetchData", 1.0, 0.5, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_path, "src/http.ts");
    }

    #[test]
    fn delete_for_file_removes_rows() {
        let c = conn();
        index(
            &c,
            &IndexRow {
                content: "foo bar",
                documentation: None,
                file_id: "f1",
                symbol_id: None,
                file_path: "a.rs",
            },
        )
        .unwrap();
        delete_for_file(&c, "f1").unwrap();
        assert!(query(&c, "foo", 1.0, 0.5, 10).unwrap().is_empty());
    }
}
