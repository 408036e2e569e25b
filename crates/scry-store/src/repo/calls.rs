//! `calls` repository.

use rusqlite::{Connection, params};
use scry_core::error::StoreError;
use scry_core::types::{ParsedCall, Span};

pub struct CallRow {
    pub caller_id: String,
    pub callee_name: String,
    pub callee_file_id: Option<String>,
    pub span: Span,
}

pub fn insert(conn: &Connection, call: &CallRow) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO calls (caller_id, callee_name, callee_file_id,
             start_line, start_column, end_line, end_column, start_byte, end_byte)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
        params![
            call.caller_id,
            call.callee_name,
            call.callee_file_id,
            call.span.start_line,
            call.span.start_column,
            call.span.end_line,
            call.span.end_column,
            call.span.start_byte as i64,
            call.span.end_byte as i64,
        ],
    )
    .map_err(StoreError::database)?;
    Ok(())
}

/// Insert every call site recorded against a symbol's parsed calls, used by
/// the incremental indexer when (re)storing a symbol's outgoing references.
pub fn insert_parsed(
    conn: &Connection,
    caller_id: &str,
    span: &Span,
    calls: &[ParsedCall],
) -> Result<(), StoreError> {
    for call in calls {
        insert(
            conn,
            &CallRow {
                caller_id: caller_id.to_string(),
                callee_name: call.target.clone(),
                callee_file_id: None,
                span: *span,
            },
        )?;
    }
    Ok(())
}

pub fn find_callers_of(conn: &Connection, callee_name: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT DISTINCT caller_id FROM calls WHERE callee_name = ?1 AND deleted_at IS NULL")
        .map_err(StoreError::database)?;
    let rows = stmt
        .query_map(params![callee_name], |r| r.get::<_, String>(0))
        .map_err(StoreError::database)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::database)
}

pub fn delete_for_caller(conn: &Connection, caller_id: &str) -> Result<u64, StoreError> {
    let n = conn
        .execute("DELETE FROM calls WHERE caller_id = ?1", params![caller_id])
        .map_err(StoreError::database)?;
    Ok(n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{files, symbols};
    use crate::{db, schema};
    use scry_core::config::StorageConfig;
    use scry_core::types::{File, Symbol, SymbolKind};
    use tempfile::tempdir;

    fn conn() -> Connection {
        let dir = tempdir().unwrap();
        let c = db::open_connection(&dir.path().join("t.db"), &StorageConfig::default()).unwrap();
        std::mem::forget(dir);
        schema::create_tables(&c).unwrap();
        files::insert(
            &c,
            &File {
                id: "f1".into(),
                path: "a.rs".into(),
                content_hash: "h".into(),
                language: None,
                size_bytes: 1,
                modified_at: 0,
                indexed_at: 0,
                deleted_at: None,
            },
        )
        .unwrap();
        symbols::insert(
            &c,
            &Symbol {
                id: "s1".into(),
                file_id: "f1".into(),
                name: "caller".into(),
                kind: SymbolKind::Function,
                span: Span { start_line: 1, start_column: 0, end_line: 1, end_column: 1, start_byte: 0, end_byte: 1 },
                parents: vec![],
                signature: None,
                documentation: None,
                content_hash: "x".into(),
                deleted_at: None,
            },
        )
        .unwrap();
        c
    }

    #[test]
    fn insert_and_find_callers() {
        let c = conn();
        insert_parsed(
            &c,
            "s1",
            &Span { start_line: 1, start_column: 0, end_line: 1, end_column: 1, start_byte: 0, end_byte: 1 },
            &[ParsedCall { target: "callee".into(), receiver: None }],
        )
        .unwrap();
        assert_eq!(find_callers_of(&c, "callee").unwrap(), vec!["s1".to_string()]);
        delete_for_caller(&c, "s1").unwrap();
        assert!(find_callers_of(&c, "callee").unwrap().is_empty());
    }
}
