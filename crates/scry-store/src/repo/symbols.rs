//! `symbols` repository.

use rusqlite::{Connection, OptionalExtension, params};
use scry_core::error::StoreError;
use scry_core::types::{Span, Symbol, SymbolKind};

fn row_to_symbol(row: &rusqlite::Row) -> rusqlite::Result<Symbol> {
    let parents_json: String = row.get("parents")?;
    let parents: Vec<String> = serde_json::from_str(&parents_json).unwrap_or_default();
    let kind_str: String = row.get("kind")?;
    Ok(Symbol {
        id: row.get("id")?,
        file_id: row.get("file_id")?,
        name: row.get("name")?,
        kind: SymbolKind::parse(&kind_str).unwrap_or(SymbolKind::Variable),
        span: Span {
            start_line: row.get("start_line")?,
            start_column: row.get("start_column")?,
            end_line: row.get("end_line")?,
            end_column: row.get("end_column")?,
            start_byte: row.get::<_, i64>("start_byte")? as u64,
            end_byte: row.get::<_, i64>("end_byte")? as u64,
        },
        parents,
        signature: row.get("signature")?,
        documentation: row.get("documentation")?,
        content_hash: row.get("content_hash")?,
        deleted_at: row.get("deleted_at")?,
    })
}

pub fn insert(conn: &Connection, symbol: &Symbol) -> Result<(), StoreError> {
    let parents_json = serde_json::to_string(&symbol.parents).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "INSERT INTO symbols (id, file_id, name, kind, start_line, start_column, end_line, end_column,
             start_byte, end_byte, parents, signature, documentation, content_hash, deleted_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name, kind = excluded.kind,
             start_line = excluded.start_line, start_column = excluded.start_column,
             end_line = excluded.end_line, end_column = excluded.end_column,
             start_byte = excluded.start_byte, end_byte = excluded.end_byte,
             parents = excluded.parents, signature = excluded.signature,
             documentation = excluded.documentation, content_hash = excluded.content_hash,
             deleted_at = excluded.deleted_at",
        params![
            symbol.id,
            symbol.file_id,
            symbol.name,
            symbol.kind.as_str(),
            symbol.span.start_line,
            symbol.span.start_column,
            symbol.span.end_line,
            symbol.span.end_column,
            symbol.span.start_byte as i64,
            symbol.span.end_byte as i64,
            parents_json,
            symbol.signature,
            symbol.documentation,
            symbol.content_hash,
            symbol.deleted_at,
        ],
    )
    .map_err(StoreError::database)?;
    Ok(())
}

pub fn insert_batch(conn: &Connection, symbols: &[Symbol]) -> Result<(), StoreError> {
    for s in symbols {
        insert(conn, s)?;
    }
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<Symbol>, StoreError> {
    conn.query_row(
        "SELECT id, file_id, name, kind, start_line, start_column, end_line, end_column,
                start_byte, end_byte, parents, signature, documentation, content_hash, deleted_at
         FROM symbols WHERE id = ?1",
        params![id],
        row_to_symbol,
    )
    .optional()
    .map_err(StoreError::database)
}

pub fn find_by_file(conn: &Connection, file_id: &str) -> Result<Vec<Symbol>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, file_id, name, kind, start_line, start_column, end_line, end_column,
                    start_byte, end_byte, parents, signature, documentation, content_hash, deleted_at
             FROM symbols WHERE file_id = ?1 AND deleted_at IS NULL ORDER BY start_byte",
        )
        .map_err(StoreError::database)?;
    let rows = stmt.query_map(params![file_id], row_to_symbol).map_err(StoreError::database)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::database)
}

/// Soft-delete all symbols for a file (cascades logically to chunks via the
/// caller; the FK's `ON DELETE CASCADE` only applies to hard deletes).
pub fn soft_delete_for_file(conn: &Connection, file_id: &str, deleted_at: i64) -> Result<u64, StoreError> {
    let n = conn
        .execute(
            "UPDATE symbols SET deleted_at = ?2 WHERE file_id = ?1 AND deleted_at IS NULL",
            params![file_id, deleted_at],
        )
        .map_err(StoreError::database)?;
    Ok(n as u64)
}

/// Hard-delete symbols for a file, used before re-inserting fresh ones on
/// re-index.
pub fn delete_for_file(conn: &Connection, file_id: &str) -> Result<u64, StoreError> {
    let n = conn
        .execute("DELETE FROM symbols WHERE file_id = ?1", params![file_id])
        .map_err(StoreError::database)?;
    Ok(n as u64)
}

pub fn hard_delete_before(conn: &Connection, cutoff: i64) -> Result<u64, StoreError> {
    let n = conn
        .execute(
            "DELETE FROM symbols WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
            params![cutoff],
        )
        .map_err(StoreError::database)?;
    Ok(n as u64)
}
