//! `chunks` repository.

use rusqlite::{Connection, OptionalExtension, params};
use scry_core::error::StoreError;
use scry_core::types::Chunk;

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: row.get("id")?,
        file_id: row.get("file_id")?,
        symbol_id: row.get("symbol_id")?,
        text: row.get("text")?,
        documentation: row.get("documentation")?,
        anchor: row.get("anchor")?,
        deleted_at: row.get("deleted_at")?,
    })
}

pub fn insert(conn: &Connection, chunk: &Chunk) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO chunks (id, file_id, symbol_id, text, documentation, anchor, deleted_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7)
         ON CONFLICT(id) DO UPDATE SET
             text = excluded.text, documentation = excluded.documentation,
             anchor = excluded.anchor, deleted_at = excluded.deleted_at",
        params![
            chunk.id,
            chunk.file_id,
            chunk.symbol_id,
            chunk.text,
            chunk.documentation,
            chunk.anchor,
            chunk.deleted_at,
        ],
    )
    .map_err(StoreError::database)?;
    Ok(())
}

pub fn insert_batch(conn: &Connection, chunks: &[Chunk]) -> Result<(), StoreError> {
    for c in chunks {
        insert(conn, c)?;
    }
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<Chunk>, StoreError> {
    conn.query_row(
        "SELECT id, file_id, symbol_id, text, documentation, anchor, deleted_at
         FROM chunks WHERE id = ?1",
        params![id],
        row_to_chunk,
    )
    .optional()
    .map_err(StoreError::database)
}

pub fn find_by_file(conn: &Connection, file_id: &str) -> Result<Vec<Chunk>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, file_id, symbol_id, text, documentation, anchor, deleted_at
             FROM chunks WHERE file_id = ?1 AND deleted_at IS NULL",
        )
        .map_err(StoreError::database)?;
    let rows = stmt.query_map(params![file_id], row_to_chunk).map_err(StoreError::database)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::database)
}

pub fn delete_for_file(conn: &Connection, file_id: &str) -> Result<u64, StoreError> {
    let n = conn
        .execute("DELETE FROM chunks WHERE file_id = ?1", params![file_id])
        .map_err(StoreError::database)?;
    Ok(n as u64)
}

pub fn soft_delete_for_file(conn: &Connection, file_id: &str, deleted_at: i64) -> Result<u64, StoreError> {
    let n = conn
        .execute(
            "UPDATE chunks SET deleted_at = ?2 WHERE file_id = ?1 AND deleted_at IS NULL",
            params![file_id, deleted_at],
        )
        .map_err(StoreError::database)?;
    Ok(n as u64)
}

pub fn hard_delete_before(conn: &Connection, cutoff: i64) -> Result<u64, StoreError> {
    let n = conn
        .execute(
            "DELETE FROM chunks WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
            params![cutoff],
        )
        .map_err(StoreError::database)?;
    Ok(n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::files;
    use crate::{db, schema};
    use scry_core::config::StorageConfig;
    use scry_core::types::File;
    use tempfile::tempdir;

    fn conn() -> Connection {
        let dir = tempdir().unwrap();
        let c = db::open_connection(&dir.path().join("t.db"), &StorageConfig::default()).unwrap();
        std::mem::forget(dir);
        schema::create_tables(&c).unwrap();
        files::insert(
            &c,
            &File {
                id: "file1".into(),
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
        c
    }

    #[test]
    fn insert_find_and_delete_round_trip() {
        let c = conn();
        let chunk = Chunk {
            id: "c1".into(),
            file_id: "file1".into(),
            symbol_id: None,
            text: "fn foo() {}".into(),
            documentation: None,
            anchor: "a.rs:1:0".into(),
            deleted_at: None,
        };
        insert(&c, &chunk).unwrap();
        assert_eq!(find_by_file(&c, "file1").unwrap().len(), 1);
        delete_for_file(&c, "file1").unwrap();
        assert!(find_by_id(&c, "c1").unwrap().is_none());
    }
}
