//! `files` repository.

use rusqlite::{Connection, OptionalExtension, params};
use scry_core::error::StoreError;
use scry_core::types::File;

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<File> {
    Ok(File {
        id: row.get("id")?,
        path: row.get("file_path")?,
        content_hash: row.get("content_hash")?,
        language: row.get("language")?,
        size_bytes: row.get::<_, i64>("size")? as u64,
        modified_at: row.get("modified_at")?,
        indexed_at: row.get("indexed_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

pub fn insert(conn: &Connection, file: &File) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO files (id, file_path, content_hash, language, size, modified_at, indexed_at, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
             file_path = excluded.file_path,
             content_hash = excluded.content_hash,
             language = excluded.language,
             size = excluded.size,
             modified_at = excluded.modified_at,
             indexed_at = excluded.indexed_at,
             deleted_at = excluded.deleted_at",
        params![
            file.id,
            file.path,
            file.content_hash,
            file.language,
            file.size_bytes as i64,
            file.modified_at,
            file.indexed_at,
            file.deleted_at,
        ],
    )
    .map_err(StoreError::database)?;
    Ok(())
}

pub fn insert_batch(conn: &Connection, files: &[File]) -> Result<(), StoreError> {
    for file in files {
        insert(conn, file)?;
    }
    Ok(())
}

pub fn update(conn: &Connection, file: &File) -> Result<(), StoreError> {
    insert(conn, file)
}

pub fn find_by_path(conn: &Connection, path: &str) -> Result<Option<File>, StoreError> {
    conn.query_row(
        "SELECT id, file_path, content_hash, language, size, modified_at, indexed_at, deleted_at
         FROM files WHERE file_path = ?1 AND deleted_at IS NULL",
        params![path],
        row_to_file,
    )
    .optional()
    .map_err(StoreError::database)
}

pub fn find_by_hash(conn: &Connection, content_hash: &str) -> Result<Vec<File>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, file_path, content_hash, language, size, modified_at, indexed_at, deleted_at
             FROM files WHERE content_hash = ?1 AND deleted_at IS NULL",
        )
        .map_err(StoreError::database)?;
    let rows = stmt
        .query_map(params![content_hash], row_to_file)
        .map_err(StoreError::database)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(StoreError::database)
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<File>, StoreError> {
    conn.query_row(
        "SELECT id, file_path, content_hash, language, size, modified_at, indexed_at, deleted_at
         FROM files WHERE id = ?1",
        params![id],
        row_to_file,
    )
    .optional()
    .map_err(StoreError::database)
}

/// Soft-delete per  File lifecycle: sets `deleted_at`, monotonically.
pub fn soft_delete(conn: &Connection, id: &str, deleted_at: i64) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE files SET deleted_at = ?2 WHERE id = ?1 AND (deleted_at IS NULL OR deleted_at < ?2)",
        params![id, deleted_at],
    )
    .map_err(StoreError::database)?;
    Ok(())
}

/// Hard-delete rows soft-deleted before `cutoff`.
/// Returns the number of rows removed.
pub fn hard_delete_before(conn: &Connection, cutoff: i64) -> Result<u64, StoreError> {
    let count = conn
        .execute(
            "DELETE FROM files WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
            params![cutoff],
        )
        .map_err(StoreError::database)?;
    Ok(count as u64)
}

pub fn count_live(conn: &Connection) -> Result<u64, StoreError> {
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM files WHERE deleted_at IS NULL", [], |r| r.get(0))
        .map_err(StoreError::database)?;
    Ok(n as u64)
}
