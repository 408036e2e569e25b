//! Connection setup: pragma configuration and integrity checks.

use rusqlite::Connection;
use scry_core::config::StorageConfig;
use scry_core::error::StoreError;
use std::path::Path;
use tracing::info;

/// Open a SQLite connection and apply the full pragma set: WAL journal
/// mode, synchronous=NORMAL, configurable cache size, mmap I/O, WAL
/// auto-checkpoint, foreign keys on.
pub fn open_connection(db_path: &Path, cfg: &StorageConfig) -> Result<Connection, StoreError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
    }

    let conn = Connection::open(db_path).map_err(StoreError::database)?;
    apply_pragmas(&conn, cfg)?;
    info!(db_path = %db_path.display(), "store connection opened");
    Ok(conn)
}

fn apply_pragmas(conn: &Connection, cfg: &StorageConfig) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = {busy_timeout_ms};
         PRAGMA cache_size = {cache_size_kib};
         PRAGMA mmap_size = {mmap_size_bytes};
         PRAGMA wal_autocheckpoint = {wal_autocheckpoint_pages};",
        busy_timeout_ms = cfg.busy_timeout_ms,
        cache_size_kib = cfg.cache_size_kib,
        mmap_size_bytes = cfg.mmap_size_bytes,
        wal_autocheckpoint_pages = cfg.wal_autocheckpoint_pages,
    ))
    .map_err(StoreError::database)?;
    Ok(())
}

/// `integrity_check` per : must return a single "ok" row.
pub fn integrity_check(conn: &Connection) -> Result<bool, StoreError> {
    let result: String = conn
        .query_row("PRAGMA integrity_check", [], |row| row.get(0))
        .map_err(StoreError::database)?;
    Ok(result == "ok")
}

/// `foreign_key_check` per : must return no rows.
pub fn foreign_key_check(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn
        .prepare("PRAGMA foreign_key_check")
        .map_err(StoreError::database)?;
    let rows = stmt
        .query_map([], |row| {
            let table: String = row.get(0)?;
            let rowid: Option<i64> = row.get(1)?;
            let parent: String = row.get(2)?;
            Ok(format!("{table}(rowid={rowid:?}) -> {parent}"))
        })
        .map_err(StoreError::database)?;
    let mut violations = Vec::new();
    for row in rows {
        violations.push(row.map_err(StoreError::database)?);
    }
    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn opens_with_wal_and_foreign_keys_on() {
        let dir = tempdir().unwrap();
        let conn = open_connection(&dir.path().join("t.db"), &StorageConfig::default()).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |r| r.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
        let fk: i32 = conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0)).unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn integrity_check_passes_on_fresh_db() {
        let dir = tempdir().unwrap();
        let conn = open_connection(&dir.path().join("t.db"), &StorageConfig::default()).unwrap();
        assert!(integrity_check(&conn).unwrap());
        assert!(foreign_key_check(&conn).unwrap().is_empty());
    }
}
