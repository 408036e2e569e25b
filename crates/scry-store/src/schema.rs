//! Schema DDL and migrations: a baseline `SCHEMA_SQL` plus an ordered
//! array of migration functions, tracked in a `migration_history` table.

use rusqlite::Connection;
use scry_core::error::StoreError;
use tracing::info;

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

pub fn create_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA_SQL).map_err(StoreError::database)?;
    migrate(conn)?;
    info!(version = CURRENT_SCHEMA_VERSION, "store schema ready");
    Ok(())
}

pub fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migration_history (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            checksum TEXT NOT NULL
        );",
    )
    .map_err(StoreError::database)?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM migration_history",
            [],
            |row| row.get(0),
        )
        .map_err(StoreError::database)?;

    if current > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::SchemaMigrationRequired {
            current,
            required: CURRENT_SCHEMA_VERSION,
        });
    }

    type MigrationFn = fn(&Connection) -> Result<(), StoreError>;

    // Index 0 = version 1 (the baseline schema, already created by
    // SCHEMA_SQL — nothing further to do here). Future migrations append.
    let migrations: &[MigrationFn] = &[|_conn| Ok(())];

    for version in (current + 1)..=CURRENT_SCHEMA_VERSION {
        let idx = (version - 1) as usize;
        if let Some(step) = migrations.get(idx) {
            step(conn)?;
        }
        let checksum = scry_core::ids::content_hash(format!("schema-v{version}").as_bytes());
        conn.execute(
            "INSERT INTO migration_history (version, applied_at, checksum) VALUES (?1, ?2, ?3)",
            rusqlite::params![version, now(), checksum],
        )
        .map_err(StoreError::database)?;
        info!(version, "applied schema migration");
    }

    Ok(())
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id TEXT PRIMARY KEY,
    file_path TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    language TEXT,
    size INTEGER NOT NULL,
    modified_at INTEGER NOT NULL,
    indexed_at INTEGER NOT NULL,
    deleted_at INTEGER
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_files_path_live
    ON files(file_path) WHERE deleted_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_files_content_hash ON files(content_hash);
CREATE INDEX IF NOT EXISTS idx_files_deleted_at ON files(deleted_at);

CREATE TABLE IF NOT EXISTS symbols (
    id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    start_column INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    end_column INTEGER NOT NULL,
    start_byte INTEGER NOT NULL,
    end_byte INTEGER NOT NULL,
    parents TEXT NOT NULL DEFAULT '[]',
    signature TEXT,
    documentation TEXT,
    content_hash TEXT NOT NULL,
    deleted_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_symbols_file_id ON symbols(file_id);
CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
CREATE INDEX IF NOT EXISTS idx_symbols_deleted_at ON symbols(deleted_at);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    symbol_id TEXT REFERENCES symbols(id) ON DELETE CASCADE,
    text TEXT NOT NULL,
    documentation TEXT,
    anchor TEXT NOT NULL,
    deleted_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_chunks_file_id ON chunks(file_id);
CREATE INDEX IF NOT EXISTS idx_chunks_symbol_id ON chunks(symbol_id);
CREATE INDEX IF NOT EXISTS idx_chunks_deleted_at ON chunks(deleted_at);

CREATE TABLE IF NOT EXISTS embeddings (
    chunk_id TEXT NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    model TEXT NOT NULL,
    dim INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (chunk_id, model)
);

CREATE VIRTUAL TABLE IF NOT EXISTS search USING fts5(
    content,
    documentation,
    file_id UNINDEXED,
    symbol_id UNINDEXED,
    file_path UNINDEXED,
    tokenize = 'porter unicode61'
);

CREATE TABLE IF NOT EXISTS calls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    caller_id TEXT NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
    callee_name TEXT NOT NULL,
    callee_file_id TEXT REFERENCES files(id) ON DELETE SET NULL,
    start_line INTEGER NOT NULL,
    start_column INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    end_column INTEGER NOT NULL,
    start_byte INTEGER NOT NULL,
    end_byte INTEGER NOT NULL,
    deleted_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_calls_caller_id ON calls(caller_id);
CREATE INDEX IF NOT EXISTS idx_calls_callee_name ON calls(callee_name);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS watcher_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    is_watching INTEGER NOT NULL DEFAULT 0,
    started_at INTEGER,
    stopped_at INTEGER,
    events_processed INTEGER NOT NULL DEFAULT 0,
    events_failed INTEGER NOT NULL DEFAULT 0,
    events_skipped INTEGER NOT NULL DEFAULT 0,
    last_event_at INTEGER,
    memory_gauge_mb REAL NOT NULL DEFAULT 0,
    config_snapshot TEXT
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use scry_core::config::StorageConfig;
    use tempfile::tempdir;

    #[test]
    fn creates_all_tables() {
        let dir = tempdir().unwrap();
        let conn = db::open_connection(&dir.path().join("t.db"), &StorageConfig::default()).unwrap();
        create_tables(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type IN ('table','view') ORDER BY name")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for expected in [
            "files",
            "symbols",
            "chunks",
            "embeddings",
            "calls",
            "meta",
            "migration_history",
            "watcher_state",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }
    }

    #[test]
    fn idempotent_and_tracks_version() {
        let dir = tempdir().unwrap();
        let conn = db::open_connection(&dir.path().join("t.db"), &StorageConfig::default()).unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM migration_history", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn path_unique_among_live_rows_only() {
        let dir = tempdir().unwrap();
        let conn = db::open_connection(&dir.path().join("t.db"), &StorageConfig::default()).unwrap();
        create_tables(&conn).unwrap();
        conn.execute(
            "INSERT INTO files (id, file_path, content_hash, size, modified_at, indexed_at, deleted_at)
             VALUES ('f1', 'a.rs', 'h1', 10, 0, 0, 100)",
            [],
        )
        .unwrap();
        // A second, live row at the same path is fine once the first is soft-deleted.
        conn.execute(
            "INSERT INTO files (id, file_path, content_hash, size, modified_at, indexed_at, deleted_at)
             VALUES ('f2', 'a.rs', 'h2', 20, 1, 1, NULL)",
            [],
        )
        .unwrap();
        // A second *live* row at the same path must fail.
        let result = conn.execute(
            "INSERT INTO files (id, file_path, content_hash, size, modified_at, indexed_at, deleted_at)
             VALUES ('f3', 'a.rs', 'h3', 30, 2, 2, NULL)",
            [],
        );
        assert!(result.is_err());
    }
}
