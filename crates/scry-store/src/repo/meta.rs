//! `meta` key/value repository. Used for the embedding-dimension
//! policy decision recorded in.1 (`embedding_dim`) and the
//! hybrid schema version.

use rusqlite::{Connection, OptionalExtension, params};
use scry_core::error::StoreError;

pub fn get(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    conn.query_row("SELECT value FROM meta WHERE key = ?1", params![key], |r| r.get(0))
        .optional()
        .map_err(StoreError::database)
}

pub fn set(conn: &Connection, key: &str, value: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )
    .map_err(StoreError::database)?;
    Ok(())
}

pub fn get_i64(conn: &Connection, key: &str) -> Result<Option<i64>, StoreError> {
    Ok(get(conn, key)?.and_then(|v| v.parse().ok()))
}

pub fn set_i64(conn: &Connection, key: &str, value: i64) -> Result<(), StoreError> {
    set(conn, key, &value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, schema};
    use scry_core::config::StorageConfig;
    use tempfile::tempdir;

    #[test]
    fn set_get_round_trip_and_upsert() {
        let dir = tempdir().unwrap();
        let c = db::open_connection(&dir.path().join("t.db"), &StorageConfig::default()).unwrap();
        schema::create_tables(&c).unwrap();
        set_i64(&c, "embedding_dim", 384).unwrap();
        assert_eq!(get_i64(&c, "embedding_dim").unwrap(), Some(384));
        set_i64(&c, "embedding_dim", 768).unwrap();
        assert_eq!(get_i64(&c, "embedding_dim").unwrap(), Some(768));
    }
}
