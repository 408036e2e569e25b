//! C1: the persistent store. Typed access to the relational
//! schema, single-writer discipline via `WriteLock`, and the maintenance
//! scheduler (C9).

pub mod backup;
pub mod db;
pub mod maintenance;
pub mod repo;
pub mod schema;
pub mod write_lock;

use scry_core::config::StorageConfig;
use scry_core::error::StoreError;
use scry_core::lock::BackoffConfig;
use std::path::Path;
use write_lock::WriteLock;

/// The open store: a connection wrapped by the write lock, schema already
/// migrated and integrity-checked.
pub struct Store {
    pub lock: WriteLock,
}

impl Store {
    /// Opens (creating if absent) the store at `db_path`, applies pragmas,
    /// runs migrations, and validates integrity. Integrity failures are
    /// fatal per  — the store refuses to serve.
    pub fn open(db_path: &Path, storage: &StorageConfig) -> Result<Self, StoreError> {
        let conn = db::open_connection(db_path, storage)?;
        schema::create_tables(&conn)?;

        if !db::integrity_check(&conn)? {
            return Err(StoreError::IntegrityCheck(
                "PRAGMA integrity_check did not return ok".to_string(),
            ));
        }
        let fk_violations = db::foreign_key_check(&conn)?;
        if !fk_violations.is_empty() {
            return Err(StoreError::ForeignKeyViolation(fk_violations));
        }

        let backoff = BackoffConfig {
            timeout_ms: storage.busy_timeout_ms as u64,
            ..BackoffConfig::default()
        };
        Ok(Self {
            lock: WriteLock::new(conn, backoff),
        })
    }

    pub fn with_write_lock<T, E: std::fmt::Display>(
        &self,
        f: impl FnOnce(&rusqlite::Connection) -> Result<T, E>,
    ) -> Result<T, StoreError> {
        self.lock.with_write_lock(f)
    }

    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&rusqlite::Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.lock.with_connection(f)
    }

    /// Re-runs the integrity/foreign-key checks.
    pub fn diagnose(&self) -> Result<(bool, Vec<String>), StoreError> {
        self.with_connection(|conn| {
            let ok = db::integrity_check(conn)?;
            let violations = db::foreign_key_check(conn)?;
            Ok((ok, violations))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_schema_and_passes_integrity() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("index.db"), &StorageConfig::default()).unwrap();
        let (ok, violations) = store.diagnose().unwrap();
        assert!(ok);
        assert!(violations.is_empty());
    }
}
