//! `with_write_lock`: begins an immediate-mode transaction,
//! backs off on `SQLITE_BUSY` per `scry_core::lock::BackoffSchedule`,
//! commits on success and rolls back (then rethrows) on failure.

use rusqlite::{Connection, TransactionBehavior};
use scry_core::error::StoreError;
use scry_core::lock::{BackoffConfig, BackoffSchedule};
use std::sync::Mutex;
use tracing::{error, warn};

/// Wraps the single connection this store writes through. Exactly one
/// writer may hold the connection at a time; a `Mutex` enforces that
/// in-process (across processes, SQLite's own file locking backs it up).
pub struct WriteLock {
    conn: Mutex<Connection>,
    backoff: BackoffConfig,
}

impl WriteLock {
    pub fn new(conn: Connection, backoff: BackoffConfig) -> Self {
        Self {
            conn: Mutex::new(conn),
            backoff,
        }
    }

    /// Runs `f` inside a `BEGIN IMMEDIATE` transaction. Commits on `Ok`,
    /// rolls back and rethrows on `Err`. Retries transaction *acquisition*
    /// (not `f` itself) on busy per the backoff schedule.
    pub fn with_write_lock<T, E>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, E>,
    ) -> Result<T, StoreError>
    where
        E: std::fmt::Display,
    {
        let mut guard = self.conn.lock().expect("write-lock mutex poisoned");
        let mut schedule = BackoffSchedule::new(self.backoff);

        loop {
            match guard.transaction_with_behavior(TransactionBehavior::Immediate) {
                Ok(tx) => {
                    let result = f(&tx);
                    return match result {
                        Ok(value) => {
                            tx.commit().map_err(StoreError::database)?;
                            Ok(value)
                        }
                        Err(e) => {
                            let _ = tx.rollback();
                            Err(StoreError::database(e))
                        }
                    };
                }
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::DatabaseBusy =>
                {
                    match schedule.next_delay() {
                        Some(delay) => {
                            warn!(elapsed_ms = schedule.elapsed_ms(), "write lock busy, backing off");
                            std::thread::sleep(delay);
                        }
                        None => {
                            error!(
                                elapsed_ms = schedule.elapsed_ms(),
                                "gave up acquiring the write lock"
                            );
                            return Err(StoreError::WriteLockTimeout {
                                elapsed_ms: schedule.elapsed_ms(),
                            });
                        }
                    }
                }
                Err(e) => return Err(StoreError::database(e)),
            }
        }
    }

    /// Direct read-only access, for repositories that only ever read.
    /// Multiple concurrent readers are permitted in principle, but this
    /// in-process implementation uses a single connection, so reads here
    /// are serialized with writes at the mutex level; a production
    /// deployment would open a second read-only connection against the
    /// same WAL file.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let guard = self.conn.lock().expect("write-lock mutex poisoned");
        f(&guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, schema};
    use scry_core::config::StorageConfig;
    use tempfile::tempdir;

    fn open() -> WriteLock {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        std::mem::forget(dir); // keep file alive for the test's duration
        let conn = db::open_connection(&path, &StorageConfig::default()).unwrap();
        schema::create_tables(&conn).unwrap();
        WriteLock::new(conn, BackoffConfig::default())
    }

    #[test]
    fn commits_on_success() {
        let lock = open();
        lock.with_write_lock::<_, String>(|tx| {
            tx.execute(
                "INSERT INTO meta (key, value) VALUES ('k', 'v')",
                [],
            )
            .map_err(|e| e.to_string())?;
            Ok(())
        })
        .unwrap();

        lock.with_connection(|conn| {
            let v: String = conn
                .query_row("SELECT value FROM meta WHERE key = 'k'", [], |r| r.get(0))
                .map_err(StoreError::database)?;
            assert_eq!(v, "v");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn rolls_back_on_failure() {
        let lock = open();
        let result = lock.with_write_lock::<(), String>(|tx| {
            tx.execute("INSERT INTO meta (key, value) VALUES ('k2', 'v2')", [])
                .map_err(|e| e.to_string())?;
            Err("boom".to_string())
        });
        assert!(result.is_err());

        lock.with_connection(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM meta WHERE key = 'k2'", [], |r| r.get(0))
                .map_err(StoreError::database)?;
            assert_eq!(count, 0);
            Ok(())
        })
        .unwrap();
    }
}
