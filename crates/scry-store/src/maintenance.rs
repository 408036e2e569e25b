//! C9 Maintenance Scheduler: retention-based hard-deletion,
//! `ANALYZE`, and `VACUUM`-on-threshold. Single-flight: a concurrent call
//! while a cycle is running returns `Skipped` rather than waiting, since
//! the point of this flag is "someone else already holds this", not a
//! queue to wait on.

use crate::backup;
use crate::repo::{chunks, files, symbols};
use crate::write_lock::WriteLock;
use scry_core::error::StoreError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

pub struct MaintenanceScheduler {
    running: AtomicBool,
}

impl Default for MaintenanceScheduler {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(false),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub files_hard_deleted: u64,
    pub symbols_hard_deleted: u64,
    pub chunks_hard_deleted: u64,
    pub analyzed: bool,
    pub vacuumed: bool,
    pub backup_path: Option<PathBuf>,
    pub backups_pruned: u64,
}

/// Where and how often to snapshot the store before the cycle's
/// irreversible hard-deletion step.
#[derive(Debug, Clone)]
pub struct BackupPolicy {
    pub backups_dir: PathBuf,
    pub basename: String,
    pub retention_count: u32,
}

pub enum MaintenanceOutcome {
    Ran(MaintenanceReport),
    Skipped,
}

impl MaintenanceScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one maintenance cycle. Cleanup runs under
    /// the write lock; `ANALYZE`/`VACUUM` run with their own transactional
    /// requirements (outside the write-lock's single transaction, since
    /// `VACUUM` cannot run inside one).
    pub fn run(
        &self,
        lock: &WriteLock,
        retention_days: i64,
        vacuum_threshold: u64,
        now: i64,
        backup_policy: Option<&BackupPolicy>,
    ) -> Result<MaintenanceOutcome, StoreError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(MaintenanceOutcome::Skipped);
        }

        let result = self.run_locked(lock, retention_days, vacuum_threshold, now, backup_policy);
        self.running.store(false, Ordering::Release);
        result.map(MaintenanceOutcome::Ran)
    }

    fn run_locked(
        &self,
        lock: &WriteLock,
        retention_days: i64,
        vacuum_threshold: u64,
        now: i64,
        backup_policy: Option<&BackupPolicy>,
    ) -> Result<MaintenanceReport, StoreError> {
        let cutoff = now - retention_days * 86_400;

        // Step 0: snapshot before the irreversible hard-delete step below.
        let (backup_path, backups_pruned) = match backup_policy {
            Some(policy) => {
                let path = lock.with_connection(|conn| {
                    backup::create_backup(conn, &policy.backups_dir, &policy.basename, now)
                })?;
                let pruned = backup::prune_backups(&policy.backups_dir, &policy.basename, policy.retention_count)?;
                (Some(path), pruned)
            }
            None => (None, 0),
        };

        // Step 1: hard-delete soft-deleted rows past retention. Embeddings
        // cascade via the `ON DELETE CASCADE` FK on chunks, but 
        // step 1 says "cascade to Embeddings explicitly first" — done here
        // by deleting chunks (and their embeddings via the FK) before
        // symbols and files, oldest-dependent-first.
        let (chunks_deleted, symbols_deleted, files_deleted) = lock.with_write_lock(|tx| {
            let chunks_deleted = chunks::hard_delete_before(tx, cutoff)?;
            let symbols_deleted = symbols::hard_delete_before(tx, cutoff)?;
            let files_deleted = files::hard_delete_before(tx, cutoff)?;
            Ok::<_, StoreError>((chunks_deleted, symbols_deleted, files_deleted))
        })?;

        let total_deleted = chunks_deleted + symbols_deleted + files_deleted;
        info!(
            chunks_deleted,
            symbols_deleted, files_deleted, "maintenance retention cleanup complete"
        );

        // Step 2: refresh optimizer statistics.
        lock.with_connection(|conn| {
            conn.execute_batch("ANALYZE;").map_err(StoreError::database)
        })?;

        // Step 3: space reclamation, gated on the cycle's delete volume.
        let vacuumed = if total_deleted >= vacuum_threshold {
            lock.with_connection(|conn| conn.execute_batch("VACUUM;").map_err(StoreError::database))?;
            true
        } else {
            false
        };

        Ok(MaintenanceReport {
            files_hard_deleted: files_deleted,
            symbols_hard_deleted: symbols_deleted,
            chunks_hard_deleted: chunks_deleted,
            analyzed: true,
            vacuumed,
            backup_path,
            backups_pruned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::schema;
    use scry_core::config::StorageConfig;
    use scry_core::lock::BackoffConfig;
    use scry_core::types::File;
    use tempfile::tempdir;

    fn setup() -> WriteLock {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        std::mem::forget(dir);
        let conn = db::open_connection(&path, &StorageConfig::default()).unwrap();
        schema::create_tables(&conn).unwrap();
        WriteLock::new(conn, BackoffConfig::default())
    }

    #[test]
    fn hard_deletes_rows_past_retention_and_analyzes() {
        let lock = setup();
        lock.with_write_lock(|tx| {
            files::insert(
                tx,
                &File {
                    id: "f1".into(),
                    path: "a.rs".into(),
                    content_hash: "h".into(),
                    language: None,
                    size_bytes: 1,
                    modified_at: 0,
                    indexed_at: 0,
                    deleted_at: Some(10),
                },
            )
        })
        .unwrap();

        let scheduler = MaintenanceScheduler::new();
        let outcome = scheduler.run(&lock, 1, 1_000_000, 10_000_000, None).unwrap();
        match outcome {
            MaintenanceOutcome::Ran(report) => {
                assert_eq!(report.files_hard_deleted, 1);
                assert!(report.analyzed);
                assert!(!report.vacuumed);
            }
            MaintenanceOutcome::Skipped => panic!("expected the cycle to run"),
        }
    }

    #[test]
    fn backs_up_and_prunes_when_a_policy_is_given() {
        let lock = setup();
        let backups_dir = tempdir().unwrap();
        let policy = BackupPolicy {
            backups_dir: backups_dir.path().to_path_buf(),
            basename: "index".to_string(),
            retention_count: 1,
        };

        let scheduler = MaintenanceScheduler::new();
        let first = scheduler
            .run(&lock, 30, 1_000_000, 1_609_459_200, Some(&policy))
            .unwrap();
        let MaintenanceOutcome::Ran(report) = first else {
            panic!("expected the cycle to run");
        };
        let path = report.backup_path.expect("backup policy was given");
        assert!(path.exists());
        assert_eq!(report.backups_pruned, 0);

        let second = scheduler
            .run(&lock, 30, 1_000_000, 1_609_545_600, Some(&policy))
            .unwrap();
        let MaintenanceOutcome::Ran(report) = second else {
            panic!("expected the cycle to run");
        };
        assert_eq!(report.backups_pruned, 1);
        assert!(!path.exists());
    }

    #[test]
    fn concurrent_invocation_is_single_flight() {
        let lock = setup();
        let scheduler = MaintenanceScheduler::new();
        scheduler.running.store(true, Ordering::SeqCst);
        let outcome = scheduler.run(&lock, 30, 1000, 0, None).unwrap();
        assert!(matches!(outcome, MaintenanceOutcome::Skipped));
    }
}
