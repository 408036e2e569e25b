//! Backup snapshots under `<meta>/backups/<basename>_<utc>.db` (spec.md
//! §6 persisted layout). Creation uses SQLite's `VACUUM INTO`, which
//! produces a consistent, compacted single-file snapshot without holding
//! the write lock for the whole copy (it only needs a read transaction).
//! Rotation keeps the most recent `backup_retention_count` files and
//! deletes the rest, run as part of C9's maintenance cycle.

use rusqlite::Connection;
use scry_core::error::StoreError;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// `YYYYMMDDTHHMMSSZ` — a filesystem-safe compact cousin of `Rfc3339` (no
/// colons) since these stamps become file names.
fn compact_format() -> Vec<time::format_description::FormatItem<'static>> {
    time::format_description::parse("[year][month][day]T[hour][minute][second]Z")
        .expect("compact UTC format description is a fixed, valid literal")
}

/// Formats `epoch_secs` as a `YYYYMMDDTHHMMSSZ` UTC stamp for the backup
/// file name.
pub fn format_utc_compact(epoch_secs: i64) -> Result<String, StoreError> {
    let when = OffsetDateTime::from_unix_timestamp(epoch_secs).map_err(StoreError::database)?;
    when.format(&compact_format()).map_err(StoreError::database)
}

/// Parses a `YYYYMMDDTHHMMSSZ` stamp back into an `OffsetDateTime`, for
/// interpreting a backup file name's age rather than relying on lexical
/// filename order.
pub fn parse_utc_compact(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value, &compact_format()).ok()
}

/// Snapshots `conn`'s database into `<backups_dir>/<basename>_<utc>.db`
/// via `VACUUM INTO`. `backups_dir` is created if missing.
pub fn create_backup(
    conn: &Connection,
    backups_dir: &Path,
    basename: &str,
    now_epoch_secs: i64,
) -> Result<PathBuf, StoreError> {
    std::fs::create_dir_all(backups_dir).map_err(StoreError::Io)?;
    let file_name = format!("{basename}_{}.db", format_utc_compact(now_epoch_secs)?);
    let dest = backups_dir.join(&file_name);
    // VACUUM INTO refuses to overwrite an existing file.
    let _ = std::fs::remove_file(&dest);
    conn.execute("VACUUM INTO ?1", [dest.to_string_lossy().into_owned()])
        .map_err(StoreError::database)?;
    Ok(dest)
}

/// Deletes all but the `retention_count` most-recently-named backups for
/// `basename` in `backups_dir` (lexical order on the `<utc>` suffix is
/// chronological). Returns how many were removed.
pub fn prune_backups(backups_dir: &Path, basename: &str, retention_count: u32) -> Result<u64, StoreError> {
    if !backups_dir.exists() {
        return Ok(0);
    }
    let prefix = format!("{basename}_");
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(backups_dir)
        .map_err(StoreError::Io)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".db"))
        })
        .collect();
    candidates.sort();

    let retention_count = retention_count as usize;
    if candidates.len() <= retention_count {
        return Ok(0);
    }
    let to_remove = candidates.len() - retention_count;
    let mut removed = 0u64;
    for path in &candidates[..to_remove] {
        if std::fs::remove_file(path).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, schema};
    use scry_core::config::StorageConfig;
    use tempfile::tempdir;

    #[test]
    fn formats_known_epoch() {
        // 2021-01-01T00:00:00Z
        assert_eq!(format_utc_compact(1_609_459_200).unwrap(), "20210101T000000Z");
        // 1970-01-01T00:00:00Z
        assert_eq!(format_utc_compact(0).unwrap(), "19700101T000000Z");
    }

    #[test]
    fn round_trips_through_parse() {
        let stamp = format_utc_compact(1_609_459_200).unwrap();
        let parsed = parse_utc_compact(&stamp).unwrap();
        assert_eq!(parsed.unix_timestamp(), 1_609_459_200);
    }

    #[test]
    fn creates_a_backup_file() {
        let dir = tempdir().unwrap();
        let conn = db::open_connection(&dir.path().join("index.db"), &StorageConfig::default()).unwrap();
        schema::create_tables(&conn).unwrap();

        let backups_dir = dir.path().join("backups");
        let dest = create_backup(&conn, &backups_dir, "index", 1_609_459_200).unwrap();
        assert!(dest.exists());
        assert_eq!(dest.file_name().unwrap().to_str().unwrap(), "index_20210101T000000Z.db");
    }

    #[test]
    fn prunes_down_to_retention_count() {
        let dir = tempdir().unwrap();
        let backups_dir = dir.path();
        for ts in ["20210101T000000Z", "20210102T000000Z", "20210103T000000Z"] {
            std::fs::write(backups_dir.join(format!("index_{ts}.db")), b"x").unwrap();
        }
        let removed = prune_backups(backups_dir, "index", 2).unwrap();
        assert_eq!(removed, 1);
        assert!(!backups_dir.join("index_20210101T000000Z.db").exists());
        assert!(backups_dir.join("index_20210102T000000Z.db").exists());
        assert!(backups_dir.join("index_20210103T000000Z.db").exists());
    }
}
