//! `watcher_state` singleton repository.

use rusqlite::{Connection, OptionalExtension, params};
use scry_core::error::StoreError;
use scry_core::types::WatcherState;

pub fn load(conn: &Connection) -> Result<WatcherState, StoreError> {
    let row = conn
        .query_row(
            "SELECT is_watching, started_at, stopped_at, events_processed, events_failed,
                    events_skipped, last_event_at, memory_gauge_mb, config_snapshot
             FROM watcher_state WHERE id = 1",
            [],
            |r| {
                let config_snapshot: Option<String> = r.get(8)?;
                Ok(WatcherState {
                    is_watching: r.get::<_, i64>(0)? != 0,
                    started_at: r.get(1)?,
                    stopped_at: r.get(2)?,
                    events_processed: r.get::<_, i64>(3)? as u64,
                    events_failed: r.get::<_, i64>(4)? as u64,
                    events_skipped: r.get::<_, i64>(5)? as u64,
                    last_event_at: r.get(6)?,
                    memory_gauge_mb: r.get(7)?,
                    config_snapshot: config_snapshot.and_then(|s| serde_json::from_str(&s).ok()),
                })
            },
        )
        .optional()
        .map_err(StoreError::database)?;
    Ok(row.unwrap_or_default())
}

pub fn save(conn: &Connection, state: &WatcherState) -> Result<(), StoreError> {
    let config_snapshot = state
        .config_snapshot
        .as_ref()
        .map(|v| serde_json::to_string(v).unwrap_or_default());
    conn.execute(
        "INSERT INTO watcher_state (id, is_watching, started_at, stopped_at, events_processed,
             events_failed, events_skipped, last_event_at, memory_gauge_mb, config_snapshot)
         VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
             is_watching = excluded.is_watching, started_at = excluded.started_at,
             stopped_at = excluded.stopped_at, events_processed = excluded.events_processed,
             events_failed = excluded.events_failed, events_skipped = excluded.events_skipped,
             last_event_at = excluded.last_event_at, memory_gauge_mb = excluded.memory_gauge_mb,
             config_snapshot = excluded.config_snapshot",
        params![
            state.is_watching as i64,
            state.started_at,
            state.stopped_at,
            state.events_processed as i64,
            state.events_failed as i64,
            state.events_skipped as i64,
            state.last_event_at,
            state.memory_gauge_mb,
            config_snapshot,
        ],
    )
    .map_err(StoreError::database)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, schema};
    use scry_core::config::StorageConfig;
    use tempfile::tempdir;

    #[test]
    fn defaults_when_absent_then_round_trips() {
        let dir = tempdir().unwrap();
        let c = db::open_connection(&dir.path().join("t.db"), &StorageConfig::default()).unwrap();
        schema::create_tables(&c).unwrap();
        let loaded = load(&c).unwrap();
        assert!(!loaded.is_watching);

        let mut state = WatcherState::default();
        state.is_watching = true;
        state.events_processed = 42;
        save(&c, &state).unwrap();
        let reloaded = load(&c).unwrap();
        assert!(reloaded.is_watching);
        assert_eq!(reloaded.events_processed, 42);
    }
}
