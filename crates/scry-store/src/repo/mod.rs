//! Per-entity repositories. Each module is a thin, typed
//! wrapper around prepared SQL against the schema in `crate::schema`; none
//! of them know about the write lock — callers run writes inside
//! `WriteLock::with_write_lock` and reads through `WriteLock::with_connection`
//! or a plain `&Connection`.

pub mod calls;
pub mod chunks;
pub mod embeddings;
pub mod files;
pub mod meta;
pub mod search;
pub mod symbols;
pub mod watcher_state;
