//! C7 (watcher pipeline) and C8 (incremental indexer).
//!
//! [`pipeline::WatcherPipeline`] turns OS filesystem notifications into
//! deterministically-ordered, debounced, backpressure-aware batches;
//! [`indexer::IncrementalIndexer`] consumes those batches and applies them
//! to the persistent store (`scry-store`) and hybrid index (`scry-hybrid`)
//! under the store's single-writer lock.

pub mod debounce;
pub mod event;
pub mod ignore_filter;
pub mod indexer;
pub mod parser;
pub mod pipeline;

pub use event::{ChangeEvent, ChangeKind};
pub use ignore_filter::IgnoreFilter;
pub use indexer::{BatchResult, IncrementalIndexer};
pub use parser::{Parser, PlainTextParser};
pub use pipeline::{Batch, WatcherAlert, WatcherPhase, WatcherPipeline};
