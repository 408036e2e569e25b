//! Raw and coalesced change events. Kept separate from the
//! `notify` crate's own event types so the debounce/batch logic in
//! [`crate::debounce`] stays pure and independent of the OS notification
//! backend.

use serde::{Deserialize, Serialize};

/// Terminal state a path can settle into after coalescing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
    /// `old_path` is preserved alongside the (implicit) new path, which is
    /// the event's own `path` field.
    Rename { old_path: String },
}

impl ChangeKind {
    /// Sort priority for batch delivery order. Rename carries a new
    /// file into existence at its target path, so it sorts with `Create`.
    pub fn delivery_priority(&self) -> u8 {
        match self {
            ChangeKind::Delete => 0,
            ChangeKind::Modify => 1,
            ChangeKind::Create | ChangeKind::Rename { .. } => 2,
        }
    }
}

/// One raw, timestamped observation of a path changing. `observed_at_ms` is
/// a logical millisecond clock so the coalescer is testable without real
/// wall-clock sleeps; [`crate::pipeline`] feeds it from `Instant`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub path: String,
    pub kind: ChangeKind,
    pub observed_at_ms: u64,
}

/// One path's terminal state after debounce coalescing, ready for delivery
/// in a [`crate::debounce::Batch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub path: String,
    pub kind: ChangeKind,
    /// User-initiated files may be marked high priority and moved to the
    /// head of the batch.
    pub high_priority: bool,
}
