//! Per-path debounce coalescing and batching. Pure with respect
//! to time: callers supply a logical millisecond clock (`notify`/real
//! `Instant` in [`crate::pipeline`], a plain counter in tests) so the
//! coalescing rules are testable without real sleeps.

use crate::event::{ChangeEvent, ChangeKind, RawEvent};
use std::collections::HashMap;

struct PendingEntry {
    kind: ChangeKind,
    last_seen_ms: u64,
    high_priority: bool,
}

/// Coalesces a stream of [`RawEvent`]s per path into terminal states, then
/// drains paths whose debounce window has elapsed into delivery-ordered
/// batches.
pub struct Coalescer {
    debounce_delay_ms: u64,
    pending: HashMap<String, PendingEntry>,
}

impl Coalescer {
    pub fn new(debounce_delay_ms: u64) -> Self {
        Self {
            debounce_delay_ms,
            pending: HashMap::new(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Folds one raw observation into the path's terminal state: create
    /// followed by delete within the window cancels; modify replaces
    /// earlier modifies; rename is preserved with both paths.
    pub fn observe(&mut self, event: RawEvent) {
        let high_priority = matches!(&event.kind, ChangeKind::Rename { .. }) || event.high_priority_hint();
        match self.pending.remove(&event.path) {
            None => {
                self.pending.insert(
                    event.path,
                    PendingEntry {
                        kind: event.kind,
                        last_seen_ms: event.observed_at_ms,
                        high_priority,
                    },
                );
            }
            Some(existing) => {
                if let Some(merged) = merge(existing.kind, event.kind) {
                    self.pending.insert(
                        event.path,
                        PendingEntry {
                            kind: merged,
                            last_seen_ms: event.observed_at_ms,
                            high_priority: existing.high_priority || high_priority,
                        },
                    );
                }
                // `None` means create-then-delete cancelled out: drop the path entirely.
            }
        }
    }

    /// Drains every path whose last observation is at least
    /// `debounce_delay_ms` old as of `now_ms`, in deterministic delivery
    /// order: by file path, then delete before modify before create.
    pub fn drain_ready(&mut self, now_ms: u64) -> Vec<ChangeEvent> {
        let ready_paths: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, entry)| now_ms.saturating_sub(entry.last_seen_ms) >= self.debounce_delay_ms)
            .map(|(path, _)| path.clone())
            .collect();

        let mut out: Vec<ChangeEvent> = ready_paths
            .into_iter()
            .filter_map(|path| {
                self.pending.remove(&path).map(|entry| ChangeEvent {
                    path,
                    kind: entry.kind,
                    high_priority: entry.high_priority,
                })
            })
            .collect();

        sort_for_delivery(&mut out);
        out
    }

    /// Drops the oldest entries once `pending_count` exceeds `max`, to
    /// bound memory under sustained write storms.
    /// Create/Modify/Delete entries are shed first (oldest `last_seen_ms`
    /// first); renames are preserved as long as possible since they carry
    /// identity information a later re-scan cannot cheaply recover. Returns
    /// the number of entries shed.
    pub fn shed_excess(&mut self, max: usize) -> usize {
        if self.pending.len() <= max {
            return 0;
        }
        let mut candidates: Vec<(String, u64, bool)> = self
            .pending
            .iter()
            .map(|(path, entry)| {
                (
                    path.clone(),
                    entry.last_seen_ms,
                    matches!(entry.kind, ChangeKind::Rename { .. }),
                )
            })
            .collect();
        candidates.sort_by(|a, b| a.2.cmp(&b.2).then_with(|| a.1.cmp(&b.1)));

        let mut shed = 0;
        for (path, _, _) in candidates {
            if self.pending.len() <= max {
                break;
            }
            self.pending.remove(&path);
            shed += 1;
        }
        shed
    }

    /// Force-drains everything regardless of debounce age (used when a
    /// batch must be emitted because it hit `batch_size`, or on pipeline
    /// shutdown to flush in-flight state).
    pub fn drain_all(&mut self) -> Vec<ChangeEvent> {
        let mut out: Vec<ChangeEvent> = self
            .pending
            .drain()
            .map(|(path, entry)| ChangeEvent {
                path,
                kind: entry.kind,
                high_priority: entry.high_priority,
            })
            .collect();
        sort_for_delivery(&mut out);
        out
    }
}

/// Batch delivery order: by path, then delete < modify <
/// create/rename. High-priority (user-initiated) events move to the head,
/// stable otherwise.
fn sort_for_delivery(events: &mut [ChangeEvent]) {
    events.sort_by(|a, b| {
        b.high_priority
            .cmp(&a.high_priority)
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.kind.delivery_priority().cmp(&b.kind.delivery_priority()))
    });
}

/// Merge rule for a path's previous terminal state against a freshly
/// observed event. `None` means the two events cancel out and the path
/// should be dropped from pending state entirely.
fn merge(current: ChangeKind, incoming: ChangeKind) -> Option<ChangeKind> {
    use ChangeKind::*;
    match (current, incoming) {
        (Create, Delete) => None,
        (Delete, Create) => Some(Modify),
        (Modify, Modify) => Some(Modify),
        (Create, Modify) => Some(Create),
        (Modify, Delete) => Some(Delete),
        (Delete, Delete) => Some(Delete),
        (Delete, Modify) => Some(Modify),
        (Create, Create) => Some(Create),
        (_, rename @ Rename { .. }) => Some(rename),
        (Rename { .. }, Delete) => Some(Delete),
        (Rename { old_path }, _) => Some(Rename { old_path }),
    }
}

impl RawEvent {
    /// Placeholder hook for a future "user-initiated" signal (e.g. a save
    /// triggered from an editor integration vs. a build tool's output
    /// write); currently always `false` since the OS notifier carries no
    /// such distinction. Kept as a named seam so [`Coalescer::observe`]
    /// doesn't need to change shape when one is added.
    fn high_priority_hint(&self) -> bool {
        false
    }
}
