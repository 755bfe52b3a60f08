// ── Reconciliation store ──
//
// The canonical, ordered incident collection. Only the engine's
// reconciliation task holds the `IncidentStore`; everyone else reads the
// published `IncidentView` or follows the `StoreChange` feed.

mod collection;

use std::sync::Arc;

pub use collection::IncidentStore;

use crate::model::IncidentRecord;

/// Snapshot of the active incident list, newest first.
///
/// `total` always equals `items.len()`; both are published together.
#[derive(Debug, Clone, Default)]
pub struct IncidentView {
    pub items: Arc<Vec<Arc<IncidentRecord>>>,
    pub total: usize,
    /// Bumped on every published mutation.
    pub version: u64,
}

impl IncidentView {
    pub fn get(&self, id: &str) -> Option<&Arc<IncidentRecord>> {
        self.items.iter().find(|r| r.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|r| r.id == id)
    }
}

/// Per-record change notification.
#[derive(Debug, Clone)]
pub enum StoreChange {
    Inserted {
        record: Arc<IncidentRecord>,
        index: usize,
    },
    Updated {
        record: Arc<IncidentRecord>,
    },
    Removed {
        id: String,
    },
    /// The whole collection was replaced.
    Rebuilt {
        total: usize,
    },
}

/// What a single `apply` did to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Inserted,
    Updated,
    Removed,
    /// The record is held and already carries these values.
    Unchanged,
    /// The event has no effect on the active view.
    Ignored,
}

impl ApplyOutcome {
    pub fn is_mutation(self) -> bool {
        matches!(self, Self::Inserted | Self::Updated | Self::Removed)
    }
}

/// Counters from one `merge_snapshot`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Held records kept because the snapshot copy was older.
    pub stale_rejected: usize,
    pub reordered: bool,
}

impl MergeReport {
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.removed == 0 && !self.reordered
    }
}
