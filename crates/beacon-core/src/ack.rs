// ── Acknowledgment aggregator ──

use tracing::debug;

use crate::model::AckUpdate;
use crate::store::IncidentStore;

/// Routes acknowledgment traffic into the store's in-place patch path.
///
/// Counters for incidents outside the active view are dropped; they can
/// never insert, remove, or reorder a record.
#[derive(Debug, Default)]
pub struct AckAggregator {
    applied: u64,
    ignored: u64,
}

impl AckAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a held record changed.
    pub fn apply(&mut self, store: &mut IncidentStore, update: &AckUpdate) -> bool {
        let stats = update.stats();
        if store.patch_acknowledgment(&update.incident_id, stats) {
            self.applied += 1;
            debug!(
                incident = %update.incident_id,
                acknowledged = stats.acknowledged_count(),
                notified = stats.total_notified(),
                percentage = stats.percentage(),
                "acknowledgment patched"
            );
            true
        } else {
            self.ignored += 1;
            false
        }
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn ignored(&self) -> u64 {
        self.ignored
    }
}
