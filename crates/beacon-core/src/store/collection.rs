// ── Ordered incident collection ──
//
// Keyed by incident id, newest insertion first. Every published mutation
// rebuilds the view snapshot and bumps its version in one `send_modify`,
// so `total` can never disagree with the list.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use super::{ApplyOutcome, IncidentView, MergeReport, StoreChange};
use crate::filter::IncidentFilter;
use crate::model::{AckStats, IncidentChange, IncidentRecord, NotificationEvent};

const CHANGE_CHANNEL_CAPACITY: usize = 512;

/// Canonical incident collection.
///
/// Mutation requires `&mut self`; the engine keeps the only instance on
/// its reconciliation task, so applies and merges never interleave.
pub struct IncidentStore {
    records: IndexMap<String, Arc<IncidentRecord>>,
    version: u64,
    view: watch::Sender<IncidentView>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for IncidentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IncidentStore {
    pub fn new() -> Self {
        let (view, _) = watch::channel(IncidentView::default());
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            records: IndexMap::new(),
            version: 0,
            view,
            changes,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<&Arc<IncidentRecord>> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Current published snapshot (cheap `Arc` clones).
    pub fn view(&self) -> IncidentView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<IncidentView> {
        self.view.subscribe()
    }

    pub fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    // ── Event application ────────────────────────────────────────────

    /// Apply one normalized event under `filter`.
    pub fn apply(&mut self, event: &NotificationEvent, filter: &IncidentFilter) -> ApplyOutcome {
        let outcome = match event {
            NotificationEvent::Created(record) => {
                if self.records.contains_key(&record.id) || !filter.matches(record) {
                    ApplyOutcome::Ignored
                } else {
                    self.insert_head(Arc::new(record.clone()));
                    ApplyOutcome::Inserted
                }
            }
            NotificationEvent::Updated(change) | NotificationEvent::StatusChanged(change) => {
                self.apply_change(change, filter)
            }
            NotificationEvent::Resolved(change) => {
                if filter.excludes_closed() {
                    self.remove(&change.id)
                } else {
                    self.apply_change(change, filter)
                }
            }
            NotificationEvent::Deleted { id } | NotificationEvent::Invalidated { id } => {
                self.remove(id)
            }
            NotificationEvent::Acknowledged(update) => {
                if !self.records.contains_key(&update.incident_id) {
                    ApplyOutcome::Ignored
                } else if self.patch_acknowledgment(&update.incident_id, update.stats()) {
                    ApplyOutcome::Updated
                } else {
                    ApplyOutcome::Unchanged
                }
            }
            NotificationEvent::Broadcast(_)
            | NotificationEvent::AlertReceived(_)
            | NotificationEvent::AlertCritical(_)
            | NotificationEvent::Passthrough { .. } => ApplyOutcome::Ignored,
        };

        if outcome != ApplyOutcome::Ignored {
            debug!(event = event.label(), ?outcome, total = self.records.len(), "applied event");
        }
        outcome
    }

    fn apply_change(&mut self, change: &IncidentChange, filter: &IncidentFilter) -> ApplyOutcome {
        let Some(held) = self.records.get(&change.id) else {
            // Late-arriving creation.
            return match change.patch.to_record(&change.id) {
                Some(record) if filter.matches(&record) => {
                    self.insert_head(Arc::new(record));
                    ApplyOutcome::Inserted
                }
                Some(_) => ApplyOutcome::Ignored,
                None => {
                    debug!(incident = %change.id, "update for unknown incident lacks status or priority");
                    ApplyOutcome::Ignored
                }
            };
        };

        let mut next = IncidentRecord::clone(held);
        change.patch.apply_to(&mut next);
        let unchanged = **held == next;

        if !filter.matches(&next) {
            return self.remove(&change.id);
        }
        if unchanged {
            return ApplyOutcome::Unchanged;
        }
        self.replace(Arc::new(next));
        ApplyOutcome::Updated
    }

    /// Patch counters in place. Never inserts, removes, or reorders.
    /// Returns `true` if the held value changed.
    pub fn patch_acknowledgment(&mut self, id: &str, stats: AckStats) -> bool {
        let Some(slot) = self.records.get_mut(id) else {
            return false;
        };
        if slot.acknowledgment == stats {
            return false;
        }
        let mut next = IncidentRecord::clone(slot);
        next.acknowledgment = stats;
        let record = Arc::new(next);
        *slot = Arc::clone(&record);

        self.publish();
        let _ = self.changes.send(StoreChange::Updated { record });
        true
    }

    // ── Snapshots ────────────────────────────────────────────────────

    /// Adopt a full snapshot by diffing against the held collection.
    ///
    /// Unchanged records keep their existing `Arc`, and nothing is
    /// published when neither membership, values, nor order changed, so
    /// merging the same snapshot twice is a no-op. A held record whose
    /// `updated_at` is strictly newer than the snapshot copy is kept.
    pub fn merge_snapshot(
        &mut self,
        records: Vec<IncidentRecord>,
        filter: &IncidentFilter,
    ) -> MergeReport {
        let mut report = MergeReport::default();
        let mut next: IndexMap<String, Arc<IncidentRecord>> = IndexMap::with_capacity(records.len());
        let mut changed = Vec::new();

        for record in records {
            if next.contains_key(&record.id) || !filter.matches(&record) {
                continue;
            }
            match self.records.get(&record.id) {
                Some(held) if **held == record => {
                    report.unchanged += 1;
                    next.insert(record.id, Arc::clone(held));
                }
                Some(held) if held.is_newer_than(&record) => {
                    report.stale_rejected += 1;
                    if filter.matches(held) {
                        next.insert(record.id, Arc::clone(held));
                    }
                }
                Some(_) => {
                    report.updated += 1;
                    let record = Arc::new(record);
                    changed.push(StoreChange::Updated {
                        record: Arc::clone(&record),
                    });
                    next.insert(record.id.clone(), record);
                }
                None => {
                    report.inserted += 1;
                    let record = Arc::new(record);
                    changed.push(StoreChange::Inserted {
                        record: Arc::clone(&record),
                        index: next.len(),
                    });
                    next.insert(record.id.clone(), record);
                }
            }
        }

        for id in self.records.keys() {
            if !next.contains_key(id) {
                report.removed += 1;
                changed.push(StoreChange::Removed { id: id.clone() });
            }
        }

        let held_order = self.records.keys().filter(|id| next.contains_key(*id));
        report.reordered = !held_order.eq(next.keys().filter(|id| self.records.contains_key(*id)));

        if report.is_noop() {
            return report;
        }

        self.records = next;
        self.publish();
        for change in changed {
            let _ = self.changes.send(change);
        }
        debug!(?report, total = self.records.len(), "merged snapshot");
        report
    }

    /// Replace the whole collection with fresh values, discarding held
    /// state. Used when a resync succeeds after drift.
    pub fn rebuild(&mut self, records: Vec<IncidentRecord>, filter: &IncidentFilter) -> usize {
        let mut next = IndexMap::with_capacity(records.len());
        for record in records {
            if filter.matches(&record) && !next.contains_key(&record.id) {
                next.insert(record.id.clone(), Arc::new(record));
            }
        }
        self.records = next;
        self.publish();

        let total = self.records.len();
        let _ = self.changes.send(StoreChange::Rebuilt { total });
        debug!(total, "rebuilt collection");
        total
    }

    /// Drop every record the filter no longer admits. Publishes once and
    /// emits one `Removed` per dropped id. Returns how many were dropped.
    pub fn retain_matching(&mut self, filter: &IncidentFilter) -> usize {
        let dropped: Vec<String> = self
            .records
            .values()
            .filter(|record| !filter.matches(record))
            .map(|record| record.id.clone())
            .collect();
        if dropped.is_empty() {
            return 0;
        }

        self.records.retain(|_, record| filter.matches(record));
        self.publish();
        for id in &dropped {
            let _ = self.changes.send(StoreChange::Removed { id: id.clone() });
        }
        debug!(dropped = dropped.len(), "filter narrowed the collection");
        dropped.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn insert_head(&mut self, record: Arc<IncidentRecord>) {
        self.records
            .shift_insert(0, record.id.clone(), Arc::clone(&record));
        self.publish();
        let _ = self.changes.send(StoreChange::Inserted { record, index: 0 });
    }

    fn replace(&mut self, record: Arc<IncidentRecord>) {
        if let Some(slot) = self.records.get_mut(&record.id) {
            *slot = Arc::clone(&record);
            self.publish();
            let _ = self.changes.send(StoreChange::Updated { record });
        }
    }

    fn remove(&mut self, id: &str) -> ApplyOutcome {
        if self.records.shift_remove(id).is_none() {
            return ApplyOutcome::Ignored;
        }
        self.publish();
        let _ = self.changes.send(StoreChange::Removed { id: id.to_owned() });
        ApplyOutcome::Removed
    }

    fn publish(&mut self) {
        self.version += 1;
        let items: Vec<Arc<IncidentRecord>> = self.records.values().cloned().collect();
        let version = self.version;
        // `send_modify` updates unconditionally, even with zero receivers.
        self.view.send_modify(|view| {
            view.total = items.len();
            view.items = Arc::new(items);
            view.version = version;
        });
    }
}
