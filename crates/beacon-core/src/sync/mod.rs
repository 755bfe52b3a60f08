// ── Resync ──
//
// Periodic pull fallback. The scheduler owns `SyncState` and at most one
// in-flight fetch; snapshots go to the reconciliation task as
// `StoreCommand`s so the collection keeps a single writer.

mod backoff;
mod scheduler;
mod source;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

pub use backoff::BackoffPolicy;
pub use scheduler::ResyncHandle;
pub(crate) use scheduler::ResyncScheduler;
pub use source::{HttpIncidentSource, IncidentSource};

use crate::model::IncidentRecord;
use crate::store::MergeReport;

/// Observable resync bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub last_successful_sync: Option<DateTime<Utc>>,
    /// Consecutive failures. Reset only by a successful resync.
    pub retry_count: u32,
    pub connection_healthy: bool,
    pub in_flight: bool,
    /// Delay of the currently armed one-shot retry, if any.
    pub next_retry_in: Option<Duration>,
    pub last_error: Option<String>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            last_successful_sync: None,
            retry_count: 0,
            connection_healthy: true,
            in_flight: false,
            next_retry_in: None,
            last_error: None,
        }
    }
}

/// How a completed resync changed the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Merged(MergeReport),
    Rebuilt { total: usize },
    /// Health probe failed; nothing was fetched.
    Skipped,
}

/// Snapshot delivery to the reconciliation task.
#[derive(Debug)]
pub(crate) enum StoreCommand {
    Sync {
        records: Vec<IncidentRecord>,
        rebuild: bool,
        reply: oneshot::Sender<SyncOutcome>,
    },
}
