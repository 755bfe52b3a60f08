// ── Domain model ──
//
// Canonical representations of incidents and the events that move them.
// Wire payloads are mapped into these types by `crate::normalize`.

pub mod event;
pub mod incident;

pub use event::{AckUpdate, AlertNotice, AlertStream, EventKind, IncidentChange, NotificationEvent};
pub use incident::{AckStats, IncidentPatch, IncidentRecord, IncidentStatus, Priority};
