// ── Event normalizer & deduplicator ──
//
// Push payloads name the same field several ways across event kinds
// (`id` vs `incidentId`, `location` as a string or an object, counters in
// camelCase or snake_case). Everything is canonicalized here before the
// reconciliation task sees it.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::model::{
    AckStats, AckUpdate, AlertNotice, AlertStream, EventKind, IncidentChange, IncidentPatch,
    IncidentRecord, IncidentStatus, NotificationEvent, Priority,
};

const ID_KEYS: &[&str] = &["id", "incidentId", "incident_id", "_id"];
const ACK_COUNT_KEYS: &[&str] = &["acknowledgedCount", "acknowledged_count"];
const NOTIFIED_KEYS: &[&str] = &[
    "totalPersonnelNotified",
    "totalNotified",
    "total_personnel_notified",
    "total_notified",
];

// ── Field lookup helpers ─────────────────────────────────────────────

fn first<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match first(obj, keys)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn count_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<u32> {
    let value = first(obj, keys)?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
}

fn time_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    let raw = first(obj, keys)?.as_str()?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            debug!(value = raw, error = %e, "ignoring unparseable timestamp");
            None
        }
    }
}

/// Parse a wire enum spelling; accepts `in-progress`, `In Progress`, etc.
fn enum_field<T: FromStr>(obj: &Map<String, Value>, keys: &[&str]) -> Option<T> {
    let raw = first(obj, keys)?.as_str()?;
    let canonical: String = raw
        .trim()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect();
    T::from_str(&canonical).ok()
}

/// `location` is a plain string, an object carrying `address`, or absent
/// with a top-level `address`.
fn location_field(obj: &Map<String, Value>) -> Option<String> {
    match obj.get("location") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Object(loc)) => string_field(loc, &["address", "name"]),
        _ => string_field(obj, &["address"]),
    }
}

fn ack_field(obj: &Map<String, Value>) -> Option<AckStats> {
    let source = match obj.get("acknowledgment").or_else(|| obj.get("acknowledgement")) {
        Some(Value::Object(nested)) => nested,
        _ => obj,
    };
    let acknowledged = count_field(source, ACK_COUNT_KEYS);
    let notified = count_field(source, NOTIFIED_KEYS);
    if acknowledged.is_none() && notified.is_none() {
        return None;
    }
    Some(AckStats::new(
        acknowledged.unwrap_or(0),
        notified.unwrap_or(0),
    ))
}

/// The incident body: a nested `incident` object when present, else the
/// payload itself.
fn incident_body(payload: &Value) -> Option<&Map<String, Value>> {
    let root = payload.as_object()?;
    match root.get("incident") {
        Some(Value::Object(nested)) => Some(nested),
        _ => Some(root),
    }
}

fn incident_id(payload: &Value) -> Option<String> {
    let root = payload.as_object()?;
    incident_body(payload)
        .and_then(|body| string_field(body, ID_KEYS))
        .or_else(|| string_field(root, ID_KEYS))
}

fn patch_from(body: &Map<String, Value>) -> IncidentPatch {
    IncidentPatch {
        title: string_field(body, &["title", "name"]),
        status: enum_field(body, &["status"]),
        priority: enum_field(body, &["priority", "severity"]),
        incident_type: string_field(body, &["type", "incidentType", "incident_type"]),
        location: location_field(body),
        description: string_field(body, &["description"]),
        acknowledgment: ack_field(body),
        created_at: time_field(body, &["createdAt", "created_at"]),
        updated_at: time_field(body, &["updatedAt", "updated_at"]),
    }
}

// ── Public entry points ──────────────────────────────────────────────

/// Map a raw incident object (push payload or snapshot row) into a full
/// record. Missing status defaults to `REPORTED`, missing priority to
/// `MEDIUM`; a missing identifier rejects the row.
pub fn record_from_json(value: &Value) -> Option<IncidentRecord> {
    let id = incident_id(value)?;
    let body = incident_body(value)?;
    let mut patch = patch_from(body);
    patch.status.get_or_insert(IncidentStatus::Reported);
    patch.priority.get_or_insert(Priority::Medium);
    patch.to_record(&id)
}

/// Canonicalize one push event.
///
/// Returns `None` for unknown kinds and for incident events without a
/// usable identifier; both are logged at debug.
pub fn normalize(kind: &str, payload: &Value) -> Option<NotificationEvent> {
    let Ok(kind) = EventKind::from_str(kind) else {
        debug!(kind, "ignoring unknown push event kind");
        return None;
    };

    let event = match kind {
        EventKind::IncidentCreated => NotificationEvent::Created(record_from_json(payload)?),
        EventKind::IncidentUpdated => NotificationEvent::Updated(change_from(payload)?),
        EventKind::IncidentStatusChanged => {
            NotificationEvent::StatusChanged(change_from(payload)?)
        }
        EventKind::IncidentResolved => {
            let mut change = change_from(payload)?;
            change.patch.status.get_or_insert(IncidentStatus::Resolved);
            NotificationEvent::Resolved(change)
        }
        EventKind::IncidentDeleted => NotificationEvent::Deleted {
            id: incident_id(payload)?,
        },
        EventKind::IncidentInvalidated => NotificationEvent::Invalidated {
            id: incident_id(payload)?,
        },
        EventKind::IncidentAcknowledged => NotificationEvent::Acknowledged(ack_from(payload)?),
        EventKind::AlertCritical => NotificationEvent::AlertCritical(notice_from(kind, payload)),
        EventKind::AlertReceived => NotificationEvent::AlertReceived(notice_from(kind, payload)),
        EventKind::AlertBroadcast | EventKind::BroadcastReceived | EventKind::NotificationNew => {
            NotificationEvent::Broadcast(notice_from(kind, payload))
        }
        EventKind::AlertResponse | EventKind::PersonnelLocationUpdated => {
            NotificationEvent::Passthrough {
                event: kind,
                payload: payload.clone(),
            }
        }
    };
    Some(event)
}

fn change_from(payload: &Value) -> Option<IncidentChange> {
    let Some(id) = incident_id(payload) else {
        debug!("dropping incident change without identifier");
        return None;
    };
    Some(IncidentChange {
        id,
        patch: patch_from(incident_body(payload)?),
    })
}

fn ack_from(payload: &Value) -> Option<AckUpdate> {
    let obj = payload.as_object()?;
    let incident_id = incident_id(payload)?;
    let update = AckUpdate {
        incident_id,
        acknowledged_count: count_field(obj, ACK_COUNT_KEYS).unwrap_or(0),
        total_notified: count_field(obj, NOTIFIED_KEYS).unwrap_or(0),
    };

    if let Some(reported) = obj.get("acknowledgmentPercentage").and_then(Value::as_f64) {
        let derived = update.stats().percentage();
        if (reported - derived).abs() > 0.5 {
            debug!(
                incident = %update.incident_id,
                reported,
                derived,
                "server acknowledgment percentage disagrees, using derived value"
            );
        }
    }
    Some(update)
}

fn notice_from(kind: EventKind, payload: &Value) -> AlertNotice {
    let empty = Map::new();
    let obj = payload.as_object().unwrap_or(&empty);

    let (stream, default_priority, default_title) = match kind {
        EventKind::AlertCritical => (AlertStream::Alerts, Priority::Critical, "Critical alert"),
        EventKind::AlertReceived => (AlertStream::Alerts, Priority::High, "Alert received"),
        EventKind::NotificationNew => (AlertStream::Broadcasts, Priority::Low, "Notification"),
        _ => (AlertStream::Broadcasts, Priority::Medium, "Broadcast"),
    };

    let priority = if kind == EventKind::AlertCritical {
        Priority::Critical
    } else {
        enum_field(obj, &["priority", "severity"]).unwrap_or(default_priority)
    };

    AlertNotice {
        stream,
        priority,
        title: string_field(obj, &["title", "subject"]).unwrap_or_else(|| default_title.into()),
        message: string_field(obj, &["message", "body", "description"]).unwrap_or_default(),
        incident_id: string_field(obj, &["incidentId", "incident_id"]),
    }
}

// ── Deduplicator ─────────────────────────────────────────────────────

/// Drops events that would not change the held record.
///
/// Comparison is per field: an update whose status differs but whose other
/// fields match is reduced to a patch carrying only the status.
#[derive(Debug, Default)]
pub struct Deduplicator {
    dropped: u64,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Reduce `event` against the record currently held for its id.
    pub fn reduce(
        &mut self,
        event: NotificationEvent,
        current: Option<&IncidentRecord>,
    ) -> Option<NotificationEvent> {
        let reduced = match (event, current) {
            (NotificationEvent::Created(record), Some(held)) if *held == record => None,
            (NotificationEvent::Updated(change), Some(held)) => {
                Self::reduce_change(change, held).map(NotificationEvent::Updated)
            }
            (NotificationEvent::StatusChanged(change), Some(held)) => {
                Self::reduce_change(change, held).map(NotificationEvent::StatusChanged)
            }
            (NotificationEvent::Resolved(change), Some(held)) => {
                Self::reduce_change(change, held).map(NotificationEvent::Resolved)
            }
            (NotificationEvent::Acknowledged(update), Some(held))
                if held.acknowledgment == update.stats() =>
            {
                None
            }
            (event, _) => Some(event),
        };

        if reduced.is_none() {
            self.dropped += 1;
        }
        reduced
    }

    fn reduce_change(change: IncidentChange, held: &IncidentRecord) -> Option<IncidentChange> {
        let patch = change.patch.diff(held);
        if patch.is_empty() {
            debug!(incident = %change.id, "dropping no-op update");
            return None;
        }
        Some(IncidentChange {
            id: change.id,
            patch,
        })
    }
}
