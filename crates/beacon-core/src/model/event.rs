// ── Canonical notification events ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::incident::{AckStats, IncidentPatch, IncidentRecord, Priority};

/// Every inbound push event kind the engine understands.
///
/// `incident:status` is accepted as an alias of `incident:status-changed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum EventKind {
    #[strum(serialize = "incident:created")]
    IncidentCreated,
    #[strum(serialize = "incident:updated")]
    IncidentUpdated,
    #[strum(to_string = "incident:status-changed", serialize = "incident:status")]
    IncidentStatusChanged,
    #[strum(serialize = "incident:resolved")]
    IncidentResolved,
    #[strum(serialize = "incident:deleted")]
    IncidentDeleted,
    #[strum(serialize = "incident:invalidated")]
    IncidentInvalidated,
    #[strum(serialize = "incident:acknowledged")]
    IncidentAcknowledged,
    #[strum(serialize = "alert:broadcast")]
    AlertBroadcast,
    #[strum(serialize = "alert:response")]
    AlertResponse,
    #[strum(serialize = "alert:received")]
    AlertReceived,
    #[strum(serialize = "alert:critical")]
    AlertCritical,
    #[strum(serialize = "notification:broadcast:received")]
    BroadcastReceived,
    #[strum(serialize = "notification:new")]
    NotificationNew,
    #[strum(serialize = "personnel:location:updated")]
    PersonnelLocationUpdated,
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Independent alert streams a view can claim ownership of.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertStream {
    Incidents,
    Alerts,
    Broadcasts,
}

/// Field-level change to an existing incident.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentChange {
    pub id: String,
    pub patch: IncidentPatch,
}

/// Acknowledgment counter update for one incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckUpdate {
    pub incident_id: String,
    pub acknowledged_count: u32,
    pub total_notified: u32,
}

impl AckUpdate {
    pub fn stats(&self) -> AckStats {
        AckStats::new(self.acknowledged_count, self.total_notified)
    }
}

/// Non-incident alert or broadcast notice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotice {
    pub stream: AlertStream,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    /// Incident the notice refers to, used for the toast's "View" action.
    pub incident_id: Option<String>,
}

/// A normalized push event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum NotificationEvent {
    Created(IncidentRecord),
    Updated(IncidentChange),
    StatusChanged(IncidentChange),
    Resolved(IncidentChange),
    Deleted { id: String },
    Invalidated { id: String },
    Acknowledged(AckUpdate),
    Broadcast(AlertNotice),
    AlertReceived(AlertNotice),
    AlertCritical(AlertNotice),
    /// Forwarded to subscribers without touching the collection.
    Passthrough {
        event: EventKind,
        payload: serde_json::Value,
    },
}

impl NotificationEvent {
    /// Incident this event targets, if any.
    pub fn incident_id(&self) -> Option<&str> {
        match self {
            Self::Created(record) => Some(&record.id),
            Self::Updated(change) | Self::StatusChanged(change) | Self::Resolved(change) => {
                Some(&change.id)
            }
            Self::Deleted { id } | Self::Invalidated { id } => Some(id),
            Self::Acknowledged(update) => Some(&update.incident_id),
            Self::Broadcast(notice) | Self::AlertReceived(notice) | Self::AlertCritical(notice) => {
                notice.incident_id.as_deref()
            }
            Self::Passthrough { .. } => None,
        }
    }

    /// The alert notice carried by non-incident alert events.
    pub fn alert_notice(&self) -> Option<&AlertNotice> {
        match self {
            Self::Broadcast(notice) | Self::AlertReceived(notice) | Self::AlertCritical(notice) => {
                Some(notice)
            }
            _ => None,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Updated(_) => "updated",
            Self::StatusChanged(_) => "status-changed",
            Self::Resolved(_) => "resolved",
            Self::Deleted { .. } => "deleted",
            Self::Invalidated { .. } => "invalidated",
            Self::Acknowledged(_) => "acknowledged",
            Self::Broadcast(_) => "broadcast",
            Self::AlertReceived(_) => "alert-received",
            Self::AlertCritical(_) => "alert-critical",
            Self::Passthrough { .. } => "passthrough",
        }
    }
}
