// ── Incident domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Incident lifecycle. Variants are declared in lifecycle order so `Ord`
/// follows progression.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum IncidentStatus {
    Reported,
    Acknowledged,
    Dispatched,
    InProgress,
    Resolved,
    Closed,
}

impl IncidentStatus {
    /// Resolved and closed incidents are hidden by views that exclude them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }
}

/// Incident priority, ascending.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

/// Personnel acknowledgment counters for one incident.
///
/// The percentage is always derived, never taken from the wire:
/// `acknowledged / max(notified, 1) * 100`, clamped to `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckStats {
    acknowledged_count: u32,
    total_notified: u32,
    percentage: f64,
}

impl AckStats {
    pub fn new(acknowledged_count: u32, total_notified: u32) -> Self {
        let pct = f64::from(acknowledged_count) * 100.0 / f64::from(total_notified.max(1));
        Self {
            acknowledged_count,
            total_notified,
            percentage: pct.clamp(0.0, 100.0),
        }
    }

    pub fn acknowledged_count(&self) -> u32 {
        self.acknowledged_count
    }

    pub fn total_notified(&self) -> u32 {
        self.total_notified
    }

    pub fn percentage(&self) -> f64 {
        self.percentage
    }
}

/// The canonical incident as held by the reconciliation store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
    pub id: String,
    pub title: Option<String>,
    pub status: IncidentStatus,
    pub priority: Priority,
    #[serde(rename = "type")]
    pub incident_type: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub acknowledgment: AckStats,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl IncidentRecord {
    pub fn new(id: impl Into<String>, status: IncidentStatus, priority: Priority) -> Self {
        Self {
            id: id.into(),
            title: None,
            status,
            priority,
            incident_type: String::new(),
            location: None,
            description: None,
            acknowledgment: AckStats::default(),
            created_at: None,
            updated_at: None,
        }
    }

    /// `true` only when both sides carry `updated_at` and ours is strictly
    /// later. Records without timestamps never win this comparison.
    pub fn is_newer_than(&self, other: &IncidentRecord) -> bool {
        match (self.updated_at, other.updated_at) {
            (Some(ours), Some(theirs)) => ours > theirs,
            _ => false,
        }
    }

    /// Short human label: title, else type, else id.
    pub fn label(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| Some(self.incident_type.as_str()).filter(|t| !t.is_empty()))
            .unwrap_or(&self.id)
    }
}

/// Partial update carried by `updated` / `status-changed` / `resolved`
/// events. `None` means "not mentioned", never "clear".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentPatch {
    pub title: Option<String>,
    pub status: Option<IncidentStatus>,
    pub priority: Option<Priority>,
    #[serde(rename = "type")]
    pub incident_type: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub acknowledgment: Option<AckStats>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl IncidentPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overwrite every mentioned field on `record`.
    pub fn apply_to(&self, record: &mut IncidentRecord) {
        if let Some(ref title) = self.title {
            record.title = Some(title.clone());
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(priority) = self.priority {
            record.priority = priority;
        }
        if let Some(ref kind) = self.incident_type {
            record.incident_type.clone_from(kind);
        }
        if let Some(ref location) = self.location {
            record.location = Some(location.clone());
        }
        if let Some(ref description) = self.description {
            record.description = Some(description.clone());
        }
        if let Some(ack) = self.acknowledgment {
            record.acknowledgment = ack;
        }
        if let Some(at) = self.created_at {
            record.created_at = Some(at);
        }
        if let Some(at) = self.updated_at {
            record.updated_at = Some(at);
        }
    }

    /// Keep only the fields whose value differs from `current`.
    pub fn diff(&self, current: &IncidentRecord) -> IncidentPatch {
        fn changed<T: PartialEq + Clone>(proposed: Option<&T>, held: Option<&T>) -> Option<T> {
            proposed.filter(|p| Some(*p) != held).cloned()
        }

        IncidentPatch {
            title: changed(self.title.as_ref(), current.title.as_ref()),
            status: changed(self.status.as_ref(), Some(&current.status)),
            priority: changed(self.priority.as_ref(), Some(&current.priority)),
            incident_type: changed(self.incident_type.as_ref(), Some(&current.incident_type)),
            location: changed(self.location.as_ref(), current.location.as_ref()),
            description: changed(self.description.as_ref(), current.description.as_ref()),
            acknowledgment: changed(self.acknowledgment.as_ref(), Some(&current.acknowledgment)),
            created_at: changed(self.created_at.as_ref(), current.created_at.as_ref()),
            updated_at: changed(self.updated_at.as_ref(), current.updated_at.as_ref()),
        }
    }

    /// Build a full record from a patch, for updates that arrive before
    /// their creation event. Requires at least status and priority.
    pub fn to_record(&self, id: &str) -> Option<IncidentRecord> {
        let mut record = IncidentRecord::new(id, self.status?, self.priority?);
        self.apply_to(&mut record);
        Some(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn percentage_is_derived_and_clamped() {
        assert_eq!(AckStats::new(4, 10).percentage(), 40.0);
        assert_eq!(AckStats::new(3, 0).percentage(), 100.0);
        assert_eq!(AckStats::new(0, 0).percentage(), 0.0);
        assert_eq!(AckStats::new(12, 10).percentage(), 100.0);
    }

    #[test]
    fn status_parses_wire_spelling() {
        assert_eq!(
            IncidentStatus::from_str("IN_PROGRESS").unwrap(),
            IncidentStatus::InProgress
        );
        assert_eq!(IncidentStatus::from_str("resolved").unwrap(), IncidentStatus::Resolved);
        assert_eq!(IncidentStatus::Dispatched.to_string(), "DISPATCHED");
        assert!(IncidentStatus::Closed.is_terminal());
        assert!(!IncidentStatus::Reported.is_terminal());
    }

    #[test]
    fn priority_orders_ascending() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::Low < Priority::Medium);
    }

    #[test]
    fn diff_keeps_only_changed_fields() {
        let mut current = IncidentRecord::new("I1", IncidentStatus::Reported, Priority::High);
        current.location = Some("5th & Main".into());

        let patch = IncidentPatch {
            status: Some(IncidentStatus::Dispatched),
            priority: Some(Priority::High),
            location: Some("5th & Main".into()),
            ..IncidentPatch::default()
        };

        let reduced = patch.diff(&current);
        assert_eq!(reduced.status, Some(IncidentStatus::Dispatched));
        assert_eq!(reduced.priority, None);
        assert_eq!(reduced.location, None);
        assert!(!reduced.is_empty());
    }

    #[test]
    fn patch_without_priority_cannot_become_record() {
        let patch = IncidentPatch {
            status: Some(IncidentStatus::Reported),
            ..IncidentPatch::default()
        };
        assert!(patch.to_record("I9").is_none());
    }

    #[test]
    fn newer_requires_both_timestamps() {
        let mut a = IncidentRecord::new("I1", IncidentStatus::Reported, Priority::Low);
        let mut b = a.clone();
        assert!(!a.is_newer_than(&b));

        a.updated_at = Some("2026-03-01T10:00:05Z".parse().unwrap());
        assert!(!a.is_newer_than(&b));

        b.updated_at = Some("2026-03-01T10:00:00Z".parse().unwrap());
        assert!(a.is_newer_than(&b));
        assert!(!b.is_newer_than(&a));
    }
}
