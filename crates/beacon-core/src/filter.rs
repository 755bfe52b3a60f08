// ── Active-view filter predicate ──
//
// A pure predicate over incident records. The engine passes the current
// filter into every apply and merge, so nothing captures a stale copy.

use std::collections::BTreeSet;

use beacon_api::IncidentQuery;
use serde::{Deserialize, Serialize};

use crate::model::{IncidentRecord, IncidentStatus, Priority};

/// Membership rule for the active incident view.
///
/// Empty inclusion sets match everything. Resolved and closed incidents
/// are excluded unless `include_closed` is set, even when the status set
/// names them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidentFilter {
    pub statuses: BTreeSet<IncidentStatus>,
    pub priorities: BTreeSet<Priority>,
    pub types: BTreeSet<String>,
    pub include_closed: bool,
}

impl IncidentFilter {
    /// Filter that admits every incident, including closed ones.
    pub fn all() -> Self {
        Self {
            include_closed: true,
            ..Self::default()
        }
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = IncidentStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_priorities(mut self, priorities: impl IntoIterator<Item = Priority>) -> Self {
        self.priorities = priorities.into_iter().collect();
        self
    }

    pub fn with_types<S: Into<String>>(mut self, types: impl IntoIterator<Item = S>) -> Self {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn include_closed(mut self, include: bool) -> Self {
        self.include_closed = include;
        self
    }

    pub fn matches(&self, record: &IncidentRecord) -> bool {
        if record.status.is_terminal() && !self.include_closed {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&record.status) {
            return false;
        }
        if !self.priorities.is_empty() && !self.priorities.contains(&record.priority) {
            return false;
        }
        self.types.is_empty()
            || self
                .types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&record.incident_type))
    }

    /// Whether `incident:resolved` removes records unconditionally.
    pub fn excludes_closed(&self) -> bool {
        !self.include_closed
    }

    /// Translate into pull-query parameters for the server.
    pub fn to_query(&self) -> IncidentQuery {
        IncidentQuery {
            statuses: self.statuses.iter().map(ToString::to_string).collect(),
            priorities: self.priorities.iter().map(ToString::to_string).collect(),
            types: self.types.iter().cloned().collect(),
            include_closed: self.include_closed,
            ..IncidentQuery::default()
        }
    }
}
