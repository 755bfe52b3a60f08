// ── Alert tiers ──

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::model::Priority;

/// Notification behaviour for one priority tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertProfile {
    pub play_sound: bool,
    pub toast_duration_ms: u64,
    pub loop_sound: bool,
    /// Hard stop for looping playback, regardless of acknowledgment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_loop_duration_ms: Option<u64>,
}

impl AlertProfile {
    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_duration_ms)
    }

    pub fn max_loop_duration(&self) -> Option<Duration> {
        self.max_loop_duration_ms.map(Duration::from_millis)
    }
}

/// Alert tiers keyed by priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub critical: AlertProfile,
    pub high: AlertProfile,
    pub medium: AlertProfile,
    pub low: AlertProfile,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            critical: AlertProfile {
                play_sound: true,
                toast_duration_ms: 10_000,
                loop_sound: true,
                max_loop_duration_ms: Some(60_000),
            },
            high: AlertProfile {
                play_sound: true,
                toast_duration_ms: 8_000,
                loop_sound: false,
                max_loop_duration_ms: None,
            },
            medium: AlertProfile {
                play_sound: true,
                toast_duration_ms: 6_000,
                loop_sound: false,
                max_loop_duration_ms: None,
            },
            low: AlertProfile {
                play_sound: false,
                toast_duration_ms: 4_000,
                loop_sound: false,
                max_loop_duration_ms: None,
            },
        }
    }
}

impl AlertConfig {
    pub fn profile(&self, priority: Priority) -> &AlertProfile {
        match priority {
            Priority::Critical => &self.critical,
            Priority::High => &self.high,
            Priority::Medium => &self.medium,
            Priority::Low => &self.low,
        }
    }
}

/// Visual severity of a toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ToastChannel {
    Error,
    Warning,
    Info,
    Success,
}

impl ToastChannel {
    pub fn for_priority(priority: Priority) -> Self {
        match priority {
            Priority::Critical => Self::Error,
            Priority::High => Self::Warning,
            Priority::Medium => Self::Info,
            Priority::Low => Self::Success,
        }
    }
}
