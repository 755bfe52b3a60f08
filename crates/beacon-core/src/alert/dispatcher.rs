// ── Alert priority dispatcher ──

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::debug;
use uuid::Uuid;

use super::config::{AlertConfig, ToastChannel};
use super::ownership::AlertOwnership;
use super::sound::{SoundController, SoundCue};
use crate::model::{AlertNotice, AlertStream, IncidentRecord, Priority};
use crate::notifications::NotificationCenter;

const TOAST_CHANNEL_CAPACITY: usize = 64;

/// Something worth telling the operator about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub stream: AlertStream,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub incident_id: Option<String>,
}

impl Alert {
    pub fn for_new_incident(record: &IncidentRecord) -> Self {
        let mut message = record.label().to_owned();
        if let Some(ref location) = record.location {
            message.push_str(" at ");
            message.push_str(location);
        }
        Self {
            stream: AlertStream::Incidents,
            priority: record.priority,
            title: format!("New {} incident", record.priority),
            message,
            incident_id: Some(record.id.clone()),
        }
    }

    pub fn from_notice(notice: &AlertNotice) -> Self {
        Self {
            stream: notice.stream,
            priority: notice.priority,
            title: notice.title.clone(),
            message: notice.message.clone(),
            incident_id: notice.incident_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToastAction {
    pub label: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Toast {
    pub id: Uuid,
    pub channel: ToastChannel,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub duration: Duration,
    pub action: Option<ToastAction>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The active view owns the stream and presents the alert itself.
    Suppressed { view: String },
    Delivered { toast_id: Uuid, sound: bool },
}

pub struct AlertDispatcher {
    config: AlertConfig,
    sound: SoundController,
    ownership: Arc<AlertOwnership>,
    notifications: NotificationCenter,
    toasts: broadcast::Sender<Toast>,
    sound_enabled: watch::Sender<bool>,
}

impl AlertDispatcher {
    pub fn new(
        config: AlertConfig,
        sound: SoundController,
        ownership: Arc<AlertOwnership>,
        notifications: NotificationCenter,
        sound_enabled: bool,
    ) -> Self {
        let (toasts, _) = broadcast::channel(TOAST_CHANNEL_CAPACITY);
        let (sound_enabled, _) = watch::channel(sound_enabled);
        Self {
            config,
            sound,
            ownership,
            notifications,
            toasts,
            sound_enabled,
        }
    }

    /// Present `alert` as a toast and, if its tier and the mute preference
    /// allow, a sound. Any playing sound is stopped first.
    pub async fn dispatch(&self, alert: Alert) -> DispatchOutcome {
        if let Some(view) = self.ownership.active_owner(alert.stream) {
            debug!(view, stream = %alert.stream, "alert handled by owning view");
            return DispatchOutcome::Suppressed { view };
        }

        let profile = self.config.profile(alert.priority);
        let toast = Toast {
            id: Uuid::new_v4(),
            channel: ToastChannel::for_priority(alert.priority),
            priority: alert.priority,
            title: alert.title.clone(),
            message: alert.message,
            duration: profile.toast_duration(),
            action: alert.incident_id.map(|id| ToastAction {
                label: "View".into(),
                target: format!("/incidents/{id}"),
            }),
            created_at: Utc::now(),
        };
        self.notifications.record_toast(&toast);
        let toast_id = toast.id;
        let _ = self.toasts.send(toast);

        let sound = profile.play_sound && *self.sound_enabled.borrow();
        if sound {
            let cue = SoundCue {
                priority: alert.priority,
                label: alert.title,
            };
            self.sound.start(cue, profile).await;
        } else {
            // A silent alert still supersedes whatever was playing.
            self.sound.stop().await;
        }

        DispatchOutcome::Delivered { toast_id, sound }
    }

    /// Mute or unmute. Muting stops current playback; toasts are unaffected.
    pub async fn set_sound_enabled(&self, enabled: bool) {
        self.sound_enabled.send_replace(enabled);
        if !enabled {
            self.sound.stop().await;
        }
    }

    pub fn sound_enabled(&self) -> bool {
        *self.sound_enabled.borrow()
    }

    pub async fn stop_sound(&self) {
        self.sound.stop().await;
    }

    pub fn sound(&self) -> &SoundController {
        &self.sound
    }

    pub fn toasts(&self) -> broadcast::Receiver<Toast> {
        self.toasts.subscribe()
    }

    pub fn ownership(&self) -> &Arc<AlertOwnership> {
        &self.ownership
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::alert::sound::{PlaybackOutcome, SilentPlayer, SoundCue, SoundPlayer, SoundState};
    use crate::model::IncidentStatus;

    fn dispatcher(sound_enabled: bool) -> AlertDispatcher {
        AlertDispatcher::new(
            AlertConfig::default(),
            SoundController::new(Arc::new(SilentPlayer)),
            AlertOwnership::new(),
            NotificationCenter::new(16),
            sound_enabled,
        )
    }

    fn critical() -> IncidentRecord {
        let mut record = IncidentRecord::new("I1", IncidentStatus::Reported, Priority::Critical);
        record.incident_type = "FIRE".into();
        record
    }

    #[tokio::test]
    async fn critical_incident_gets_error_toast_with_view_action() {
        let dispatcher = dispatcher(true);
        let mut toasts = dispatcher.toasts();

        let outcome = dispatcher.dispatch(Alert::for_new_incident(&critical())).await;
        assert!(matches!(outcome, DispatchOutcome::Delivered { sound: true, .. }));

        let toast = toasts.try_recv().unwrap();
        assert_eq!(toast.channel, ToastChannel::Error);
        assert_eq!(toast.duration, Duration::from_secs(10));
        assert_eq!(
            toast.action,
            Some(ToastAction {
                label: "View".into(),
                target: "/incidents/I1".into(),
            })
        );
    }

    #[tokio::test]
    async fn mute_keeps_toast_but_skips_sound() {
        let dispatcher = dispatcher(false);
        let mut toasts = dispatcher.toasts();

        let outcome = dispatcher.dispatch(Alert::for_new_incident(&critical())).await;
        assert!(matches!(outcome, DispatchOutcome::Delivered { sound: false, .. }));
        assert!(toasts.try_recv().is_ok());
        assert_eq!(dispatcher.sound().state(), SoundState::Idle);
    }

    /// Two seconds per pass, so a looping cue stays audible.
    struct SlowPlayer;

    #[async_trait::async_trait]
    impl SoundPlayer for SlowPlayer {
        async fn play(&self, _cue: &SoundCue) -> PlaybackOutcome {
            tokio::time::sleep(Duration::from_secs(2)).await;
            PlaybackOutcome::Completed
        }

        fn stop(&self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn silent_low_alert_stops_critical_loop() {
        let dispatcher = AlertDispatcher::new(
            AlertConfig::default(),
            SoundController::new(Arc::new(SlowPlayer)),
            AlertOwnership::new(),
            NotificationCenter::new(16),
            true,
        );

        dispatcher.dispatch(Alert::for_new_incident(&critical())).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(dispatcher.sound().state(), SoundState::Looping);

        let mut low = IncidentRecord::new("I2", IncidentStatus::Reported, Priority::Low);
        low.incident_type = "NOISE".into();
        let outcome = dispatcher.dispatch(Alert::for_new_incident(&low)).await;
        assert!(matches!(outcome, DispatchOutcome::Delivered { sound: false, .. }));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(dispatcher.sound().state(), SoundState::Idle);
    }

    #[tokio::test]
    async fn owning_view_suppresses_dispatch() {
        let dispatcher = dispatcher(true);
        let mut toasts = dispatcher.toasts();
        let _claim = dispatcher
            .ownership()
            .claim("incident-board", AlertStream::Incidents);
        dispatcher
            .ownership()
            .set_active_view(Some("incident-board".into()));

        let outcome = dispatcher.dispatch(Alert::for_new_incident(&critical())).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Suppressed {
                view: "incident-board".into()
            }
        );
        assert!(toasts.try_recv().is_err());

        let notice = AlertNotice {
            stream: AlertStream::Broadcasts,
            priority: Priority::Low,
            title: "Shift change".into(),
            message: String::new(),
            incident_id: None,
        };
        let outcome = dispatcher.dispatch(Alert::from_notice(&notice)).await;
        assert!(matches!(outcome, DispatchOutcome::Delivered { sound: false, .. }));
    }
}
