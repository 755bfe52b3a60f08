// ── Notification center ──
//
// Session-scoped history of toasts and transient notices. Owned by the
// engine and handed to the dispatcher; there is no global instance.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::alert::{Toast, ToastChannel};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: Uuid,
    pub channel: ToastChannel,
    pub title: String,
    pub message: String,
    pub at: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub user: String,
    pub started_at: DateTime<Utc>,
}

/// Published state of the center, newest notice first.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationLog {
    pub session: Option<SessionInfo>,
    pub entries: VecDeque<Notice>,
    pub unread: usize,
}

#[derive(Clone)]
pub struct NotificationCenter {
    log: Arc<watch::Sender<NotificationLog>>,
    capacity: usize,
}

impl NotificationCenter {
    pub fn new(capacity: usize) -> Self {
        let (log, _) = watch::channel(NotificationLog::default());
        Self {
            log: Arc::new(log),
            capacity: capacity.max(1),
        }
    }

    /// Begin a user session with an empty history.
    pub fn start_session(&self, user: impl Into<String>) {
        let session = SessionInfo {
            user: user.into(),
            started_at: Utc::now(),
        };
        self.log.send_modify(|log| {
            log.entries.clear();
            log.unread = 0;
            log.session = Some(session);
        });
    }

    /// Tear down the session and discard its history.
    pub fn end_session(&self) {
        self.log.send_modify(|log| *log = NotificationLog::default());
    }

    pub fn session(&self) -> Option<SessionInfo> {
        self.log.borrow().session.clone()
    }

    pub fn record_toast(&self, toast: &Toast) {
        self.push(Notice {
            id: toast.id,
            channel: toast.channel,
            title: toast.title.clone(),
            message: toast.message.clone(),
            at: toast.created_at,
            read: false,
        });
    }

    /// Transient error notice, e.g. a failed manual refresh.
    pub fn record_error(&self, title: impl Into<String>, message: impl Into<String>) {
        self.push(Notice {
            id: Uuid::new_v4(),
            channel: ToastChannel::Error,
            title: title.into(),
            message: message.into(),
            at: Utc::now(),
            read: false,
        });
    }

    pub fn mark_all_read(&self) {
        self.log.send_modify(|log| {
            for notice in &mut log.entries {
                notice.read = true;
            }
            log.unread = 0;
        });
    }

    pub fn unread(&self) -> usize {
        self.log.borrow().unread
    }

    pub fn snapshot(&self) -> NotificationLog {
        self.log.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NotificationLog> {
        self.log.subscribe()
    }

    fn push(&self, notice: Notice) {
        let capacity = self.capacity;
        self.log.send_modify(|log| {
            log.entries.push_front(notice);
            while log.entries.len() > capacity {
                log.entries.pop_back();
            }
            log.unread = log.entries.iter().filter(|n| !n.read).count();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_bounded_newest_first() {
        let center = NotificationCenter::new(2);
        center.start_session("dispatcher-7");
        for title in ["a", "b", "c"] {
            center.record_error(title, "");
        }

        let log = center.snapshot();
        let titles: Vec<_> = log.entries.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "b"]);
        assert_eq!(log.unread, 2);
    }

    #[test]
    fn session_lifecycle_resets_history() {
        let center = NotificationCenter::new(10);
        center.start_session("dispatcher-7");
        center.record_error("refresh failed", "timeout");
        center.mark_all_read();
        assert_eq!(center.unread(), 0);
        assert_eq!(center.snapshot().entries.len(), 1);

        center.end_session();
        assert!(center.session().is_none());
        assert!(center.snapshot().entries.is_empty());
    }
}
