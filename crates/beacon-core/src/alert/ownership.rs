// ── Alert ownership registry ──
//
// Views declare that they present alerts for a stream themselves. While
// such a view is active, the dispatcher stays quiet for that stream.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

use crate::model::AlertStream;

#[derive(Debug)]
pub struct AlertOwnership {
    claims: DashMap<AlertStream, HashSet<String>>,
    active_view: watch::Sender<Option<String>>,
}

impl Default for AlertOwnership {
    fn default() -> Self {
        let (active_view, _) = watch::channel(None);
        Self {
            claims: DashMap::new(),
            active_view,
        }
    }
}

impl AlertOwnership {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `view` as self-handling `stream`. The claim is released
    /// when the returned guard drops.
    pub fn claim(self: &Arc<Self>, view: impl Into<String>, stream: AlertStream) -> OwnershipGuard {
        let view = view.into();
        self.claims.entry(stream).or_default().insert(view.clone());
        debug!(view, %stream, "alert stream claimed");
        OwnershipGuard {
            registry: Arc::clone(self),
            view,
            stream,
        }
    }

    /// Mark which view is currently shown. `None` means no view.
    pub fn set_active_view(&self, view: Option<String>) {
        self.active_view.send_replace(view);
    }

    pub fn active_view(&self) -> Option<String> {
        self.active_view.borrow().clone()
    }

    /// The active view, if it owns `stream`.
    pub fn active_owner(&self, stream: AlertStream) -> Option<String> {
        let active = self.active_view.borrow();
        let view = active.as_ref()?;
        self.claims
            .get(&stream)
            .filter(|owners| owners.contains(view))
            .map(|_| view.clone())
    }

    fn release(&self, view: &str, stream: AlertStream) {
        if let Some(mut owners) = self.claims.get_mut(&stream) {
            owners.remove(view);
        }
        self.claims.remove_if(&stream, |_, owners| owners.is_empty());
        debug!(view, %stream, "alert stream released");
    }
}

/// Keeps a claim alive. Drop to revoke.
#[derive(Debug)]
pub struct OwnershipGuard {
    registry: Arc<AlertOwnership>,
    view: String,
    stream: AlertStream,
}

impl OwnershipGuard {
    pub fn stream(&self) -> AlertStream {
        self.stream
    }
}

impl Drop for OwnershipGuard {
    fn drop(&mut self) {
        self.registry.release(&self.view, self.stream);
    }
}
