// ── Engine facade ──
//
// Wires the push channel, reconciliation store, resync scheduler, health
// monitor, and alert dispatcher together. One reconcile task is the only
// writer of the incident collection; push events and resync snapshots
// are both serialized through it.

use std::sync::Arc;

use beacon_api::{
    BroadcastAck, BroadcastRequest, ChannelState, IncidentClient, PushChannel, PushEvent,
};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ack::AckAggregator;
use crate::alert::{
    Alert, AlertDispatcher, AlertOwnership, DispatchOutcome, SoundController, SoundPlayer,
    SoundState, Toast,
};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::filter::IncidentFilter;
use crate::health::{HealthMonitor, LivenessProbe};
use crate::model::NotificationEvent;
use crate::normalize::{Deduplicator, normalize};
use crate::notifications::NotificationCenter;
use crate::store::{ApplyOutcome, IncidentStore, IncidentView, StoreChange};
use crate::sync::{
    HttpIncidentSource, IncidentSource, ResyncHandle, ResyncScheduler, StoreCommand, SyncOutcome,
    SyncState,
};

const STORE_COMMAND_CHANNEL_SIZE: usize = 16;
const EVENT_CHANNEL_SIZE: usize = 256;

/// Counters published by the reconcile task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileStats {
    pub events_applied: u64,
    pub events_deduplicated: u64,
    pub acks_applied: u64,
    pub snapshots_applied: u64,
    pub alerts_delivered: u64,
    pub alerts_suppressed: u64,
}

/// Collaborators handed to [`Engine::spawn`].
pub struct EngineParts {
    /// Raw push events, in arrival order.
    pub events: broadcast::Receiver<Arc<PushEvent>>,
    pub channel_state: watch::Receiver<ChannelState>,
    pub source: Arc<dyn IncidentSource>,
    pub probe: Arc<dyn LivenessProbe>,
    pub player: Arc<dyn SoundPlayer>,
    /// Outbound path for broadcasts. `None` disables [`Engine::broadcast`].
    pub push: Option<PushChannel>,
}

// ── Engine ───────────────────────────────────────────────────────────

/// Live incident view plus alerting.
///
/// Cheaply cloneable via `Arc<EngineInner>`.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    view: watch::Receiver<IncidentView>,
    changes: broadcast::Receiver<StoreChange>,
    events: broadcast::Sender<Arc<NotificationEvent>>,
    stats: watch::Receiver<ReconcileStats>,
    filter: watch::Sender<IncidentFilter>,
    resync: ResyncHandle,
    health: Arc<HealthMonitor>,
    dispatcher: Arc<AlertDispatcher>,
    notifications: NotificationCenter,
    push: Option<PushChannel>,
    loading: watch::Sender<bool>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Connect to the dispatch server described by `config` and start
    /// every background task.
    pub fn connect(config: EngineConfig, player: Arc<dyn SoundPlayer>) -> Result<Self, CoreError> {
        let client = IncidentClient::new(
            config.server_url.clone(),
            config.token.clone(),
            config.timeout,
        )?;
        let source = Arc::new(HttpIncidentSource::new(client, config.page_limit));

        let (events, channel_state, push) = if config.push_enabled {
            let push = PushChannel::connect(
                config.push_url()?,
                config.token.clone(),
                config.reconnect.clone(),
                CancellationToken::new(),
            )?;
            (push.subscribe(), push.state(), Some(push))
        } else {
            info!("push channel disabled, running pull-only");
            let (_, events) = broadcast::channel(1);
            let (_, state) = watch::channel(ChannelState::Disconnected);
            (events, state, None)
        };

        let parts = EngineParts {
            events,
            channel_state,
            source: source.clone(),
            probe: source,
            player,
            push,
        };
        Ok(Self::spawn(config, parts))
    }

    /// Start the engine over explicit collaborators. Must be called inside
    /// a Tokio runtime. An initial forced load begins immediately.
    pub fn spawn(config: EngineConfig, parts: EngineParts) -> Self {
        let cancel = CancellationToken::new();
        let store = IncidentStore::new();
        let view = store.subscribe();
        let changes = store.changes();

        let (filter, filter_rx) = watch::channel(config.initial_filter.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (stats_tx, stats) = watch::channel(ReconcileStats::default());
        let (store_tx, store_rx) = mpsc::channel(STORE_COMMAND_CHANNEL_SIZE);

        let health = Arc::new(HealthMonitor::new(
            parts.channel_state,
            parts.probe,
            config.health_timeout,
        ));
        let notifications = NotificationCenter::new(config.notification_history);
        let dispatcher = Arc::new(AlertDispatcher::new(
            config.alerts.clone(),
            SoundController::new(parts.player),
            AlertOwnership::new(),
            notifications.clone(),
            config.sound_enabled,
        ));

        let (resync, resync_task) = ResyncScheduler::spawn(
            parts.source,
            Arc::clone(&health),
            config.resync.backoff,
            config.resync.interval,
            filter_rx.clone(),
            store_tx,
            cancel.child_token(),
        );

        let reconciler = Reconciler {
            store,
            filter: filter_rx,
            dedup: Deduplicator::new(),
            acks: AckAggregator::new(),
            dispatcher: Arc::clone(&dispatcher),
            events: events.clone(),
            stats: stats_tx,
            resync: resync.clone(),
        };
        let reconcile_task = tokio::spawn(reconciler.run(parts.events, store_rx, cancel.child_token()));

        let (loading, _) = watch::channel(false);
        info!(server = %config.server_url, "incident engine started");

        Self {
            inner: Arc::new(EngineInner {
                config,
                view,
                changes,
                events,
                stats,
                filter,
                resync,
                health,
                dispatcher,
                notifications,
                push: parts.push,
                loading,
                cancel,
                task_handles: Mutex::new(vec![resync_task, reconcile_task]),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ── Incident view ────────────────────────────────────────────────

    /// Current incident list, newest first.
    pub fn incidents(&self) -> IncidentView {
        self.inner.view.borrow().clone()
    }

    pub fn subscribe_incidents(&self) -> watch::Receiver<IncidentView> {
        self.inner.view.clone()
    }

    /// Per-record change feed.
    pub fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.changes.resubscribe()
    }

    /// Normalized push events after deduplication, including passthrough
    /// kinds that never touch the collection.
    pub fn events(&self) -> broadcast::Receiver<Arc<NotificationEvent>> {
        self.inner.events.subscribe()
    }

    pub fn reconcile_stats(&self) -> ReconcileStats {
        *self.inner.stats.borrow()
    }

    // ── Filter & resync ──────────────────────────────────────────────

    pub fn filter(&self) -> IncidentFilter {
        self.inner.filter.borrow().clone()
    }

    /// Replace the active filter. Held records it rejects leave the view
    /// at once; a forced resync then admits newly matching ones.
    pub fn set_filter(&self, filter: IncidentFilter) {
        if self.inner.filter.send_if_modified(|current| {
            if *current == filter {
                return false;
            }
            *current = filter;
            true
        }) {
            debug!("filter changed, forcing resync");
            self.inner.resync.trigger();
        }
    }

    /// User-initiated resync. The loading flag is always cleared; a
    /// failure is recorded once in the notification center.
    pub async fn refresh(&self) -> Result<SyncOutcome, CoreError> {
        self.inner.loading.send_replace(true);
        let result = self.inner.resync.force().await;
        self.inner.loading.send_replace(false);

        if let Err(ref e) = result {
            if !e.is_aborted() {
                warn!(error = %e, "manual refresh failed");
                self.inner
                    .notifications
                    .record_error("Refresh failed", e.to_string());
            }
        }
        result
    }

    /// Forced resync without the loading flag or notice.
    pub async fn force_resync(&self) -> Result<SyncOutcome, CoreError> {
        self.inner.resync.force().await
    }

    pub fn loading(&self) -> watch::Receiver<bool> {
        self.inner.loading.subscribe()
    }

    pub fn sync_state(&self) -> SyncState {
        self.inner.resync.state().borrow().clone()
    }

    pub fn subscribe_sync(&self) -> watch::Receiver<SyncState> {
        self.inner.resync.state()
    }

    // ── Connectivity ─────────────────────────────────────────────────

    pub fn connection_state(&self) -> ChannelState {
        self.inner.health.channel_state()
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.inner.health
    }

    // ── Alerts ───────────────────────────────────────────────────────

    pub fn toasts(&self) -> broadcast::Receiver<Toast> {
        self.inner.dispatcher.toasts()
    }

    pub fn sound_state(&self) -> watch::Receiver<SoundState> {
        self.inner.dispatcher.sound().subscribe()
    }

    pub fn ownership(&self) -> &Arc<AlertOwnership> {
        self.inner.dispatcher.ownership()
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.inner.notifications
    }

    pub async fn set_sound_enabled(&self, enabled: bool) {
        self.inner.dispatcher.set_sound_enabled(enabled).await;
    }

    pub fn sound_enabled(&self) -> bool {
        self.inner.dispatcher.sound_enabled()
    }

    pub async fn stop_sound(&self) {
        self.inner.dispatcher.stop_sound().await;
    }

    // ── Outbound ─────────────────────────────────────────────────────

    /// Send an operator broadcast and require a positive acknowledgement.
    pub async fn broadcast(&self, request: &BroadcastRequest) -> Result<BroadcastAck, CoreError> {
        let push = self.inner.push.as_ref().ok_or(CoreError::PushUnavailable)?;
        let ack = push
            .broadcast(request, self.inner.config.broadcast_ack_timeout)
            .await?;
        if !ack.success {
            return Err(CoreError::BroadcastRejected {
                message: ack
                    .message
                    .clone()
                    .unwrap_or_else(|| "server reported failure".into()),
            });
        }
        Ok(ack)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Stop all background tasks, the push channel, and any sound.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(ref push) = self.inner.push {
            push.shutdown();
        }
        self.inner.dispatcher.stop_sound().await;

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!("incident engine stopped");
    }
}

// ── Reconcile task ───────────────────────────────────────────────────

struct Reconciler {
    store: IncidentStore,
    filter: watch::Receiver<IncidentFilter>,
    dedup: Deduplicator,
    acks: AckAggregator,
    dispatcher: Arc<AlertDispatcher>,
    events: broadcast::Sender<Arc<NotificationEvent>>,
    stats: watch::Sender<ReconcileStats>,
    resync: ResyncHandle,
}

impl Reconciler {
    async fn run(
        mut self,
        mut push_rx: broadcast::Receiver<Arc<PushEvent>>,
        mut store_rx: mpsc::Receiver<StoreCommand>,
        cancel: CancellationToken,
    ) {
        let mut push_open = true;
        let mut filter_rx = self.filter.clone();
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Ok(()) = filter_rx.changed() => {
                    let filter = filter_rx.borrow_and_update().clone();
                    self.refilter(&filter);
                }
                Some(command) = store_rx.recv() => self.handle_command(command),
                received = push_rx.recv(), if push_open => match received {
                    Ok(event) => self.handle_push(&event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "push events dropped, forcing resync");
                        self.resync.trigger();
                    }
                    Err(RecvError::Closed) => {
                        debug!("push event stream closed");
                        push_open = false;
                    }
                },
            }
        }
        debug!("reconcile task stopped");
    }

    /// Narrow the held collection to `filter` without waiting for the
    /// forced resync, which may be failing.
    fn refilter(&mut self, filter: &IncidentFilter) {
        let dropped = self.store.retain_matching(filter);
        if dropped > 0 {
            debug!(dropped, "removed incidents outside the new filter");
        }
    }

    fn handle_command(&mut self, command: StoreCommand) {
        let StoreCommand::Sync {
            records,
            rebuild,
            reply,
        } = command;
        let filter = self.filter.borrow().clone();

        let outcome = if rebuild {
            SyncOutcome::Rebuilt {
                total: self.store.rebuild(records, &filter),
            }
        } else {
            SyncOutcome::Merged(self.store.merge_snapshot(records, &filter))
        };
        self.stats.send_modify(|s| s.snapshots_applied += 1);
        let _ = reply.send(outcome);
    }

    async fn handle_push(&mut self, raw: &PushEvent) {
        let Some(event) = normalize(&raw.kind, &raw.payload) else {
            return;
        };

        let held = event
            .incident_id()
            .and_then(|id| self.store.get(id))
            .cloned();
        let Some(event) = self.dedup.reduce(event, held.as_deref()) else {
            let dropped = self.dedup.dropped();
            self.stats.send_modify(|s| s.events_deduplicated = dropped);
            return;
        };

        // Read the filter per event; never a copy captured earlier.
        let filter = self.filter.borrow().clone();
        let outcome = match event {
            NotificationEvent::Acknowledged(ref update) => {
                if self.acks.apply(&mut self.store, update) {
                    let applied = self.acks.applied();
                    self.stats.send_modify(|s| s.acks_applied = applied);
                    ApplyOutcome::Updated
                } else {
                    ApplyOutcome::Ignored
                }
            }
            _ => self.store.apply(&event, &filter),
        };
        if outcome.is_mutation() {
            self.stats.send_modify(|s| s.events_applied += 1);
        }

        let alert = match event {
            NotificationEvent::Created(ref record) if outcome == ApplyOutcome::Inserted => {
                Some(Alert::for_new_incident(record))
            }
            ref other => other.alert_notice().map(Alert::from_notice),
        };
        if let Some(alert) = alert {
            match self.dispatcher.dispatch(alert).await {
                DispatchOutcome::Delivered { .. } => {
                    self.stats.send_modify(|s| s.alerts_delivered += 1);
                }
                DispatchOutcome::Suppressed { .. } => {
                    self.stats.send_modify(|s| s.alerts_suppressed += 1);
                }
            }
        }

        let _ = self.events.send(Arc::new(event));
    }
}
