#![allow(clippy::unwrap_used)]
// End-to-end engine scenarios with in-process fakes for the pull source,
// liveness probe, and sound player.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use beacon_core::{
    ChannelState, CoreError, Engine, EngineConfig, EngineParts, IncidentFilter, IncidentRecord,
    IncidentSource, IncidentStatus, LivenessProbe, NotificationEvent, PlaybackOutcome, Priority,
    PushEvent, SoundCue, SoundPlayer, SoundState, SyncOutcome, ToastChannel,
};

// ── Fakes ───────────────────────────────────────────────────────────

struct Step {
    delay: Duration,
    result: Result<Vec<IncidentRecord>, String>,
}

#[derive(Default)]
struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    fallback: Mutex<Vec<IncidentRecord>>,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedSource {
    fn returning(records: Vec<IncidentRecord>) -> Arc<Self> {
        let source = Self::default();
        *source.fallback.lock().unwrap() = records;
        Arc::new(source)
    }

    fn push(&self, delay: Duration, result: Result<Vec<IncidentRecord>, String>) {
        self.steps.lock().unwrap().push_back(Step { delay, result });
    }

    fn fail_times(&self, n: usize) {
        for _ in 0..n {
            self.push(Duration::ZERO, Err("502 bad gateway".into()));
        }
    }

    fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl IncidentSource for ScriptedSource {
    async fn fetch(
        &self,
        _filter: &IncidentFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<IncidentRecord>, CoreError> {
        self.calls.lock().unwrap().push(Instant::now());
        let step = self.steps.lock().unwrap().pop_front();
        let step = step.unwrap_or_else(|| Step {
            delay: Duration::ZERO,
            result: Ok(self.fallback.lock().unwrap().clone()),
        });

        tokio::select! {
            () = cancel.cancelled() => return Err(CoreError::Aborted),
            () = tokio::time::sleep(step.delay) => {}
        }
        step.result.map_err(|message| CoreError::ResyncFailed {
            message,
            status: Some(502),
        })
    }
}

struct SwitchProbe(AtomicBool);

#[async_trait]
impl LivenessProbe for SwitchProbe {
    async fn check(&self, _timeout: Duration) -> Result<bool, CoreError> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

/// Each pass takes two seconds; tracks concurrent passes.
#[derive(Default)]
struct CountingPlayer {
    active: AtomicUsize,
    max_active: AtomicUsize,
    plays: AtomicUsize,
}

struct Pass<'a>(&'a AtomicUsize);

impl Drop for Pass<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SoundPlayer for CountingPlayer {
    async fn play(&self, _cue: &SoundCue) -> PlaybackOutcome {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.plays.fetch_add(1, Ordering::SeqCst);
        let _pass = Pass(&self.active);
        tokio::time::sleep(Duration::from_secs(2)).await;
        PlaybackOutcome::Completed
    }

    fn stop(&self) {}
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    engine: Engine,
    push: broadcast::Sender<Arc<PushEvent>>,
    _channel: watch::Sender<ChannelState>,
    source: Arc<ScriptedSource>,
    probe: Arc<SwitchProbe>,
    player: Arc<CountingPlayer>,
}

impl Harness {
    fn start(source: Arc<ScriptedSource>, interval: Duration) -> Self {
        let mut config = EngineConfig::new(Url::parse("http://dispatch.test").unwrap());
        config.resync.interval = interval;
        config.push_enabled = false;

        let (push, events) = broadcast::channel(64);
        let (channel, channel_state) = watch::channel(ChannelState::Connected);
        let probe = Arc::new(SwitchProbe(AtomicBool::new(true)));
        let player = Arc::new(CountingPlayer::default());

        let engine = Engine::spawn(
            config,
            EngineParts {
                events,
                channel_state,
                source: source.clone(),
                probe: probe.clone(),
                player: player.clone(),
                push: None,
            },
        );

        Self {
            engine,
            push,
            _channel: channel,
            source,
            probe,
            player,
        }
    }

    async fn initial_sync(&self) {
        let mut sync = self.engine.subscribe_sync();
        sync.wait_for(|s| s.last_successful_sync.is_some())
            .await
            .unwrap();
    }

    fn send(&self, kind: &str, payload: serde_json::Value) {
        self.push
            .send(Arc::new(PushEvent::new(kind, payload)))
            .unwrap();
    }

    fn ids(&self) -> Vec<String> {
        self.engine
            .incidents()
            .items
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }
}

fn record(id: &str, priority: Priority) -> IncidentRecord {
    IncidentRecord::new(id, IncidentStatus::Reported, priority)
}

const QUIET: Duration = Duration::from_secs(3600);

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn critical_creation_inserts_at_head_and_loops_until_cap() {
    let h = Harness::start(
        ScriptedSource::returning(vec![record("I0", Priority::Low)]),
        QUIET,
    );
    h.initial_sync().await;

    let mut toasts = h.engine.toasts();
    let mut events = h.engine.events();
    let sound = h.engine.sound_state();

    h.send(
        "incident:created",
        json!({ "id": "I1", "priority": "CRITICAL", "status": "REPORTED" }),
    );
    let event = events.recv().await.unwrap();
    assert!(matches!(*event, NotificationEvent::Created(_)));

    assert_eq!(h.ids(), vec!["I1", "I0"]);
    assert_eq!(h.engine.incidents().total, 2);
    assert_eq!(*sound.borrow(), SoundState::Looping);

    let toast = toasts.recv().await.unwrap();
    assert_eq!(toast.channel, ToastChannel::Error);
    assert_eq!(toast.duration, Duration::from_secs(10));
    let action = toast.action.unwrap();
    assert_eq!(action.label, "View");
    assert_eq!(action.target, "/incidents/I1");

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(*sound.borrow(), SoundState::Idle);
    assert_eq!(h.player.active.load(Ordering::SeqCst), 0);
    assert_eq!(h.player.max_active.load(Ordering::SeqCst), 1);

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn acknowledgment_patches_without_moving() {
    let h = Harness::start(
        ScriptedSource::returning(vec![record("I2", Priority::High), record("I1", Priority::High)]),
        QUIET,
    );
    h.initial_sync().await;
    let mut events = h.engine.events();

    h.send(
        "incident:acknowledged",
        json!({
            "incidentId": "I1",
            "acknowledgedCount": 4,
            "totalPersonnelNotified": 10,
            "acknowledgmentPercentage": 40
        }),
    );
    events.recv().await.unwrap();

    let view = h.engine.incidents();
    assert_eq!(view.position("I1"), Some(1));
    let ack = view.get("I1").unwrap().acknowledgment;
    assert!((ack.percentage() - 40.0).abs() < f64::EPSILON);
    assert_eq!(h.engine.reconcile_stats().acks_applied, 1);

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn consecutive_failures_back_off_exponentially() {
    let source = ScriptedSource::returning(Vec::new());
    source.fail_times(4);
    let h = Harness::start(source, QUIET);

    tokio::time::sleep(Duration::from_secs(425)).await;

    let calls = h.source.calls();
    assert_eq!(calls.len(), 4, "initial load plus three retries");
    let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
    for (gap, base) in gaps.iter().zip([60, 120, 240]) {
        let base = Duration::from_secs(base);
        assert!(*gap > base, "gap {gap:?} should exceed {base:?}");
        assert!(*gap <= base + Duration::from_secs(1), "gap {gap:?} too large");
    }

    let state = h.engine.sync_state();
    assert_eq!(state.retry_count, 4);
    assert!(state.last_successful_sync.is_none());
    assert!(state.next_retry_in.unwrap() <= Duration::from_secs(301));

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unhealthy_probe_skips_without_consuming_retry() {
    let source = ScriptedSource::returning(vec![record("I1", Priority::Medium)]);
    source.fail_times(1);
    let h = Harness::start(source, Duration::from_secs(300));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.engine.sync_state().retry_count, 1);

    h.probe.0.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(120)).await;

    let state = h.engine.sync_state();
    assert_eq!(state.retry_count, 1);
    assert!(!state.connection_healthy);
    assert_eq!(h.source.calls().len(), 1);

    h.probe.0.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(200)).await;

    let state = h.engine.sync_state();
    assert_eq!(state.retry_count, 0);
    assert!(state.connection_healthy);
    assert!(state.last_successful_sync.is_some());
    assert_eq!(h.ids(), vec!["I1"]);

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn new_request_supersedes_in_flight_one() {
    let source = ScriptedSource::returning(vec![record("I1", Priority::Medium)]);
    source.push(Duration::from_secs(10), Ok(Vec::new()));
    let h = Harness::start(source, QUIET);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let outcome = h.engine.force_resync().await.unwrap();

    assert_eq!(outcome, SyncOutcome::Rebuilt { total: 1 });
    assert_eq!(h.source.calls().len(), 2);

    tokio::time::sleep(Duration::from_secs(20)).await;
    let state = h.engine.sync_state();
    assert_eq!(state.retry_count, 0);
    assert!(!state.in_flight);
    assert_eq!(h.ids(), vec!["I1"]);

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn steady_tick_does_not_cancel_manual_refresh() {
    let h = Harness::start(
        ScriptedSource::returning(vec![record("I1", Priority::Medium)]),
        Duration::from_secs(30),
    );
    h.initial_sync().await;
    h.source
        .push(Duration::from_secs(40), Ok(vec![record("I2", Priority::High)]));
    let before = h.source.calls().len();

    let outcome = h.engine.refresh().await.unwrap();

    assert_eq!(outcome, SyncOutcome::Rebuilt { total: 1 });
    assert_eq!(h.source.calls().len(), before + 1, "tick started no fetch");
    assert_eq!(h.ids(), vec!["I2"]);

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn manual_refresh_failure_posts_one_notice() {
    let h = Harness::start(ScriptedSource::returning(Vec::new()), QUIET);
    h.initial_sync().await;
    h.source.fail_times(1);

    let loading = h.engine.loading();
    let result = h.engine.refresh().await;

    assert!(matches!(result, Err(CoreError::ResyncFailed { .. })));
    assert!(!*loading.borrow());
    let log = h.engine.notifications().snapshot();
    assert_eq!(log.entries.len(), 1);
    assert_eq!(log.entries[0].channel, ToastChannel::Error);

    let ok = h.engine.refresh().await.unwrap();
    assert!(matches!(ok, SyncOutcome::Rebuilt { .. }));
    assert_eq!(h.engine.notifications().snapshot().entries.len(), 1);
    assert!(!*loading.borrow());

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn filter_change_rebuilds_membership() {
    let h = Harness::start(
        ScriptedSource::returning(vec![
            record("I1", Priority::Low),
            record("I2", Priority::Critical),
        ]),
        QUIET,
    );
    h.initial_sync().await;
    assert_eq!(h.ids(), vec!["I1", "I2"]);

    let mut view = h.engine.subscribe_incidents();
    h.engine
        .set_filter(IncidentFilter::default().with_priorities([Priority::Critical]));
    view.wait_for(|v| v.total == 1).await.unwrap();

    assert_eq!(h.ids(), vec!["I2"]);

    // An update that leaves the filter removes the record.
    let mut events = h.engine.events();
    h.send("incident:updated", json!({ "id": "I2", "priority": "HIGH" }));
    events.recv().await.unwrap();
    assert!(h.ids().is_empty());

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn filter_change_narrows_view_while_source_is_failing() {
    let h = Harness::start(
        ScriptedSource::returning(vec![
            record("I1", Priority::Low),
            record("I2", Priority::Critical),
        ]),
        QUIET,
    );
    h.initial_sync().await;
    h.source.fail_times(10);

    let critical_only = IncidentFilter::default().with_priorities([Priority::Critical]);
    h.engine.set_filter(critical_only.clone());
    tokio::time::sleep(Duration::from_secs(5)).await;

    // The forced resync failed, yet the view already honours the filter.
    let state = h.engine.sync_state();
    assert_eq!(state.retry_count, 1);
    assert_eq!(h.ids(), vec!["I2"]);
    assert!(h.engine.incidents().items.iter().all(|r| critical_only.matches(r)));

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn repeated_and_mixed_events_never_duplicate() {
    let h = Harness::start(
        ScriptedSource::returning(vec![record("I1", Priority::High)]),
        Duration::from_secs(30),
    );
    h.initial_sync().await;
    let mut events = h.engine.events();

    let created = json!({ "id": "I3", "priority": "HIGH", "status": "REPORTED" });
    h.send("incident:created", created.clone());
    h.send("incident:created", created);
    h.send("incident:status", json!({ "incidentId": "I3", "status": "DISPATCHED" }));
    h.send("incident:status", json!({ "incidentId": "I3", "status": "DISPATCHED" }));
    h.send(
        "incident:updated",
        json!({ "id": "I4", "status": "IN_PROGRESS", "priority": "LOW" }),
    );

    // Second creation and second status change are dropped as no-ops.
    for _ in 0..3 {
        events.recv().await.unwrap();
    }
    assert_eq!(h.ids(), vec!["I4", "I3", "I1"]);
    assert_eq!(h.engine.reconcile_stats().events_deduplicated, 2);

    // The next steady resync adopts the server's view.
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(h.ids(), vec!["I1"]);

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn resolved_is_removed_and_passthrough_is_forwarded() {
    let h = Harness::start(
        ScriptedSource::returning(vec![record("I1", Priority::High)]),
        QUIET,
    );
    h.initial_sync().await;
    let mut events = h.engine.events();

    h.send("incident:resolved", json!({ "incidentId": "I1" }));
    h.send(
        "personnel:location:updated",
        json!({ "personnelId": "P9", "lat": 1.0, "lng": 2.0 }),
    );

    assert!(matches!(*events.recv().await.unwrap(), NotificationEvent::Resolved(_)));
    assert!(matches!(
        *events.recv().await.unwrap(),
        NotificationEvent::Passthrough { .. }
    ));
    assert!(h.ids().is_empty());

    h.engine.shutdown().await;
}
