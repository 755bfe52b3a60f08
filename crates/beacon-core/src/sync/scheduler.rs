// ── Resync scheduler task ──
//
// One task owns the steady interval, the one-shot retry timer, and the
// in-flight attempt. Starting any attempt cancels the previous one first,
// so at most one fetch is ever outstanding. Ticks and retries never cancel
// a forced attempt; only another forced request does.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BackoffPolicy, IncidentSource, StoreCommand, SyncOutcome, SyncState};
use crate::error::CoreError;
use crate::filter::IncidentFilter;
use crate::health::HealthMonitor;

type Reply = oneshot::Sender<Result<SyncOutcome, CoreError>>;

/// Request for an immediate, health-ungated resync.
#[derive(Debug)]
struct ForceRequest {
    reply: Option<Reply>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Initial,
    Scheduled,
    Retry,
    Forced,
}

impl Trigger {
    /// Forced attempts skip the health probe and always rebuild.
    fn is_forced(self) -> bool {
        matches!(self, Self::Initial | Self::Forced)
    }
}

enum AttemptOutcome {
    Synced(SyncOutcome),
    Skipped,
    Aborted,
    Failed(CoreError),
}

struct AttemptReport {
    generation: u64,
    outcome: AttemptOutcome,
}

struct InFlight {
    generation: u64,
    trigger: Trigger,
    token: CancellationToken,
    handle: JoinHandle<()>,
    reply: Option<Reply>,
}

// ── Handle ───────────────────────────────────────────────────────────

/// Cloneable handle to a running scheduler.
#[derive(Clone)]
pub struct ResyncHandle {
    force_tx: mpsc::Sender<ForceRequest>,
    state: watch::Receiver<SyncState>,
}

impl ResyncHandle {
    /// Run a forced resync and wait for its outcome.
    ///
    /// Returns [`CoreError::Aborted`] if another attempt supersedes it.
    pub async fn force(&self) -> Result<SyncOutcome, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.force_tx
            .send(ForceRequest { reply: Some(tx) })
            .await
            .map_err(|_| CoreError::EngineStopped)?;
        rx.await.map_err(|_| CoreError::EngineStopped)?
    }

    /// Request a forced resync without waiting.
    pub fn trigger(&self) {
        let _ = self.force_tx.try_send(ForceRequest { reply: None });
    }

    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }
}

// ── Scheduler ────────────────────────────────────────────────────────

pub(crate) struct ResyncScheduler {
    source: Arc<dyn IncidentSource>,
    health: Arc<HealthMonitor>,
    policy: BackoffPolicy,
    interval: Duration,
    filter: watch::Receiver<IncidentFilter>,
    store_tx: mpsc::Sender<StoreCommand>,
    state: watch::Sender<SyncState>,
    generation: u64,
    /// Set after a skipped or failed attempt; the next success rebuilds.
    drift: bool,
}

impl ResyncScheduler {
    /// Spawn the scheduler task. An initial forced load runs immediately.
    pub(crate) fn spawn(
        source: Arc<dyn IncidentSource>,
        health: Arc<HealthMonitor>,
        policy: BackoffPolicy,
        interval: Duration,
        filter: watch::Receiver<IncidentFilter>,
        store_tx: mpsc::Sender<StoreCommand>,
        cancel: CancellationToken,
    ) -> (ResyncHandle, JoinHandle<()>) {
        let (state, state_rx) = watch::channel(SyncState::default());
        let (force_tx, force_rx) = mpsc::channel(8);

        let scheduler = Self {
            source,
            health,
            policy,
            interval,
            filter,
            store_tx,
            state,
            generation: 0,
            drift: false,
        };
        let handle = tokio::spawn(scheduler.run(force_rx, cancel));

        (
            ResyncHandle {
                force_tx,
                state: state_rx,
            },
            handle,
        )
    }

    async fn run(mut self, mut force_rx: mpsc::Receiver<ForceRequest>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // consume the immediate first tick

        let retry = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(retry);
        let mut retry_armed = false;

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<AttemptReport>();
        let mut in_flight = Some(self.start(Trigger::Initial, None, &done_tx, None));

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(report) = done_rx.recv() => {
                    let current = in_flight.take_if(|f| f.generation == report.generation);
                    if let Some(flight) = current {
                        if let Some(delay) = self.finish(report.outcome, flight.reply) {
                            retry.as_mut().reset(Instant::now() + delay);
                            retry_armed = true;
                        } else if self.state.borrow().retry_count == 0 {
                            retry_armed = false;
                        }
                    }
                }
                Some(request) = force_rx.recv() => {
                    in_flight = Some(self.start(Trigger::Forced, request.reply, &done_tx, in_flight.take()));
                }
                () = &mut retry, if retry_armed => {
                    retry_armed = false;
                    if in_flight.as_ref().is_some_and(|f| f.trigger.is_forced()) {
                        debug!("forced resync in flight, retry dropped");
                        continue;
                    }
                    in_flight = Some(self.start(Trigger::Retry, None, &done_tx, in_flight.take()));
                }
                _ = ticker.tick() => {
                    if in_flight.as_ref().is_some_and(|f| f.trigger.is_forced()) {
                        debug!("forced resync in flight, tick skipped");
                        continue;
                    }
                    in_flight = Some(self.start(Trigger::Scheduled, None, &done_tx, in_flight.take()));
                }
            }
        }

        if let Some(flight) = in_flight.take() {
            Self::supersede(flight);
        }
        self.state.send_modify(|s| {
            s.in_flight = false;
            s.next_retry_in = None;
        });
        debug!("resync scheduler stopped");
    }

    /// Cancel any previous attempt and spawn a new one.
    fn start(
        &mut self,
        trigger: Trigger,
        reply: Option<Reply>,
        done_tx: &mpsc::UnboundedSender<AttemptReport>,
        previous: Option<InFlight>,
    ) -> InFlight {
        if let Some(flight) = previous {
            debug!(?trigger, "superseding in-flight resync");
            Self::supersede(flight);
        }

        self.generation += 1;
        let generation = self.generation;
        let token = CancellationToken::new();
        let rebuild = trigger.is_forced() || self.drift;
        let attempt = Attempt {
            source: Arc::clone(&self.source),
            health: Arc::clone(&self.health),
            filter: self.filter.borrow().clone(),
            store_tx: self.store_tx.clone(),
            probe: !trigger.is_forced(),
            rebuild,
            token: token.clone(),
        };

        self.state.send_modify(|s| s.in_flight = true);
        debug!(?trigger, generation, rebuild, "starting resync");

        let done_tx = done_tx.clone();
        let handle = tokio::spawn(async move {
            let outcome = attempt.run().await;
            let _ = done_tx.send(AttemptReport {
                generation,
                outcome,
            });
        });

        InFlight {
            generation,
            trigger,
            token,
            handle,
            reply,
        }
    }

    fn supersede(flight: InFlight) {
        flight.token.cancel();
        flight.handle.abort();
        if let Some(reply) = flight.reply {
            let _ = reply.send(Err(CoreError::Aborted));
        }
    }

    /// Fold an attempt's outcome into `SyncState`. Returns the retry delay
    /// to arm, if any.
    fn finish(&mut self, outcome: AttemptOutcome, reply: Option<Reply>) -> Option<Duration> {
        let (result, retry) = match outcome {
            AttemptOutcome::Synced(sync) => {
                self.drift = false;
                self.state.send_modify(|s| {
                    s.retry_count = 0;
                    s.last_successful_sync = Some(Utc::now());
                    s.connection_healthy = true;
                    s.in_flight = false;
                    s.next_retry_in = None;
                    s.last_error = None;
                });
                debug!(?sync, "resync complete");
                (Ok(sync), None)
            }
            AttemptOutcome::Skipped => {
                self.drift = true;
                self.state.send_modify(|s| {
                    s.connection_healthy = false;
                    s.in_flight = false;
                });
                info!("server unreachable, resync skipped until next tick");
                (Ok(SyncOutcome::Skipped), None)
            }
            AttemptOutcome::Aborted => {
                self.state.send_modify(|s| s.in_flight = false);
                debug!("resync aborted");
                (Err(CoreError::Aborted), None)
            }
            AttemptOutcome::Failed(e) => {
                self.drift = true;
                let mut retry_count = 0;
                self.state.send_modify(|s| {
                    s.retry_count = s.retry_count.saturating_add(1);
                    retry_count = s.retry_count;
                });
                let delay = self.policy.delay(retry_count);
                self.state.send_modify(|s| {
                    s.in_flight = false;
                    s.next_retry_in = Some(delay);
                    s.last_error = Some(e.to_string());
                });
                warn!(
                    error = %e,
                    retry_count,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "resync failed, retry scheduled"
                );
                (Err(e), Some(delay))
            }
        };

        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
        retry
    }
}

// ── Attempt ──────────────────────────────────────────────────────────

struct Attempt {
    source: Arc<dyn IncidentSource>,
    health: Arc<HealthMonitor>,
    filter: IncidentFilter,
    store_tx: mpsc::Sender<StoreCommand>,
    probe: bool,
    rebuild: bool,
    token: CancellationToken,
}

impl Attempt {
    async fn run(self) -> AttemptOutcome {
        if self.probe && !self.health.probe().await {
            return AttemptOutcome::Skipped;
        }

        let fetched = tokio::select! {
            biased;
            () = self.token.cancelled() => return AttemptOutcome::Aborted,
            result = self.source.fetch(&self.filter, &self.token) => result,
        };

        let records = match fetched {
            Ok(records) => records,
            Err(e) if e.is_aborted() => return AttemptOutcome::Aborted,
            Err(e) => return AttemptOutcome::Failed(e),
        };

        let (reply, applied) = oneshot::channel();
        let command = StoreCommand::Sync {
            records,
            rebuild: self.rebuild,
            reply,
        };
        if self.store_tx.send(command).await.is_err() {
            return AttemptOutcome::Failed(CoreError::EngineStopped);
        }
        match applied.await {
            Ok(outcome) => AttemptOutcome::Synced(outcome),
            Err(_) => AttemptOutcome::Failed(CoreError::EngineStopped),
        }
    }
}
