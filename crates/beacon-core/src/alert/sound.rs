// ── Sound state machine ──
//
// Idle → Playing → (Looping) → Stopped → Idle.
//
// Only one playback exists at a time. `start` halts and awaits the
// previous playback before spawning the next, so audio never overlaps.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use strum::Display;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::AlertProfile;
use crate::model::Priority;

/// Pause between repeats of a looping cue.
const LOOP_GAP: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SoundState {
    Idle,
    Playing,
    Looping,
    Stopped,
}

/// What to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundCue {
    pub priority: Priority,
    pub label: String,
}

/// Result of one playback call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    /// The platform refused playback (autoplay policy, muted device).
    Blocked { reason: String },
    Failed { reason: String },
}

/// Audio output. `play` resolves when one pass of the cue finishes;
/// `stop` cuts any playback short.
#[async_trait]
pub trait SoundPlayer: Send + Sync {
    async fn play(&self, cue: &SoundCue) -> PlaybackOutcome;
    fn stop(&self);
}

/// Player that makes no sound.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentPlayer;

#[async_trait]
impl SoundPlayer for SilentPlayer {
    async fn play(&self, _cue: &SoundCue) -> PlaybackOutcome {
        PlaybackOutcome::Completed
    }

    fn stop(&self) {}
}

struct Playback {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct SoundController {
    player: Arc<dyn SoundPlayer>,
    state: Arc<watch::Sender<SoundState>>,
    current: Mutex<Option<Playback>>,
}

impl SoundController {
    pub fn new(player: Arc<dyn SoundPlayer>) -> Self {
        let (state, _) = watch::channel(SoundState::Idle);
        Self {
            player,
            state: Arc::new(state),
            current: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SoundState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SoundState> {
        self.state.subscribe()
    }

    /// Stop whatever is playing, then begin `cue` under `profile`.
    pub async fn start(&self, cue: SoundCue, profile: &AlertProfile) {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            self.halt(previous).await;
        }

        let looping = profile.loop_sound;
        self.state.send_replace(SoundState::Playing);
        if looping {
            self.state.send_replace(SoundState::Looping);
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_playback(
            Arc::clone(&self.player),
            Arc::clone(&self.state),
            cue,
            looping,
            profile.max_loop_duration(),
            token.clone(),
        ));
        *current = Some(Playback { token, handle });
    }

    /// Manual stop. No-op when idle.
    pub async fn stop(&self) {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            self.halt(previous).await;
        }
    }

    async fn halt(&self, playback: Playback) {
        playback.token.cancel();
        self.player.stop();
        if let Err(e) = playback.handle.await {
            debug!(error = %e, "playback task ended abnormally");
        }
        if *self.state.borrow() != SoundState::Idle {
            self.state.send_replace(SoundState::Stopped);
            self.state.send_replace(SoundState::Idle);
        }
    }
}

async fn run_playback(
    player: Arc<dyn SoundPlayer>,
    state: Arc<watch::Sender<SoundState>>,
    cue: SoundCue,
    looping: bool,
    cap: Option<Duration>,
    token: CancellationToken,
) {
    let deadline = cap.filter(|_| looping).map(|d| Instant::now() + d);
    let cap_reached = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };

    let body = async {
        loop {
            match player.play(&cue).await {
                PlaybackOutcome::Completed => {}
                PlaybackOutcome::Blocked { reason } => {
                    info!(cue = %cue.label, reason, "sound playback blocked");
                    break;
                }
                PlaybackOutcome::Failed { reason } => {
                    warn!(cue = %cue.label, reason, "sound playback failed");
                    break;
                }
            }
            if !looping {
                break;
            }
            tokio::time::sleep(LOOP_GAP).await;
        }
    };

    tokio::select! {
        biased;
        // Superseded or stopped; the caller owns the state transition.
        () = token.cancelled() => return,
        () = cap_reached => {
            player.stop();
            debug!(cue = %cue.label, "loop duration cap reached");
        }
        () = body => {}
    }

    state.send_replace(SoundState::Stopped);
    state.send_replace(SoundState::Idle);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Each pass lasts `pass`; counts concurrent passes and stop calls.
    struct ClockPlayer {
        pass: Duration,
        active: AtomicUsize,
        max_active: AtomicUsize,
        plays: AtomicUsize,
        stops: AtomicUsize,
    }

    impl ClockPlayer {
        fn new(pass: Duration) -> Arc<Self> {
            Arc::new(Self {
                pass,
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                plays: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
            })
        }
    }

    struct ActiveGuard<'a>(&'a AtomicUsize);

    impl Drop for ActiveGuard<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SoundPlayer for ClockPlayer {
        async fn play(&self, _cue: &SoundCue) -> PlaybackOutcome {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.plays.fetch_add(1, Ordering::SeqCst);
            let _guard = ActiveGuard(&self.active);
            tokio::time::sleep(self.pass).await;
            PlaybackOutcome::Completed
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct BlockedPlayer;

    #[async_trait]
    impl SoundPlayer for BlockedPlayer {
        async fn play(&self, _cue: &SoundCue) -> PlaybackOutcome {
            PlaybackOutcome::Blocked {
                reason: "autoplay disabled".into(),
            }
        }

        fn stop(&self) {}
    }

    fn cue(priority: Priority) -> SoundCue {
        SoundCue {
            priority,
            label: "test".into(),
        }
    }

    fn looping(cap_ms: u64) -> AlertProfile {
        AlertProfile {
            play_sound: true,
            toast_duration_ms: 10_000,
            loop_sound: true,
            max_loop_duration_ms: Some(cap_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn loop_stops_at_cap() {
        let player = ClockPlayer::new(Duration::from_secs(2));
        let controller = SoundController::new(player.clone());

        controller.start(cue(Priority::Critical), &looping(60_000)).await;
        assert_eq!(controller.state(), SoundState::Looping);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(controller.state(), SoundState::Looping);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(controller.state(), SoundState::Idle);
        assert_eq!(player.active.load(Ordering::SeqCst), 0);
        assert!(player.stops.load(Ordering::SeqCst) >= 1);

        let plays = player.plays.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(player.plays.load(Ordering::SeqCst), plays);
    }

    #[tokio::test(start_paused = true)]
    async fn new_alert_never_overlaps_previous() {
        let player = ClockPlayer::new(Duration::from_secs(3));
        let controller = SoundController::new(player.clone());
        let single = AlertProfile {
            loop_sound: false,
            max_loop_duration_ms: None,
            ..looping(0)
        };

        controller.start(cue(Priority::Critical), &looping(60_000)).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        controller.start(cue(Priority::High), &single).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        controller.start(cue(Priority::Medium), &single).await;

        assert_eq!(player.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(controller.state(), SoundState::Playing);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(controller.state(), SoundState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_stop_returns_to_idle() {
        let player = ClockPlayer::new(Duration::from_secs(2));
        let controller = SoundController::new(player.clone());
        let mut states = controller.subscribe();

        controller.start(cue(Priority::Critical), &looping(60_000)).await;
        controller.stop().await;

        assert_eq!(controller.state(), SoundState::Idle);
        assert_eq!(player.active.load(Ordering::SeqCst), 0);
        assert!(states.has_changed().unwrap_or(false));
        controller.stop().await;
    }

    #[tokio::test]
    async fn blocked_playback_is_not_retried() {
        let controller = SoundController::new(Arc::new(BlockedPlayer));
        let mut states = controller.subscribe();
        controller.start(cue(Priority::High), &looping(60_000)).await;

        while *states.borrow_and_update() != SoundState::Idle {
            if states.changed().await.is_err() {
                break;
            }
        }
        assert_eq!(controller.state(), SoundState::Idle);
    }
}
