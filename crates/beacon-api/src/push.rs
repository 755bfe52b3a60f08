//! Push channel with auto-reconnect.
//!
//! Holds one authenticated WebSocket connection to the dispatch server and
//! fans incoming events out two ways: a [`tokio::sync::broadcast`] stream of
//! every event, and per-kind handlers registered with [`PushChannel::on`].
//! Connectivity transitions are published on a `watch` channel so a health
//! monitor can derive liveness without touching the socket.
//!
//! Wire format (JSON text frames):
//!
//! ```text
//! inbound event   { "event": "incident:created", "data": { ... } }
//! outbound event  { "event": "notification:broadcast", "data": { ... }, "ack": 7 }
//! ack reply       { "ack": 7, "data": { "success": true } }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use beacon_api::push::{PushChannel, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let url = Url::parse("wss://dispatch.example/ws")?;
//!
//! let channel = PushChannel::connect(url, Some(token), ReconnectConfig::default(), cancel.clone())?;
//! let mut rx = channel.subscribe();
//!
//! while let Ok(event) = rx.recv().await {
//!     println!("{}: {}", event.kind, event.payload);
//! }
//!
//! channel.shutdown();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::duration_ms;
use crate::error::Error;

// ── Channel capacities ───────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// Outbound event kind for operator broadcasts.
pub const BROADCAST_EVENT: &str = "notification:broadcast";

// ── PushEvent ────────────────────────────────────────────────────────

/// A raw event from the push channel.
///
/// The payload is kept as JSON; naming across event kinds is inconsistent
/// and canonicalization happens in `beacon-core`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    /// Event kind, e.g. `"incident:created"`, `"alert:critical"`.
    pub kind: String,

    /// Kind-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,

    /// Local arrival time.
    pub received_at: DateTime<Utc>,
}

impl PushEvent {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            received_at: Utc::now(),
        }
    }
}

// ── ChannelState ─────────────────────────────────────────────────────

/// Connectivity of the push channel, observable via [`PushChannel::state`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting { attempt: u32 },
    /// Handshake or transport failure, including rejected credentials.
    Error { message: String },
    /// Reconnection attempts exhausted.
    Failed,
}

impl ChannelState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Backoff configuration for push channel reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay floor, also used before the first reconnection. Default: 2s.
    pub initial_delay: Duration,

    /// Delay ceiling. Default: 10s.
    pub max_delay: Duration,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means retry forever. Default: 5.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            max_retries: Some(5),
        }
    }
}

// ── Broadcast payloads ───────────────────────────────────────────────

/// Operator broadcast sent as `notification:broadcast`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub targets: Vec<String>,
}

/// Server acknowledgement for a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastAck {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

// ── Routing ──────────────────────────────────────────────────────────

/// Handle returned by [`PushChannel::on`]; pass to [`PushChannel::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&PushEvent) + Send + Sync>;

/// Shared between the handle and the background task: owns the fan-out
/// and the table of outstanding acknowledgements.
struct Router {
    event_tx: broadcast::Sender<Arc<PushEvent>>,
    handlers: DashMap<SubscriptionId, (String, Handler)>,
    pending_acks: DashMap<u64, oneshot::Sender<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    ack: Option<u64>,
}

impl Router {
    fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            event_tx,
            handlers: DashMap::new(),
            pending_acks: DashMap::new(),
        }
    }

    /// Parse a text frame and route it to an ack waiter or to subscribers.
    fn handle_text(&self, text: &str) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to parse push frame");
                return;
            }
        };

        match (frame.event, frame.ack) {
            (None, Some(id)) => {
                if let Some((_, waiter)) = self.pending_acks.remove(&id) {
                    let _ = waiter.send(frame.data);
                } else {
                    tracing::debug!(ack = id, "Acknowledgement for unknown or expired request");
                }
            }
            (Some(kind), _) => {
                let event = Arc::new(PushEvent::new(kind, frame.data));
                self.dispatch_handlers(&event);
                // Ignore send errors -- just means no active subscribers right now
                let _ = self.event_tx.send(event);
            }
            (None, None) => tracing::debug!("Push frame without event or ack"),
        }
    }

    fn dispatch_handlers(&self, event: &PushEvent) {
        // Collect first: a handler may call `on`/`off` and must not hit a held shard lock.
        let matching: Vec<Handler> = self
            .handlers
            .iter()
            .filter(|entry| entry.value().0 == event.kind)
            .map(|entry| Arc::clone(&entry.value().1))
            .collect();

        for handler in matching {
            handler(event);
        }
    }
}

// ── PushChannel ──────────────────────────────────────────────────────

/// Handle to a running push channel.
///
/// Call [`shutdown`](Self::shutdown) (or cancel the token passed to
/// [`connect`](Self::connect)) to tear down the background task.
pub struct PushChannel {
    router: Arc<Router>,
    state_rx: watch::Receiver<ChannelState>,
    outbound_tx: mpsc::Sender<String>,
    next_id: AtomicU64,
    cancel: CancellationToken,
}

impl PushChannel {
    /// Spawn the connection loop and return immediately.
    ///
    /// The first handshake happens asynchronously; watch [`state`](Self::state)
    /// for `Connected`. Must be called inside a Tokio runtime.
    pub fn connect(
        url: Url,
        token: Option<SecretString>,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::WebSocketConnect(format!(
                "unsupported scheme '{}' (expected ws or wss)",
                url.scheme()
            )));
        }

        let router = Arc::new(Router::new());
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);

        let task_router = Arc::clone(&router);
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let session = Session {
                url,
                token,
                router: task_router,
                state_tx,
                outbound_rx,
            };
            ws_loop(session, reconnect, task_cancel).await;
        });

        Ok(Self {
            router,
            state_rx,
            outbound_tx,
            next_id: AtomicU64::new(1),
            cancel,
        })
    }

    /// Get a new broadcast receiver for every inbound event.
    ///
    /// A consumer that falls behind receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PushEvent>> {
        self.router.event_tx.subscribe()
    }

    /// Register a handler for one event kind. Handlers run on the channel
    /// task and must not block.
    pub fn on<F>(&self, kind: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.router
            .handlers
            .insert(id, (kind.into(), Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was already removed.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.router.handlers.remove(&id).is_some()
    }

    /// Subscribe to connectivity transitions.
    pub fn state(&self) -> watch::Receiver<ChannelState> {
        self.state_rx.clone()
    }

    /// Emit an event and wait for the server's acknowledgement payload.
    pub async fn emit_with_ack(
        &self,
        event: &str,
        data: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, Error> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.router.pending_acks.insert(id, tx);

        let frame = serde_json::json!({ "event": event, "data": data, "ack": id }).to_string();
        if self.outbound_tx.send(frame).await.is_err() {
            self.router.pending_acks.remove(&id);
            return Err(Error::ChannelClosed);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => {
                self.router.pending_acks.remove(&id);
                Err(Error::AckTimeout {
                    event: event.to_owned(),
                    timeout_ms: duration_ms(timeout),
                })
            }
        }
    }

    /// Send an operator broadcast and wait for `{ success }`.
    pub async fn broadcast(
        &self,
        request: &BroadcastRequest,
        timeout: Duration,
    ) -> Result<BroadcastAck, Error> {
        let data = serde_json::to_value(request)?;
        let reply = self.emit_with_ack(BROADCAST_EVENT, data, timeout).await?;
        serde_json::from_value(reply.clone()).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: reply.to_string(),
        })
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Everything the background task owns across reconnects.
struct Session {
    url: Url,
    token: Option<SecretString>,
    router: Arc<Router>,
    state_tx: watch::Sender<ChannelState>,
    outbound_rx: mpsc::Receiver<String>,
}

/// Main loop: connect → read → on error, backoff → reconnect.
async fn ws_loop(mut session: Session, reconnect: ReconnectConfig, cancel: CancellationToken) {
    let mut attempt: u32 = 0;

    loop {
        let state = if attempt == 0 {
            ChannelState::Connecting
        } else {
            ChannelState::Reconnecting { attempt }
        };
        let _ = session.state_tx.send(state);

        let mut connected = false;
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&mut session, &cancel, &mut connected) => result,
        };

        if connected {
            attempt = 0;
        }

        let delay = match result {
            // Clean disconnect (server close frame or stream ended).
            Ok(()) => {
                if cancel.is_cancelled() {
                    break;
                }
                tracing::info!("Push channel disconnected cleanly, reconnecting");
                let _ = session.state_tx.send(ChannelState::Disconnected);
                reconnect.initial_delay
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "Push channel error");
                let _ = session.state_tx.send(ChannelState::Error {
                    message: e.to_string(),
                });

                if let Some(max) = reconnect.max_retries {
                    if attempt >= max {
                        tracing::error!(
                            max_retries = max,
                            "Push channel reconnection limit reached, giving up"
                        );
                        let _ = session.state_tx.send(ChannelState::Failed);
                        return;
                    }
                }

                calculate_backoff(attempt, &reconnect)
            }
        };

        tracing::info!(delay_ms = duration_ms(delay), attempt, "Waiting before reconnect");
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    let _ = session.state_tx.send(ChannelState::Disconnected);
    tracing::debug!("Push channel loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish a single connection and pump frames until it drops.
///
/// The bearer token rides on the upgrade request's `Authorization` header.
/// A 401/403 handshake response maps to [`Error::Authentication`].
async fn connect_and_read(
    session: &mut Session,
    cancel: &CancellationToken,
    connected: &mut bool,
) -> Result<(), Error> {
    tracing::info!(url = %session.url, "Connecting push channel");

    let uri: tungstenite::http::Uri = session
        .url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(token) = &session.token {
        request = request.with_header("Authorization", format!("Bearer {}", token.expose_secret()));
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(map_handshake_error)?;

    *connected = true;
    let _ = session.state_tx.send(ChannelState::Connected);
    tracing::info!("Push channel connected");

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.close().await;
                return Ok(());
            }
            Some(frame) = session.outbound_rx.recv() => {
                write
                    .send(tungstenite::Message::text(frame))
                    .await
                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        session.router.handle_text(&text);
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("Push channel ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "Push channel close frame received"
                            );
                        } else {
                            tracing::info!("Push channel close frame received (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("Push channel stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

fn map_handshake_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::Http(response)
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            Error::Authentication {
                message: format!("handshake rejected (HTTP {})", response.status().as_u16()),
            }
        }
        other => Error::WebSocketConnect(other.to_string()),
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter, clamped to `[initial_delay, max_delay]`.
///
/// `delay = clamp(min(initial * 2^attempt, max) * (1 +- 0.25), initial, max)`
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let floor = config.initial_delay.min(config.max_delay).as_secs_f64();
    let ceiling = config.max_delay.as_secs_f64();

    let exponent = i32::try_from(attempt.min(16)).unwrap_or(16);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(ceiling);

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();

    Duration::from_secs_f64((capped * jitter_factor).clamp(floor, ceiling))
}

// ── Tests ────────────────────────────────────────────────────────────
