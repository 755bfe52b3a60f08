//! Incident synchronization and alert delivery for `beacon`.
//!
//! Keeps a local view of active incidents consistent with the dispatch
//! server and raises priority-tiered alerts:
//!
//! - **[`Engine`]**: facade owning every background task.
//!   [`connect()`](Engine::connect) opens the push channel and HTTP client;
//!   [`spawn()`](Engine::spawn) accepts explicit collaborators.
//!
//! - **[`IncidentStore`]**: the canonical ordered collection. A single
//!   reconcile task applies push events and resync snapshots, so
//!   mutations never interleave. Readers use [`IncidentView`] snapshots
//!   from a `watch` channel or the [`StoreChange`] feed.
//!
//! - **Resync** ([`sync`]): steady-interval pulls with health gating,
//!   exponential backoff with jitter, and a single in-flight request.
//!
//! - **Alerts** ([`alert`]): priority tiers, the sound state machine, and
//!   per-view ownership to avoid double notification.

pub mod ack;
pub mod alert;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod health;
pub mod model;
pub mod normalize;
pub mod notifications;
pub mod store;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use ack::AckAggregator;
pub use alert::{
    Alert, AlertConfig, AlertDispatcher, AlertOwnership, AlertProfile, DispatchOutcome,
    OwnershipGuard, PlaybackOutcome, SilentPlayer, SoundController, SoundCue, SoundPlayer,
    SoundState, Toast, ToastAction, ToastChannel,
};
pub use config::{EngineConfig, ResyncConfig};
pub use engine::{Engine, EngineParts, ReconcileStats};
pub use error::CoreError;
pub use filter::IncidentFilter;
pub use health::{HealthMonitor, LivenessProbe};
pub use model::{
    AckStats, AckUpdate, AlertNotice, AlertStream, EventKind, IncidentChange, IncidentPatch,
    IncidentRecord, IncidentStatus, NotificationEvent, Priority,
};
pub use normalize::{Deduplicator, normalize, record_from_json};
pub use notifications::{Notice, NotificationCenter, NotificationLog};
pub use store::{ApplyOutcome, IncidentStore, IncidentView, MergeReport, StoreChange};
pub use sync::{BackoffPolicy, HttpIncidentSource, IncidentSource, ResyncHandle, SyncOutcome, SyncState};

// Wire types consumers need alongside the engine.
pub use beacon_api::{BroadcastAck, BroadcastRequest, ChannelState, PushEvent};
