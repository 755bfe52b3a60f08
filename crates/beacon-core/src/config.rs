// ── Runtime engine configuration ──
//
// Describes how to reach the dispatch server and how the engine paces
// itself. Never touches disk; `beacon-config` builds one from profiles.

use std::time::Duration;

use beacon_api::ReconnectConfig;
use secrecy::SecretString;
use url::Url;

use crate::alert::AlertConfig;
use crate::error::CoreError;
use crate::filter::IncidentFilter;
use crate::sync::BackoffPolicy;

/// Resync pacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncConfig {
    /// Steady interval between pulls. Default: 30s.
    pub interval: Duration,
    /// Retry backoff after failures.
    pub backoff: BackoffPolicy,
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Configuration for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Dispatch server base URL (e.g. `https://dispatch.example`).
    pub server_url: Url,
    /// Push endpoint path, joined onto the server URL. Default: `ws`.
    pub push_path: String,
    pub token: Option<SecretString>,
    /// HTTP request timeout.
    pub timeout: Duration,
    pub resync: ResyncConfig,
    /// Liveness probe timeout. Default: 5s.
    pub health_timeout: Duration,
    pub reconnect: ReconnectConfig,
    pub alerts: AlertConfig,
    pub sound_enabled: bool,
    /// Bound on the notification center history.
    pub notification_history: usize,
    pub broadcast_ack_timeout: Duration,
    /// Page size for snapshot pulls.
    pub page_limit: u32,
    pub initial_filter: IncidentFilter,
    /// Connect the push channel. Off means pull-only.
    pub push_enabled: bool,
}

impl EngineConfig {
    pub fn new(server_url: Url) -> Self {
        Self {
            server_url,
            push_path: "ws".into(),
            token: None,
            timeout: Duration::from_secs(30),
            resync: ResyncConfig::default(),
            health_timeout: Duration::from_secs(5),
            reconnect: ReconnectConfig::default(),
            alerts: AlertConfig::default(),
            sound_enabled: true,
            notification_history: 100,
            broadcast_ack_timeout: Duration::from_secs(10),
            page_limit: 100,
            initial_filter: IncidentFilter::default(),
            push_enabled: true,
        }
    }

    /// WebSocket URL: the server URL with `http(s)` mapped to `ws(s)`
    /// and the push path joined on.
    pub fn push_url(&self) -> Result<Url, CoreError> {
        let mut base = self.server_url.clone();
        let scheme = match base.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(CoreError::Config {
                    message: format!("unsupported server URL scheme '{other}'"),
                });
            }
        };
        base.set_scheme(scheme).map_err(|()| CoreError::Config {
            message: format!("cannot derive push URL from {}", self.server_url),
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(self.push_path.trim_start_matches('/'))
            .map_err(|e| CoreError::Config {
                message: format!("invalid push path '{}': {e}", self.push_path),
            })
    }
}
