// ── Connection health monitor ──
//
// `is_connected` is derived only from push channel transitions. The
// liveness probe is a separate short-timeout network check the resync
// scheduler consults before spending a retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beacon_api::ChannelState;
use tokio::sync::watch;
use tracing::debug;

use crate::error::CoreError;
use crate::sync::HttpIncidentSource;

/// Lightweight reachability check against the dispatch server.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn check(&self, timeout: Duration) -> Result<bool, CoreError>;
}

#[async_trait]
impl LivenessProbe for HttpIncidentSource {
    async fn check(&self, timeout: Duration) -> Result<bool, CoreError> {
        Ok(self.client().ping(timeout).await?)
    }
}

pub struct HealthMonitor {
    channel: watch::Receiver<ChannelState>,
    probe: Arc<dyn LivenessProbe>,
    timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        channel: watch::Receiver<ChannelState>,
        probe: Arc<dyn LivenessProbe>,
        timeout: Duration,
    ) -> Self {
        Self {
            channel,
            probe,
            timeout,
        }
    }

    /// Whether the push channel currently holds a live connection.
    pub fn is_connected(&self) -> bool {
        self.channel.borrow().is_connected()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.borrow().clone()
    }

    /// Subscribe to push channel transitions.
    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.channel.clone()
    }

    /// Run the liveness probe. Errors and timeouts count as unhealthy.
    pub async fn probe(&self) -> bool {
        match tokio::time::timeout(self.timeout, self.probe.check(self.timeout)).await {
            Ok(Ok(healthy)) => healthy,
            Ok(Err(e)) => {
                debug!(error = %e, "liveness probe failed");
                false
            }
            Err(_) => {
                debug!(timeout_ms = self.timeout.as_millis(), "liveness probe timed out");
                false
            }
        }
    }
}
