// ── Core error types ──
//
// Engine-facing errors from beacon-core. Consumers never see HTTP status
// codes or frame parse failures directly; the `From<beacon_api::Error>`
// impl translates transport-layer errors into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach dispatch server at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Push channel unavailable")]
    PushUnavailable,

    // ── Sync errors ──────────────────────────────────────────────────
    /// The request was superseded by a newer one. Never a failure.
    #[error("Request superseded by a newer resync")]
    Aborted,

    #[error("Resync failed: {message}")]
    ResyncFailed {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Broadcast rejected by server: {message}")]
    BroadcastRejected { message: String },

    #[error("Engine is stopped")]
    EngineStopped,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Superseded requests are no-ops, not failures.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<beacon_api::Error> for CoreError {
    fn from(err: beacon_api::Error) -> Self {
        match err {
            beacon_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            beacon_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_ms: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::ResyncFailed {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            beacon_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            beacon_api::Error::Timeout { timeout_ms } => CoreError::Timeout { timeout_ms },
            beacon_api::Error::Status { status, message } => CoreError::ResyncFailed {
                message,
                status: Some(status),
            },
            beacon_api::Error::Aborted => CoreError::Aborted,
            beacon_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("push channel connection failed: {reason}"),
            },
            beacon_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("push channel closed (code {code}): {reason}"),
            },
            beacon_api::Error::AckTimeout { event, timeout_ms } => CoreError::BroadcastRejected {
                message: format!("no acknowledgement for '{event}' within {timeout_ms}ms"),
            },
            beacon_api::Error::ChannelClosed => CoreError::PushUnavailable,
            beacon_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            beacon_api::Error::Serialization(e) => {
                CoreError::Internal(format!("Serialization error: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_survives_translation() {
        let err = CoreError::from(beacon_api::Error::Aborted);
        assert!(err.is_aborted());
    }

    #[test]
    fn status_becomes_resync_failure() {
        let err = CoreError::from(beacon_api::Error::Status {
            status: 502,
            message: "bad gateway".into(),
        });
        assert!(matches!(err, CoreError::ResyncFailed { status: Some(502), .. }));
    }
}
